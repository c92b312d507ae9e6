//! User-facing text and exit-code policy for the `nsudo` binary. Kept out
//! of `main.rs` so it stays portable and testable.

use nsudo_core::NsudoError;

/// Exit code for every failed invocation, regardless of cause.
pub const EXIT_FAILURE: i32 = -1;

pub const HELP_TEXT: &str = r#"Format: nsudo [ Options and parameters ] Command line

Options:

-U:[ Option ] Create a process with the specified user option.
    Available options:
        T TrustedInstaller
        S System
        C Current User
        P Current Process
        D Current Process (Drop right)

-P:[ Option ] Create a process with the specified privilege option.
    Available options:
        E Enable All Privileges
        D Disable All Privileges
    PS: If you want to use the default privileges, please do not use
    the "-P" parameter.

-M:[ Option ] Create a process with the specified integrity level option.
    Available options:
        S System
        H High
        M Medium
        L Low
    PS: If you want to use the default integrity level, please do not
    use the "-M" parameter.

-Priority:[ Option ] Create a process with the specified priority option.
    Available options:
        Idle
        BelowNormal
        Normal
        AboveNormal
        High
        RealTime
    PS: If you want to use the default priority, please do not use the
    "-Priority" parameter.

-ShowWindowMode:[ Option ] Create a process with the specified window
    mode option.
    Available options:
        Show
        Hide
        Maximize
        Minimize
    PS: If you want to use the default window mode, please do not use
    the "-ShowWindowMode" parameter.

-Wait Make nsudo wait for the created process to end before exiting.

-CurrentDirectory:[ DirectoryPath ] Set the current directory for the
    process. If you do not use this parameter, nsudo uses its own
    directory.

-UseCurrentConsole Create a process with the current console window.

-Version Show version information.

-? Show this content.

-H Show this content.

-Help Show this content.

PS:
    1. All command arguments are case-insensitive.
    2. You can use "/" or "--" instead of "-" and use "=" instead of
       ":" in the command line parameters. For example, "/U:T" and
       "-U=T" are equivalent.

Example:
    If you want to run Command Prompt as TrustedInstaller, enable all
    privileges and use the default integrity level:
        nsudo -U:T -P:E cmd
"#;

pub fn version_line() -> String {
    format!("nsudo {}", env!("CARGO_PKG_VERSION"))
}

/// The single line written to stderr for a failed invocation.
pub fn error_message(err: &NsudoError) -> String {
    format!("nsudo: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn version_line_carries_package_version() {
        assert_eq!(
            version_line(),
            format!("nsudo {}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn help_text_covers_every_option() {
        for option in [
            "-U:",
            "-P:",
            "-M:",
            "-Priority:",
            "-ShowWindowMode:",
            "-Wait",
            "-CurrentDirectory:",
            "-UseCurrentConsole",
            "-Version",
            "-?",
            "-H",
            "-Help",
        ] {
            assert!(HELP_TEXT.contains(option), "help text is missing {option}");
        }
    }

    #[test]
    fn error_messages_name_the_binary() {
        let message = error_message(&NsudoError::PrivilegeNotHeld);
        assert!(message.starts_with("nsudo: "));
    }
}
