//! Option resolution: turns a split command line into a validated
//! invocation, before any token work happens.

use std::path::PathBuf;

use crate::NsudoError;
use crate::options::SplitCommandLine;

/// The identity the target process should run as.
///
/// `Default` means the caller never picked one; it is grammar-valid but
/// rejected during resolution, so the rest of the pipeline only ever sees
/// the five concrete modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    Default,
    TrustedInstaller,
    System,
    CurrentUserSession,
    CurrentProcess,
    CurrentProcessDropRight,
}

impl IdentityMode {
    fn from_option_value(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("T") {
            Some(Self::TrustedInstaller)
        } else if value.eq_ignore_ascii_case("S") {
            Some(Self::System)
        } else if value.eq_ignore_ascii_case("C") {
            Some(Self::CurrentUserSession)
        } else if value.eq_ignore_ascii_case("P") {
            Some(Self::CurrentProcess)
        } else if value.eq_ignore_ascii_case("D") {
            Some(Self::CurrentProcessDropRight)
        } else {
            None
        }
    }
}

/// Bulk privilege handling for the transformed token. Always all-or-nothing,
/// never per-privilege selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeMode {
    Unspecified,
    EnableAll,
    DisableAll,
}

impl PrivilegeMode {
    fn from_option_value(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("E") {
            Some(Self::EnableAll)
        } else if value.eq_ignore_ascii_case("D") {
            Some(Self::DisableAll)
        } else {
            None
        }
    }
}

/// Mandatory integrity label for the transformed token. `Untrusted` is the
/// no-op sentinel: the token's natural label is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityLabel {
    Untrusted,
    Low,
    Medium,
    High,
    System,
}

impl IntegrityLabel {
    fn from_option_value(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("S") {
            Some(Self::System)
        } else if value.eq_ignore_ascii_case("H") {
            Some(Self::High)
        } else if value.eq_ignore_ascii_case("M") {
            Some(Self::Medium)
        } else if value.eq_ignore_ascii_case("L") {
            Some(Self::Low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityClass {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    RealTime,
}

impl PriorityClass {
    fn from_option_value(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("Idle") {
            Some(Self::Idle)
        } else if value.eq_ignore_ascii_case("BelowNormal") {
            Some(Self::BelowNormal)
        } else if value.eq_ignore_ascii_case("Normal") {
            Some(Self::Normal)
        } else if value.eq_ignore_ascii_case("AboveNormal") {
            Some(Self::AboveNormal)
        } else if value.eq_ignore_ascii_case("High") {
            Some(Self::High)
        } else if value.eq_ignore_ascii_case("RealTime") {
            Some(Self::RealTime)
        } else {
            None
        }
    }
}

/// Initial visibility of the target's main window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowWindowMode {
    Default,
    Show,
    Hide,
    Maximize,
    Minimize,
}

impl ShowWindowMode {
    fn from_option_value(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("Show") {
            Some(Self::Show)
        } else if value.eq_ignore_ascii_case("Hide") {
            Some(Self::Hide)
        } else if value.eq_ignore_ascii_case("Maximize") {
            Some(Self::Maximize)
        } else if value.eq_ignore_ascii_case("Minimize") {
            Some(Self::Minimize)
        } else {
            None
        }
    }
}

/// How long the launcher blocks on the created process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitInterval {
    /// Return as soon as the target's primary thread is resumed.
    None,
    Milliseconds(u32),
    Forever,
}

/// Launch parameters consumed by the process launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// The unresolved command line to execute, environment references not
    /// yet expanded.
    pub command_line: String,
    /// `None` means "use the launcher executable's own directory".
    pub working_directory: Option<PathBuf>,
    pub priority: Option<PriorityClass>,
    pub show_window: ShowWindowMode,
    pub create_new_console: bool,
    pub wait: WaitInterval,
}

/// A fully validated launch request: identity plus token adjustments plus
/// launch parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub identity: IdentityMode,
    pub privileges: PrivilegeMode,
    pub integrity: IntegrityLabel,
    pub spec: LaunchSpec,
}

/// What one command line asks for. Help and version are not errors; they
/// short-circuit the pipeline before any token operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    ShowHelp,
    ShowVersion,
    Launch(LaunchRequest),
}

/// Validate a split command line into an [`Invocation`].
///
/// Pure function of its input: every semantic check (unknown option names,
/// unknown sub-values, missing identity, missing command) completes here,
/// before any identity or token operation is attempted.
pub fn resolve(split: &SplitCommandLine) -> Result<Invocation, NsudoError> {
    if split.options.is_empty() && split.remainder.is_empty() {
        return Ok(Invocation::ShowHelp);
    }

    if split.options.len() == 1 && split.remainder.is_empty() {
        let name = split
            .options
            .iter()
            .next()
            .map(|(n, _)| n)
            .unwrap_or_default();
        if name.eq_ignore_ascii_case("?")
            || name.eq_ignore_ascii_case("H")
            || name.eq_ignore_ascii_case("Help")
        {
            return Ok(Invocation::ShowHelp);
        }
        if name.eq_ignore_ascii_case("Version") {
            return Ok(Invocation::ShowVersion);
        }
        return Err(NsudoError::InvalidCommandParameter);
    }

    let mut identity = IdentityMode::Default;
    let mut privileges = PrivilegeMode::Unspecified;
    let mut integrity = IntegrityLabel::Untrusted;
    let mut priority = None;
    let mut show_window = ShowWindowMode::Default;
    let mut working_directory = None;
    let mut create_new_console = true;
    let mut wait = WaitInterval::None;

    for (name, value) in split.options.iter() {
        if name.eq_ignore_ascii_case("U") {
            identity = IdentityMode::from_option_value(value)
                .ok_or(NsudoError::InvalidCommandParameter)?;
        } else if name.eq_ignore_ascii_case("P") {
            privileges = PrivilegeMode::from_option_value(value)
                .ok_or(NsudoError::InvalidCommandParameter)?;
        } else if name.eq_ignore_ascii_case("M") {
            integrity = IntegrityLabel::from_option_value(value)
                .ok_or(NsudoError::InvalidCommandParameter)?;
        } else if name.eq_ignore_ascii_case("Priority") {
            priority = Some(
                PriorityClass::from_option_value(value)
                    .ok_or(NsudoError::InvalidCommandParameter)?,
            );
        } else if name.eq_ignore_ascii_case("ShowWindowMode") {
            show_window = ShowWindowMode::from_option_value(value)
                .ok_or(NsudoError::InvalidCommandParameter)?;
        } else if name.eq_ignore_ascii_case("CurrentDirectory") {
            working_directory = Some(PathBuf::from(value));
        } else if name.eq_ignore_ascii_case("Wait") {
            wait = WaitInterval::Forever;
        } else if name.eq_ignore_ascii_case("UseCurrentConsole") {
            create_new_console = false;
        } else {
            return Err(NsudoError::InvalidCommandParameter);
        }
    }

    if identity == IdentityMode::Default {
        return Err(NsudoError::InvalidCommandParameter);
    }
    if split.remainder.is_empty() {
        return Err(NsudoError::InvalidCommandParameter);
    }

    Ok(Invocation::Launch(LaunchRequest {
        identity,
        privileges,
        integrity,
        spec: LaunchSpec {
            command_line: split.remainder.clone(),
            working_directory,
            priority,
            show_window,
            create_new_console,
            wait,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split_command_line;
    use pretty_assertions::assert_eq;

    fn resolve_line(raw: &str) -> Result<Invocation, NsudoError> {
        resolve(&split_command_line(raw))
    }

    fn launch(raw: &str) -> LaunchRequest {
        match resolve_line(raw) {
            Ok(Invocation::Launch(request)) => request,
            other => panic!("expected a launch request, got {other:?}"),
        }
    }

    #[test]
    fn full_option_line() {
        let request = launch("nsudo -U:T -P:E -ShowWindowMode=Hide cmd.exe /c dir");
        assert_eq!(request.identity, IdentityMode::TrustedInstaller);
        assert_eq!(request.privileges, PrivilegeMode::EnableAll);
        assert_eq!(request.spec.show_window, ShowWindowMode::Hide);
        assert_eq!(request.spec.command_line, "cmd.exe /c dir");
        assert_eq!(request.spec.wait, WaitInterval::None);
        assert!(request.spec.create_new_console);
    }

    #[test]
    fn every_identity_value_parses() {
        assert_eq!(launch("nsudo -U:T cmd").identity, IdentityMode::TrustedInstaller);
        assert_eq!(launch("nsudo -U:S cmd").identity, IdentityMode::System);
        assert_eq!(launch("nsudo -U:C cmd").identity, IdentityMode::CurrentUserSession);
        assert_eq!(launch("nsudo -U:P cmd").identity, IdentityMode::CurrentProcess);
        assert_eq!(
            launch("nsudo -U:D cmd").identity,
            IdentityMode::CurrentProcessDropRight
        );
    }

    #[test]
    fn values_are_case_insensitive() {
        assert_eq!(launch("nsudo -u:t cmd").identity, IdentityMode::TrustedInstaller);
        assert_eq!(
            launch("nsudo -PRIORITY:realtime cmd").spec.priority,
            Some(PriorityClass::RealTime)
        );
    }

    #[test]
    fn no_identity_option_is_rejected_before_any_token_work() {
        assert_eq!(
            resolve_line("nsudo notepad.exe"),
            Err(NsudoError::InvalidCommandParameter)
        );
    }

    #[test]
    fn missing_command_is_rejected() {
        assert_eq!(
            resolve_line("nsudo -U:T -P:E"),
            Err(NsudoError::InvalidCommandParameter)
        );
    }

    #[test]
    fn help_aliases() {
        assert_eq!(resolve_line("nsudo -?"), Ok(Invocation::ShowHelp));
        assert_eq!(resolve_line("nsudo -H"), Ok(Invocation::ShowHelp));
        assert_eq!(resolve_line("nsudo -Help"), Ok(Invocation::ShowHelp));
        assert_eq!(resolve_line("nsudo /help"), Ok(Invocation::ShowHelp));
    }

    #[test]
    fn bare_invocation_shows_help() {
        assert_eq!(resolve_line("nsudo"), Ok(Invocation::ShowHelp));
    }

    #[test]
    fn version_option() {
        assert_eq!(resolve_line("nsudo -Version"), Ok(Invocation::ShowVersion));
    }

    #[test]
    fn lone_non_help_option_without_command_is_invalid() {
        assert_eq!(
            resolve_line("nsudo -U:T"),
            Err(NsudoError::InvalidCommandParameter)
        );
    }

    #[test]
    fn help_mixed_with_a_command_is_invalid() {
        // "Help" is only valid as the sole option.
        assert_eq!(
            resolve_line("nsudo -Help cmd"),
            Err(NsudoError::InvalidCommandParameter)
        );
    }

    #[test]
    fn unknown_option_name_is_invalid() {
        assert_eq!(
            resolve_line("nsudo -Bogus:1 -U:T cmd"),
            Err(NsudoError::InvalidCommandParameter)
        );
    }

    #[test]
    fn unknown_identity_sub_value_is_invalid() {
        assert_eq!(
            resolve_line("nsudo -U:X cmd"),
            Err(NsudoError::InvalidCommandParameter)
        );
    }

    #[test]
    fn unknown_priority_sub_value_is_invalid() {
        assert_eq!(
            resolve_line("nsudo -U:T -Priority:Turbo cmd"),
            Err(NsudoError::InvalidCommandParameter)
        );
    }

    #[test]
    fn resolution_is_idempotent_for_invalid_input() {
        let split = split_command_line("nsudo -U:X cmd");
        assert_eq!(resolve(&split), resolve(&split));
    }

    #[test]
    fn duplicate_option_last_occurrence_wins() {
        assert_eq!(launch("nsudo -U:T -U:S cmd").identity, IdentityMode::System);
        assert_eq!(
            launch("nsudo -P:E -P:D -U:T cmd").privileges,
            PrivilegeMode::DisableAll
        );
    }

    #[test]
    fn wait_and_console_flags() {
        let request = launch("nsudo -U:T -Wait -UseCurrentConsole cmd");
        assert_eq!(request.spec.wait, WaitInterval::Forever);
        assert!(!request.spec.create_new_console);
    }

    #[test]
    fn integrity_values() {
        assert_eq!(launch("nsudo -U:T -M:S cmd").integrity, IntegrityLabel::System);
        assert_eq!(launch("nsudo -U:T -M:H cmd").integrity, IntegrityLabel::High);
        assert_eq!(launch("nsudo -U:T -M:M cmd").integrity, IntegrityLabel::Medium);
        assert_eq!(launch("nsudo -U:T -M:L cmd").integrity, IntegrityLabel::Low);
        assert_eq!(launch("nsudo -U:T cmd").integrity, IntegrityLabel::Untrusted);
    }

    #[test]
    fn current_directory_is_carried_through() {
        let request = launch("nsudo -U:T -CurrentDirectory:C:\\Windows cmd");
        assert_eq!(
            request.spec.working_directory.as_deref(),
            Some(std::path::Path::new("C:\\Windows"))
        );
    }

    #[test]
    fn priority_values() {
        for (text, expected) in [
            ("Idle", PriorityClass::Idle),
            ("BelowNormal", PriorityClass::BelowNormal),
            ("Normal", PriorityClass::Normal),
            ("AboveNormal", PriorityClass::AboveNormal),
            ("High", PriorityClass::High),
            ("RealTime", PriorityClass::RealTime),
        ] {
            let request = launch(&format!("nsudo -U:T -Priority:{text} cmd"));
            assert_eq!(request.spec.priority, Some(expected));
        }
    }
}
