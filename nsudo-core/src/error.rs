use thiserror::Error;

/// Failure taxonomy for one launch invocation.
///
/// Every pipeline stage maps its internal error into one of these values at
/// the orchestrator boundary; nothing is retried and a failure is terminal
/// for the invocation. `CreateProcessFailed` keeps the originating OS error
/// code for diagnostic display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NsudoError {
    #[error("the requested operation requires a privilege the caller does not hold")]
    PrivilegeNotHeld,

    #[error("invalid command line parameter")]
    InvalidCommandParameter,

    #[error("invalid input box parameter")]
    InvalidTextboxParameter,

    #[error("failed to create the target process (os error {code})")]
    CreateProcessFailed { code: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_process_failed_reports_os_code() {
        let err = NsudoError::CreateProcessFailed { code: 5 };
        assert_eq!(
            err.to_string(),
            "failed to create the target process (os error 5)"
        );
    }

    #[test]
    fn privilege_not_held_display() {
        assert!(NsudoError::PrivilegeNotHeld.to_string().contains("privilege"));
    }
}
