//! The caller's own security context, captured once at startup.

use windows_sys::Win32::Foundation::HANDLE;

use crate::NsudoError;
use crate::token;
use crate::winutil::OwnedHandle;

/// The invoking process's identity, captured once and passed by reference
/// into the orchestrator for the lifetime of the process.
#[derive(Debug)]
pub struct CallerContext {
    /// Read-only identification-level primary duplicate of the process
    /// token. Never adjusted after capture.
    token: OwnedHandle,
    session_id: u32,
    elevated: bool,
}

impl CallerContext {
    /// Capture the current process's context.
    ///
    /// The elevation probe doubles as setup: enabling `SeDebugPrivilege` on
    /// the real process token is what later lets the pipeline open the
    /// system process for the SYSTEM impersonation context. The probe
    /// succeeding is the definition of "elevated" here.
    pub fn capture() -> Result<Self, NsudoError> {
        let process_token = token::open_current_process_token()
            .map_err(|code| NsudoError::CreateProcessFailed { code })?;
        let duplicate = token::duplicate_primary(process_token.as_raw())
            .map_err(|code| NsudoError::CreateProcessFailed { code })?;

        let elevated =
            token::enable_privilege(process_token.as_raw(), token::SE_DEBUG_PRIVILEGE).is_ok();

        let session_id = token::session_id(duplicate.as_raw())
            .map_err(|code| NsudoError::CreateProcessFailed { code })?;

        tracing::debug!(session_id, elevated, "caller context captured");

        Ok(Self {
            token: duplicate,
            session_id,
            elevated,
        })
    }

    pub fn token(&self) -> HANDLE {
        self.token.as_raw()
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }
}
