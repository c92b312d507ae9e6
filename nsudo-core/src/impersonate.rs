//! Scoped SYSTEM impersonation for the calling thread.

use windows_sys::Win32::Security::RevertToSelf;
use windows_sys::Win32::Security::SecurityImpersonation;
use windows_sys::Win32::Security::SetThreadToken;
use windows_sys::Win32::Security::TokenImpersonation;

use crate::identity;
use crate::identity::IdentityError;
use crate::token;
use crate::winutil::OwnedHandle;
use crate::winutil::last_error;

/// Raises the calling thread to a fully privileged SYSTEM impersonation
/// context and reverts it on drop. Everything the pipeline does between
/// acquisition and launch happens under this guard.
pub(crate) struct ImpersonationGuard {
    // Kept alive for the duration of the impersonation.
    _token: OwnedHandle,
}

impl ImpersonationGuard {
    /// Impersonate the system security subsystem's identity on the current
    /// thread, with every privilege in the token enabled.
    pub(crate) fn impersonate_system() -> Result<Self, IdentityError> {
        let source = identity::system_process_token()?;
        let impersonation =
            token::duplicate(source.as_raw(), SecurityImpersonation, TokenImpersonation)
                .map_err(IdentityError::Os)?;
        token::set_all_privileges(impersonation.as_raw(), true).map_err(IdentityError::Os)?;

        let ok = unsafe { SetThreadToken(std::ptr::null(), impersonation.as_raw()) };
        if ok == 0 {
            return Err(IdentityError::Os(last_error()));
        }
        tracing::debug!("thread impersonating system");
        Ok(Self {
            _token: impersonation,
        })
    }
}

impl Drop for ImpersonationGuard {
    fn drop(&mut self) {
        unsafe {
            RevertToSelf();
        }
    }
}
