//! The four-step token transformation: duplicate, rebind session, adjust
//! privileges, assign integrity. Steps run in that order and the pipeline
//! aborts on the first failure.

use thiserror::Error;
use windows_sys::Win32::Foundation::HANDLE;

use crate::IntegrityLabel;
use crate::PrivilegeMode;
use crate::token;
use crate::winutil::OwnedHandle;

#[derive(Debug, Error)]
#[error("token transformation failed (os error {0})")]
pub(crate) struct TokenError(pub u32);

/// Shape the acquired source token into the primary token the new process
/// will run under.
pub(crate) fn transform(
    source: HANDLE,
    session_id: u32,
    privileges: PrivilegeMode,
    integrity: IntegrityLabel,
) -> Result<OwnedHandle, TokenError> {
    let primary = token::duplicate_primary(source).map_err(TokenError)?;

    token::set_session_id(primary.as_raw(), session_id).map_err(TokenError)?;

    match privileges {
        PrivilegeMode::Unspecified => {}
        PrivilegeMode::EnableAll => {
            token::set_all_privileges(primary.as_raw(), true).map_err(TokenError)?;
        }
        PrivilegeMode::DisableAll => {
            token::set_all_privileges(primary.as_raw(), false).map_err(TokenError)?;
        }
    }

    if integrity != IntegrityLabel::Untrusted {
        token::set_integrity_level(primary.as_raw(), integrity).map_err(TokenError)?;
    }

    Ok(primary)
}

// These operate on duplicates of the test process's own token: adjusting a
// duplicate's privileges and lowering its label need no elevation.
#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::Security::GetSidSubAuthority;
    use windows_sys::Win32::Security::GetSidSubAuthorityCount;
    use windows_sys::Win32::Security::LUID_AND_ATTRIBUTES;
    use windows_sys::Win32::Security::TOKEN_MANDATORY_LABEL;
    use windows_sys::Win32::Security::TOKEN_PRIVILEGES;
    use windows_sys::Win32::Security::TokenIntegrityLevel;
    use windows_sys::Win32::Security::TokenPrivileges;

    use crate::IntegrityLabel;
    use crate::token;
    use crate::winutil::OwnedHandle;

    fn own_duplicate() -> OwnedHandle {
        let token = match token::open_current_process_token() {
            Ok(token) => token,
            Err(code) => panic!("opening the process token failed (os error {code})"),
        };
        match token::duplicate_primary(token.as_raw()) {
            Ok(duplicate) => duplicate,
            Err(code) => panic!("duplication failed (os error {code})"),
        }
    }

    fn privilege_attributes(token: HANDLE) -> Vec<(u32, i32, u32)> {
        let buf = match token::token_information(token, TokenPrivileges) {
            Ok(buf) => buf,
            Err(code) => panic!("privilege query failed (os error {code})"),
        };
        unsafe {
            let header = buf.as_ptr() as *const TOKEN_PRIVILEGES;
            let count = (*header).PrivilegeCount as usize;
            let privileges: &[LUID_AND_ATTRIBUTES] =
                std::slice::from_raw_parts((*header).Privileges.as_ptr(), count);
            privileges
                .iter()
                .map(|p| (p.Luid.LowPart, p.Luid.HighPart, p.Attributes))
                .collect()
        }
    }

    fn label_rid(token: HANDLE) -> u32 {
        let buf = match token::token_information(token, TokenIntegrityLevel) {
            Ok(buf) => buf,
            Err(code) => panic!("label query failed (os error {code})"),
        };
        unsafe {
            let label = buf.as_ptr() as *const TOKEN_MANDATORY_LABEL;
            let sid = (*label).Label.Sid;
            let count = *GetSidSubAuthorityCount(sid);
            *GetSidSubAuthority(sid, u32::from(count) - 1)
        }
    }

    #[test]
    fn privilege_and_label_steps_commute() {
        let first = own_duplicate();
        let second = own_duplicate();

        // Privileges then label on one duplicate, label then privileges on
        // the other.
        assert_eq!(token::set_all_privileges(first.as_raw(), true), Ok(()));
        assert_eq!(
            token::set_integrity_level(first.as_raw(), IntegrityLabel::Low),
            Ok(())
        );

        assert_eq!(
            token::set_integrity_level(second.as_raw(), IntegrityLabel::Low),
            Ok(())
        );
        assert_eq!(token::set_all_privileges(second.as_raw(), true), Ok(()));

        assert_eq!(
            privilege_attributes(first.as_raw()),
            privilege_attributes(second.as_raw())
        );
        assert_eq!(label_rid(first.as_raw()), label_rid(second.as_raw()));
        assert_eq!(label_rid(first.as_raw()), token::SECURITY_MANDATORY_LOW_RID);
    }

    #[test]
    fn disabling_then_labeling_matches_the_reverse_order() {
        let first = own_duplicate();
        let second = own_duplicate();

        assert_eq!(token::set_all_privileges(first.as_raw(), false), Ok(()));
        assert_eq!(
            token::set_integrity_level(first.as_raw(), IntegrityLabel::Low),
            Ok(())
        );

        assert_eq!(
            token::set_integrity_level(second.as_raw(), IntegrityLabel::Low),
            Ok(())
        );
        assert_eq!(token::set_all_privileges(second.as_raw(), false), Ok(()));

        assert_eq!(
            privilege_attributes(first.as_raw()),
            privilege_attributes(second.as_raw())
        );
        assert_eq!(label_rid(first.as_raw()), label_rid(second.as_raw()));
    }
}
