//! Low-level access token operations: open, duplicate, session rebinding,
//! bulk privilege adjustment, integrity label assignment, and LUA
//! restriction. Every function reports the raw OS error code on failure and
//! leaves taxonomy mapping to the orchestrator.

use std::ffi::OsStr;
use std::ffi::c_void;
use std::mem::size_of;

use windows_sys::Win32::Foundation::ERROR_INSUFFICIENT_BUFFER;
use windows_sys::Win32::Foundation::ERROR_SUCCESS;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Foundation::LUID;
use windows_sys::Win32::Security::AdjustTokenPrivileges;
use windows_sys::Win32::Security::AllocateAndInitializeSid;
use windows_sys::Win32::Security::CreateRestrictedToken;
use windows_sys::Win32::Security::DuplicateTokenEx;
use windows_sys::Win32::Security::FreeSid;
use windows_sys::Win32::Security::GetLengthSid;
use windows_sys::Win32::Security::GetTokenInformation;
use windows_sys::Win32::Security::LUID_AND_ATTRIBUTES;
use windows_sys::Win32::Security::LookupPrivilegeValueW;
use windows_sys::Win32::Security::PSID;
use windows_sys::Win32::Security::SECURITY_IMPERSONATION_LEVEL;
use windows_sys::Win32::Security::SE_PRIVILEGE_ENABLED;
use windows_sys::Win32::Security::SID_AND_ATTRIBUTES;
use windows_sys::Win32::Security::SID_IDENTIFIER_AUTHORITY;
use windows_sys::Win32::Security::SecurityIdentification;
use windows_sys::Win32::Security::SetTokenInformation;
use windows_sys::Win32::Security::TOKEN_INFORMATION_CLASS;
use windows_sys::Win32::Security::TOKEN_MANDATORY_LABEL;
use windows_sys::Win32::Security::TOKEN_PRIVILEGES;
use windows_sys::Win32::Security::TOKEN_TYPE;
use windows_sys::Win32::Security::TokenIntegrityLevel;
use windows_sys::Win32::Security::TokenPrimary;
use windows_sys::Win32::Security::TokenPrivileges;
use windows_sys::Win32::Security::TokenSessionId;
use windows_sys::Win32::System::Threading::GetCurrentProcess;
use windows_sys::Win32::System::Threading::OpenProcessToken;

use crate::IntegrityLabel;
use crate::winutil::OwnedHandle;
use crate::winutil::last_error;
use crate::winutil::to_wide;

/// MAXIMUM_ALLOWED access right.
pub(crate) const MAXIMUM_ALLOWED: u32 = 0x0200_0000;

/// CreateRestrictedToken flag producing a "run as standard user" token.
const LUA_TOKEN: u32 = 0x4;

/// S-1-16 (mandatory label) SID authority.
const MANDATORY_LABEL_AUTHORITY: [u8; 6] = [0, 0, 0, 0, 0, 16];

/// SE_GROUP_INTEGRITY attribute for a mandatory label SID.
const SE_GROUP_INTEGRITY: u32 = 0x0000_0020;

/// Sub-authority RIDs for the four assignable integrity levels.
pub(crate) const SECURITY_MANDATORY_LOW_RID: u32 = 0x1000;
const SECURITY_MANDATORY_MEDIUM_RID: u32 = 0x2000;
const SECURITY_MANDATORY_HIGH_RID: u32 = 0x3000;
const SECURITY_MANDATORY_SYSTEM_RID: u32 = 0x4000;

pub(crate) const SE_DEBUG_PRIVILEGE: &str = "SeDebugPrivilege";

pub(crate) fn open_current_process_token() -> Result<OwnedHandle, u32> {
    let mut handle: HANDLE = 0;
    let ok = unsafe { OpenProcessToken(GetCurrentProcess(), MAXIMUM_ALLOWED, &mut handle) };
    if ok == 0 {
        return Err(last_error());
    }
    Ok(unsafe { OwnedHandle::from_raw(handle) })
}

pub(crate) fn open_process_token(process: HANDLE) -> Result<OwnedHandle, u32> {
    let mut handle: HANDLE = 0;
    let ok = unsafe { OpenProcessToken(process, MAXIMUM_ALLOWED, &mut handle) };
    if ok == 0 {
        return Err(last_error());
    }
    Ok(unsafe { OwnedHandle::from_raw(handle) })
}

pub(crate) fn duplicate(
    token: HANDLE,
    level: SECURITY_IMPERSONATION_LEVEL,
    kind: TOKEN_TYPE,
) -> Result<OwnedHandle, u32> {
    let mut handle: HANDLE = 0;
    let ok = unsafe {
        DuplicateTokenEx(
            token,
            MAXIMUM_ALLOWED,
            std::ptr::null(),
            level,
            kind,
            &mut handle,
        )
    };
    if ok == 0 {
        return Err(last_error());
    }
    Ok(unsafe { OwnedHandle::from_raw(handle) })
}

/// Identification-level primary duplicate, the shape every source token is
/// brought into before transformation.
pub(crate) fn duplicate_primary(token: HANDLE) -> Result<OwnedHandle, u32> {
    duplicate(token, SecurityIdentification, TokenPrimary)
}

pub(crate) fn session_id(token: HANDLE) -> Result<u32, u32> {
    let mut session: u32 = 0;
    let mut returned: u32 = 0;
    let ok = unsafe {
        GetTokenInformation(
            token,
            TokenSessionId,
            &mut session as *mut u32 as *mut c_void,
            size_of::<u32>() as u32,
            &mut returned,
        )
    };
    if ok == 0 {
        return Err(last_error());
    }
    Ok(session)
}

pub(crate) fn set_session_id(token: HANDLE, session: u32) -> Result<(), u32> {
    let ok = unsafe {
        SetTokenInformation(
            token,
            TokenSessionId,
            &session as *const u32 as *const c_void,
            size_of::<u32>() as u32,
        )
    };
    if ok == 0 {
        return Err(last_error());
    }
    Ok(())
}

/// Enable one named privilege on `token`. `ERROR_NOT_ALL_ASSIGNED` counts
/// as failure: the privilege is not present in the token at all.
pub(crate) fn enable_privilege(token: HANDLE, name: &str) -> Result<(), u32> {
    let name_w = to_wide(OsStr::new(name));
    let mut luid = LUID {
        LowPart: 0,
        HighPart: 0,
    };
    let ok = unsafe { LookupPrivilegeValueW(std::ptr::null(), name_w.as_ptr(), &mut luid) };
    if ok == 0 {
        return Err(last_error());
    }

    let state = TOKEN_PRIVILEGES {
        PrivilegeCount: 1,
        Privileges: [LUID_AND_ATTRIBUTES {
            Luid: luid,
            Attributes: SE_PRIVILEGE_ENABLED,
        }],
    };
    let ok = unsafe {
        AdjustTokenPrivileges(
            token,
            0,
            &state,
            size_of::<TOKEN_PRIVILEGES>() as u32,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(last_error());
    }
    // AdjustTokenPrivileges reports partial application through the thread
    // error state even when it returns success.
    let status = last_error();
    if status != ERROR_SUCCESS {
        return Err(status);
    }
    Ok(())
}

/// Enable or disable every privilege present in the token's privilege
/// array with a single adjustment call. Never per-privilege selection.
pub(crate) fn set_all_privileges(token: HANDLE, enable: bool) -> Result<(), u32> {
    let mut buf = token_information(token, TokenPrivileges)?;
    let header = buf.as_mut_ptr() as *mut TOKEN_PRIVILEGES;
    unsafe {
        let count = (*header).PrivilegeCount as usize;
        let privileges = std::slice::from_raw_parts_mut((*header).Privileges.as_mut_ptr(), count);
        for privilege in privileges {
            privilege.Attributes = if enable { SE_PRIVILEGE_ENABLED } else { 0 };
        }
        let ok = AdjustTokenPrivileges(
            token,
            0,
            header,
            (buf.len() * size_of::<u64>()) as u32,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        );
        if ok == 0 {
            return Err(last_error());
        }
    }
    let status = last_error();
    if status != ERROR_SUCCESS {
        return Err(status);
    }
    Ok(())
}

/// Rewrite the token's mandatory integrity label to `label`. The label is
/// assigned unconditionally; `Untrusted` is the caller's no-op sentinel and
/// never reaches this function.
pub(crate) fn set_integrity_level(token: HANDLE, label: IntegrityLabel) -> Result<(), u32> {
    let rid = match label {
        IntegrityLabel::Untrusted => return Ok(()),
        IntegrityLabel::Low => SECURITY_MANDATORY_LOW_RID,
        IntegrityLabel::Medium => SECURITY_MANDATORY_MEDIUM_RID,
        IntegrityLabel::High => SECURITY_MANDATORY_HIGH_RID,
        IntegrityLabel::System => SECURITY_MANDATORY_SYSTEM_RID,
    };

    let authority = SID_IDENTIFIER_AUTHORITY {
        Value: MANDATORY_LABEL_AUTHORITY,
    };
    let mut sid: PSID = std::ptr::null_mut();
    let ok = unsafe {
        AllocateAndInitializeSid(&authority, 1, rid, 0, 0, 0, 0, 0, 0, 0, &mut sid)
    };
    if ok == 0 {
        return Err(last_error());
    }
    let sid = AllocatedSid(sid);

    let mandatory_label = TOKEN_MANDATORY_LABEL {
        Label: SID_AND_ATTRIBUTES {
            Sid: sid.0,
            Attributes: SE_GROUP_INTEGRITY,
        },
    };
    let size = size_of::<TOKEN_MANDATORY_LABEL>() as u32 + unsafe { GetLengthSid(sid.0) };
    let ok = unsafe {
        SetTokenInformation(
            token,
            TokenIntegrityLevel,
            &mandatory_label as *const TOKEN_MANDATORY_LABEL as *const c_void,
            size,
        )
    };
    if ok == 0 {
        return Err(last_error());
    }
    Ok(())
}

/// Filtered "run as standard user" derivative of `token` (elevated groups
/// and privileges dropped).
pub(crate) fn restrict_to_lua(token: HANDLE) -> Result<OwnedHandle, u32> {
    let mut handle: HANDLE = 0;
    let ok = unsafe {
        CreateRestrictedToken(
            token,
            LUA_TOKEN,
            0,
            std::ptr::null(),
            0,
            std::ptr::null(),
            0,
            std::ptr::null(),
            &mut handle,
        )
    };
    if ok == 0 {
        return Err(last_error());
    }
    Ok(unsafe { OwnedHandle::from_raw(handle) })
}

/// Variable-length token information query with the usual two-call buffer
/// growth pattern. The buffer is backed by `u64` elements so the returned
/// bytes are aligned for any of the queried structures.
pub(crate) fn token_information(
    token: HANDLE,
    class: TOKEN_INFORMATION_CLASS,
) -> Result<Vec<u64>, u32> {
    let mut needed: u32 = 0;
    let ok = unsafe { GetTokenInformation(token, class, std::ptr::null_mut(), 0, &mut needed) };
    if ok == 0 {
        let code = last_error();
        if code != ERROR_INSUFFICIENT_BUFFER {
            return Err(code);
        }
    }

    let mut buf = vec![0u64; (needed as usize).div_ceil(size_of::<u64>())];
    let ok = unsafe {
        GetTokenInformation(
            token,
            class,
            buf.as_mut_ptr() as *mut c_void,
            needed,
            &mut needed,
        )
    };
    if ok == 0 {
        return Err(last_error());
    }
    Ok(buf)
}

struct AllocatedSid(PSID);

impl Drop for AllocatedSid {
    fn drop(&mut self) {
        unsafe {
            FreeSid(self.0);
        }
    }
}

// These run against the test process's own token and need no elevation.
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn own_token() -> OwnedHandle {
        match open_current_process_token() {
            Ok(token) => token,
            Err(code) => panic!("opening the process token failed (os error {code})"),
        }
    }

    #[test]
    fn own_token_reports_a_session_id() {
        let token = own_token();
        assert!(session_id(token.as_raw()).is_ok());
    }

    #[test]
    fn duplicate_primary_preserves_session_id() {
        let token = own_token();
        let duplicate = match duplicate_primary(token.as_raw()) {
            Ok(duplicate) => duplicate,
            Err(code) => panic!("duplication failed (os error {code})"),
        };
        assert_eq!(
            session_id(token.as_raw()),
            session_id(duplicate.as_raw())
        );
    }

    #[test]
    fn disabling_all_privileges_on_a_duplicate_succeeds() {
        let token = own_token();
        let duplicate = match duplicate_primary(token.as_raw()) {
            Ok(duplicate) => duplicate,
            Err(code) => panic!("duplication failed (os error {code})"),
        };
        assert!(set_all_privileges(duplicate.as_raw(), false).is_ok());
    }
}
