//! Small Win32 helpers shared by the Windows-only pipeline stages.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
use windows_sys::Win32::System::Environment::GetCommandLineW;

/// Nul-terminated UTF-16 copy of `s` for Win32 string parameters.
pub(crate) fn to_wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}

pub(crate) fn last_error() -> u32 {
    unsafe { GetLastError() }
}

/// Owning wrapper around a kernel handle. Closes the handle on drop; the
/// null and invalid sentinels are never closed.
#[derive(Debug)]
pub struct OwnedHandle {
    handle: HANDLE,
}

impl OwnedHandle {
    /// Takes ownership of `handle`. The caller must not close it again.
    pub(crate) unsafe fn from_raw(handle: HANDLE) -> Self {
        Self { handle }
    }

    pub fn as_raw(&self) -> HANDLE {
        self.handle
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if self.handle != 0 && self.handle != INVALID_HANDLE_VALUE {
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }
}

/// The process's verbatim command line, as the OS stored it at creation.
/// Quoting is preserved, which the option grammar relies on to keep the
/// unresolved remainder intact.
pub fn raw_command_line() -> String {
    unsafe {
        let p = GetCommandLineW();
        if p.is_null() {
            return String::new();
        }
        let mut len = 0usize;
        while *p.add(len) != 0 {
            len += 1;
        }
        String::from_utf16_lossy(std::slice::from_raw_parts(p, len))
    }
}
