//! Source token acquisition: one strategy per identity mode, dispatched
//! through a closed match so a new mode cannot be added without a
//! corresponding acquisition arm.

use std::ffi::OsStr;
use std::mem::size_of;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;
use windows_sys::Win32::Foundation::ERROR_ACCESS_DENIED;
use windows_sys::Win32::Foundation::ERROR_INVALID_PARAMETER;
use windows_sys::Win32::Foundation::ERROR_NOT_FOUND;
use windows_sys::Win32::Foundation::ERROR_SERVICE_ALREADY_RUNNING;
use windows_sys::Win32::Foundation::ERROR_SERVICE_REQUEST_TIMEOUT;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
use windows_sys::Win32::System::Diagnostics::ToolHelp::CreateToolhelp32Snapshot;
use windows_sys::Win32::System::Diagnostics::ToolHelp::PROCESSENTRY32W;
use windows_sys::Win32::System::Diagnostics::ToolHelp::Process32FirstW;
use windows_sys::Win32::System::Diagnostics::ToolHelp::Process32NextW;
use windows_sys::Win32::System::Diagnostics::ToolHelp::TH32CS_SNAPPROCESS;
use windows_sys::Win32::System::RemoteDesktop::WTSQueryUserToken;
use windows_sys::Win32::System::Services::CloseServiceHandle;
use windows_sys::Win32::System::Services::OpenSCManagerW;
use windows_sys::Win32::System::Services::OpenServiceW;
use windows_sys::Win32::System::Services::QueryServiceStatusEx;
use windows_sys::Win32::System::Services::SC_HANDLE;
use windows_sys::Win32::System::Services::SC_MANAGER_CONNECT;
use windows_sys::Win32::System::Services::SC_STATUS_PROCESS_INFO;
use windows_sys::Win32::System::Services::SERVICE_QUERY_STATUS;
use windows_sys::Win32::System::Services::SERVICE_RUNNING;
use windows_sys::Win32::System::Services::SERVICE_START;
use windows_sys::Win32::System::Services::SERVICE_STATUS_PROCESS;
use windows_sys::Win32::System::Services::StartServiceW;
use windows_sys::Win32::System::Threading::OpenProcess;
use windows_sys::Win32::System::Threading::PROCESS_QUERY_INFORMATION;

use crate::CallerContext;
use crate::IdentityMode;
use crate::token;
use crate::winutil::OwnedHandle;
use crate::winutil::last_error;
use crate::winutil::to_wide;

/// Service that owns the TrustedInstaller identity.
const TRUSTED_INSTALLER_SERVICE: &str = "TrustedInstaller";

/// Image name of the process whose token carries the SYSTEM identity.
const SYSTEM_PROCESS_IMAGE: &str = "lsass.exe";

const SERVICE_START_TIMEOUT: Duration = Duration::from_secs(10);
const SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The requested identity source cannot be reached on this host.
    #[error("identity source unavailable (os error {0})")]
    Unavailable(u32),

    /// The caller lacks the access the source requires (debug-level access
    /// for the SYSTEM identity).
    #[error("required access not held (os error {0})")]
    PrivilegeNotHeld(u32),

    #[error("token acquisition failed (os error {0})")]
    Os(u32),
}

/// Acquire the source token for `mode`.
///
/// The result is a bare token handle in whatever shape the source hands
/// out; the transformer is responsible for duplicating it into a primary
/// token. No state outside the returned handle is touched.
pub(crate) fn acquire_source(
    mode: IdentityMode,
    ctx: &CallerContext,
) -> Result<OwnedHandle, IdentityError> {
    match mode {
        // Resolution rejects `Default` before this point.
        IdentityMode::Default => Err(IdentityError::Os(ERROR_INVALID_PARAMETER)),
        IdentityMode::TrustedInstaller => trusted_installer_token(),
        IdentityMode::System => system_process_token(),
        IdentityMode::CurrentUserSession => session_logon_token(ctx.session_id()),
        IdentityMode::CurrentProcess => {
            token::duplicate_primary(ctx.token()).map_err(IdentityError::Os)
        }
        IdentityMode::CurrentProcessDropRight => {
            token::restrict_to_lua(ctx.token()).map_err(IdentityError::Os)
        }
    }
}

/// Token of the running TrustedInstaller service process, starting the
/// service first when necessary.
fn trusted_installer_token() -> Result<OwnedHandle, IdentityError> {
    let pid =
        running_service_pid(TRUSTED_INSTALLER_SERVICE).map_err(IdentityError::Unavailable)?;
    let process = open_process(pid).map_err(IdentityError::Unavailable)?;
    token::open_process_token(process.as_raw()).map_err(IdentityError::Unavailable)
}

/// Token of the system-owned security subsystem process. Requires the
/// caller to hold debug access already.
pub(crate) fn system_process_token() -> Result<OwnedHandle, IdentityError> {
    let pid = find_process_id(SYSTEM_PROCESS_IMAGE)
        .map_err(IdentityError::Os)?
        .ok_or(IdentityError::Unavailable(ERROR_NOT_FOUND))?;
    let process = open_process(pid).map_err(|code| {
        if code == ERROR_ACCESS_DENIED {
            IdentityError::PrivilegeNotHeld(code)
        } else {
            IdentityError::Os(code)
        }
    })?;
    token::open_process_token(process.as_raw()).map_err(IdentityError::Os)
}

/// Fresh logon-session token bound to `session_id`; not a duplicate of any
/// running process's token.
fn session_logon_token(session_id: u32) -> Result<OwnedHandle, IdentityError> {
    let mut handle: HANDLE = 0;
    let ok = unsafe { WTSQueryUserToken(session_id, &mut handle) };
    if ok == 0 {
        return Err(IdentityError::Unavailable(last_error()));
    }
    Ok(unsafe { OwnedHandle::from_raw(handle) })
}

fn open_process(pid: u32) -> Result<OwnedHandle, u32> {
    let handle = unsafe { OpenProcess(PROCESS_QUERY_INFORMATION, 0, pid) };
    if handle == 0 {
        return Err(last_error());
    }
    Ok(unsafe { OwnedHandle::from_raw(handle) })
}

/// PID of the named service once it reaches the running state.
fn running_service_pid(name: &str) -> Result<u32, u32> {
    let manager = ScHandle::open_manager()?;
    let service = manager.open_service(name, SERVICE_QUERY_STATUS | SERVICE_START)?;

    let status = service.query_status()?;
    if status.dwCurrentState != SERVICE_RUNNING {
        tracing::debug!(service = name, "starting service");
        service.start()?;
    }

    let deadline = Instant::now() + SERVICE_START_TIMEOUT;
    loop {
        let status = service.query_status()?;
        if status.dwCurrentState == SERVICE_RUNNING && status.dwProcessId != 0 {
            return Ok(status.dwProcessId);
        }
        if Instant::now() >= deadline {
            return Err(ERROR_SERVICE_REQUEST_TIMEOUT);
        }
        std::thread::sleep(SERVICE_POLL_INTERVAL);
    }
}

/// PID of the first process whose image name matches `image`
/// (case-insensitive), from a toolhelp snapshot.
fn find_process_id(image: &str) -> Result<Option<u32>, u32> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
    if snapshot == INVALID_HANDLE_VALUE {
        return Err(last_error());
    }
    let snapshot = unsafe { OwnedHandle::from_raw(snapshot) };

    let mut entry: PROCESSENTRY32W = unsafe { std::mem::zeroed() };
    entry.dwSize = size_of::<PROCESSENTRY32W>() as u32;

    let mut ok = unsafe { Process32FirstW(snapshot.as_raw(), &mut entry) };
    while ok != 0 {
        if entry_image_name(&entry).eq_ignore_ascii_case(image) {
            return Ok(Some(entry.th32ProcessID));
        }
        ok = unsafe { Process32NextW(snapshot.as_raw(), &mut entry) };
    }
    Ok(None)
}

fn entry_image_name(entry: &PROCESSENTRY32W) -> String {
    let len = entry
        .szExeFile
        .iter()
        .position(|&c| c == 0)
        .unwrap_or(entry.szExeFile.len());
    String::from_utf16_lossy(&entry.szExeFile[..len])
}

/// Owning wrapper around a service control manager handle.
struct ScHandle {
    handle: SC_HANDLE,
}

impl ScHandle {
    fn open_manager() -> Result<Self, u32> {
        let handle =
            unsafe { OpenSCManagerW(std::ptr::null(), std::ptr::null(), SC_MANAGER_CONNECT) };
        if handle == 0 {
            return Err(last_error());
        }
        Ok(Self { handle })
    }

    fn open_service(&self, name: &str, access: u32) -> Result<Self, u32> {
        let name_w = to_wide(OsStr::new(name));
        let handle = unsafe { OpenServiceW(self.handle, name_w.as_ptr(), access) };
        if handle == 0 {
            return Err(last_error());
        }
        Ok(Self { handle })
    }

    fn query_status(&self) -> Result<SERVICE_STATUS_PROCESS, u32> {
        let mut status: SERVICE_STATUS_PROCESS = unsafe { std::mem::zeroed() };
        let mut needed: u32 = 0;
        let ok = unsafe {
            QueryServiceStatusEx(
                self.handle,
                SC_STATUS_PROCESS_INFO,
                &mut status as *mut SERVICE_STATUS_PROCESS as *mut u8,
                size_of::<SERVICE_STATUS_PROCESS>() as u32,
                &mut needed,
            )
        };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(status)
    }

    fn start(&self) -> Result<(), u32> {
        let ok = unsafe { StartServiceW(self.handle, 0, std::ptr::null()) };
        if ok == 0 {
            let code = last_error();
            if code != ERROR_SERVICE_ALREADY_RUNNING {
                return Err(code);
            }
        }
        Ok(())
    }
}

impl Drop for ScHandle {
    fn drop(&mut self) {
        unsafe {
            CloseServiceHandle(self.handle);
        }
    }
}
