//! Process creation under a transformed token: environment block, string
//! expansion, startup info, suspended creation, priority, resume, wait.

use std::ffi::OsStr;
use std::path::Path;

use thiserror::Error;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Foundation::WAIT_OBJECT_0;
use windows_sys::Win32::Foundation::WAIT_TIMEOUT;
use windows_sys::Win32::System::Environment::CreateEnvironmentBlock;
use windows_sys::Win32::System::Environment::DestroyEnvironmentBlock;
use windows_sys::Win32::System::Environment::ExpandEnvironmentStringsW;
use windows_sys::Win32::System::Threading::ABOVE_NORMAL_PRIORITY_CLASS;
use windows_sys::Win32::System::Threading::BELOW_NORMAL_PRIORITY_CLASS;
use windows_sys::Win32::System::Threading::CREATE_NEW_CONSOLE;
use windows_sys::Win32::System::Threading::CREATE_SUSPENDED;
use windows_sys::Win32::System::Threading::CREATE_UNICODE_ENVIRONMENT;
use windows_sys::Win32::System::Threading::CreateProcessAsUserW;
use windows_sys::Win32::System::Threading::HIGH_PRIORITY_CLASS;
use windows_sys::Win32::System::Threading::IDLE_PRIORITY_CLASS;
use windows_sys::Win32::System::Threading::INFINITE;
use windows_sys::Win32::System::Threading::NORMAL_PRIORITY_CLASS;
use windows_sys::Win32::System::Threading::PROCESS_INFORMATION;
use windows_sys::Win32::System::Threading::REALTIME_PRIORITY_CLASS;
use windows_sys::Win32::System::Threading::ResumeThread;
use windows_sys::Win32::System::Threading::STARTF_USESHOWWINDOW;
use windows_sys::Win32::System::Threading::STARTUPINFOW;
use windows_sys::Win32::System::Threading::SetPriorityClass;
use windows_sys::Win32::System::Threading::WaitForSingleObjectEx;
use windows_sys::Win32::UI::WindowsAndMessaging::SW_HIDE;
use windows_sys::Win32::UI::WindowsAndMessaging::SW_MAXIMIZE;
use windows_sys::Win32::UI::WindowsAndMessaging::SW_MINIMIZE;
use windows_sys::Win32::UI::WindowsAndMessaging::SW_SHOW;

use crate::LaunchSpec;
use crate::PriorityClass;
use crate::ShowWindowMode;
use crate::WaitInterval;
use crate::winutil::OwnedHandle;
use crate::winutil::last_error;
use crate::winutil::to_wide;

#[derive(Debug, Error)]
pub(crate) enum LauncherError {
    #[error("environment block creation failed (os error {0})")]
    Environment(u32),

    #[error("process creation failed (os error {0})")]
    CreateProcess(u32),
}

impl LauncherError {
    pub(crate) fn code(&self) -> u32 {
        match self {
            Self::Environment(code) | Self::CreateProcess(code) => *code,
        }
    }
}

/// What became of the launched process by the time control returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// No wait was requested; the target runs on.
    Detached,
    Exited,
    TimedOut,
}

/// Create the target process under `token` per `spec`.
///
/// The target starts suspended so its priority class can be set before any
/// of its code runs, then the primary thread is resumed.
pub(crate) fn launch(token: HANDLE, spec: &LaunchSpec) -> Result<ExitDisposition, LauncherError> {
    let environment = EnvironmentBlock::for_token(token)?;
    let expanded = expand_environment_strings(&spec.command_line)
        .map_err(LauncherError::CreateProcess)?;

    // CreateProcessAsUserW may rewrite the command line buffer in place.
    let mut command_line = to_wide(OsStr::new(&expanded));
    let working_directory = spec
        .working_directory
        .as_deref()
        .map(|dir: &Path| to_wide(dir.as_os_str()));
    let mut desktop = to_wide(OsStr::new("WinSta0\\Default"));

    let mut startup: STARTUPINFOW = unsafe { std::mem::zeroed() };
    startup.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
    startup.lpDesktop = desktop.as_mut_ptr();
    if let Some(mode) = show_window_command(spec.show_window) {
        startup.dwFlags |= STARTF_USESHOWWINDOW;
        startup.wShowWindow = mode as u16;
    }

    let mut flags = CREATE_SUSPENDED | CREATE_UNICODE_ENVIRONMENT;
    if spec.create_new_console {
        flags |= CREATE_NEW_CONSOLE;
    }

    let mut info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };
    let ok = unsafe {
        CreateProcessAsUserW(
            token,
            std::ptr::null(),
            command_line.as_mut_ptr(),
            std::ptr::null(),
            std::ptr::null(),
            0,
            flags,
            environment.as_ptr(),
            working_directory
                .as_ref()
                .map_or(std::ptr::null(), |dir| dir.as_ptr()),
            &startup,
            &mut info,
        )
    };
    if ok == 0 {
        return Err(LauncherError::CreateProcess(last_error()));
    }
    let process = unsafe { OwnedHandle::from_raw(info.hProcess) };
    let thread = unsafe { OwnedHandle::from_raw(info.hThread) };
    tracing::debug!(pid = info.dwProcessId, "process created suspended");

    if let Some(priority) = spec.priority {
        let ok = unsafe { SetPriorityClass(process.as_raw(), priority_class_flag(priority)) };
        if ok == 0 {
            tracing::warn!(code = last_error(), "failed to set priority class");
        }
    }

    unsafe {
        ResumeThread(thread.as_raw());
    }

    let timeout = match spec.wait {
        WaitInterval::None => return Ok(ExitDisposition::Detached),
        WaitInterval::Milliseconds(ms) => ms,
        WaitInterval::Forever => INFINITE,
    };
    let waited = unsafe { WaitForSingleObjectEx(process.as_raw(), timeout, 0) };
    match waited {
        WAIT_OBJECT_0 => Ok(ExitDisposition::Exited),
        WAIT_TIMEOUT => Ok(ExitDisposition::TimedOut),
        _ => Err(LauncherError::CreateProcess(last_error())),
    }
}

fn show_window_command(mode: ShowWindowMode) -> Option<i32> {
    match mode {
        ShowWindowMode::Default => None,
        ShowWindowMode::Show => Some(SW_SHOW),
        ShowWindowMode::Hide => Some(SW_HIDE),
        ShowWindowMode::Maximize => Some(SW_MAXIMIZE),
        ShowWindowMode::Minimize => Some(SW_MINIMIZE),
    }
}

fn priority_class_flag(priority: PriorityClass) -> u32 {
    match priority {
        PriorityClass::Idle => IDLE_PRIORITY_CLASS,
        PriorityClass::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
        PriorityClass::Normal => NORMAL_PRIORITY_CLASS,
        PriorityClass::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
        PriorityClass::High => HIGH_PRIORITY_CLASS,
        PriorityClass::RealTime => REALTIME_PRIORITY_CLASS,
    }
}

/// Expand `%VAR%` references against the launcher's own environment.
fn expand_environment_strings(input: &str) -> Result<String, u32> {
    let input_w = to_wide(OsStr::new(input));
    let needed = unsafe { ExpandEnvironmentStringsW(input_w.as_ptr(), std::ptr::null_mut(), 0) };
    if needed == 0 {
        return Err(last_error());
    }

    let mut buf = vec![0u16; needed as usize];
    let written =
        unsafe { ExpandEnvironmentStringsW(input_w.as_ptr(), buf.as_mut_ptr(), needed) };
    if written == 0 {
        return Err(last_error());
    }
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    Ok(String::from_utf16_lossy(&buf[..len]))
}

/// Environment block derived from the target token, released on drop.
struct EnvironmentBlock {
    block: *mut std::ffi::c_void,
}

impl EnvironmentBlock {
    fn for_token(token: HANDLE) -> Result<Self, LauncherError> {
        let mut block: *mut std::ffi::c_void = std::ptr::null_mut();
        let ok = unsafe { CreateEnvironmentBlock(&mut block, token, 1) };
        if ok == 0 {
            return Err(LauncherError::Environment(last_error()));
        }
        Ok(Self { block })
    }

    fn as_ptr(&self) -> *const std::ffi::c_void {
        self.block
    }
}

impl Drop for EnvironmentBlock {
    fn drop(&mut self) {
        unsafe {
            DestroyEnvironmentBlock(self.block);
        }
    }
}
