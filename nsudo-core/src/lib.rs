//! Launch a process under a deliberately chosen Windows security identity.
//!
//! The pipeline turns a raw command line into a launch-ready access token in
//! four stages: the option grammar ([`split_command_line`]) and resolution
//! ([`resolve`]) are pure and portable; identity acquisition, token
//! transformation, and process creation are Windows-only and compiled out on
//! other targets so the grammar and its tests still build everywhere.

mod error;
mod invocation;
mod options;

pub use error::NsudoError;
pub use invocation::IdentityMode;
pub use invocation::IntegrityLabel;
pub use invocation::Invocation;
pub use invocation::LaunchRequest;
pub use invocation::LaunchSpec;
pub use invocation::PriorityClass;
pub use invocation::PrivilegeMode;
pub use invocation::ShowWindowMode;
pub use invocation::WaitInterval;
pub use invocation::resolve;
pub use options::OptionSet;
pub use options::SplitCommandLine;
pub use options::split_command_line;

#[cfg(target_os = "windows")]
mod context;
#[cfg(target_os = "windows")]
mod identity;
#[cfg(target_os = "windows")]
mod impersonate;
#[cfg(target_os = "windows")]
mod launcher;
#[cfg(target_os = "windows")]
mod run;
#[cfg(target_os = "windows")]
mod token;
#[cfg(target_os = "windows")]
mod transform;
#[cfg(target_os = "windows")]
mod winutil;

#[cfg(target_os = "windows")]
pub use context::CallerContext;
#[cfg(target_os = "windows")]
pub use launcher::ExitDisposition;
#[cfg(target_os = "windows")]
pub use run::Outcome;
#[cfg(target_os = "windows")]
pub use run::run;
#[cfg(target_os = "windows")]
pub use winutil::raw_command_line;
