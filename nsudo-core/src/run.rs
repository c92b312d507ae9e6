//! Pipeline orchestrator: split, resolve, impersonate, acquire, transform,
//! launch, in that order, mapping every stage failure into the public error
//! taxonomy.

use std::path::Path;
use std::path::PathBuf;

use crate::CallerContext;
use crate::ExitDisposition;
use crate::Invocation;
use crate::NsudoError;
use crate::identity;
use crate::identity::IdentityError;
use crate::impersonate::ImpersonationGuard;
use crate::invocation;
use crate::launcher;
use crate::options::split_command_line;
use crate::transform;

/// The result of one complete invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Help,
    Version,
    Launched(ExitDisposition),
}

/// Run one command line end to end under the captured caller context.
///
/// All grammar and semantic validation finishes before any token operation
/// is attempted; an invalid command line can never leave a half-started
/// service or a stray impersonation behind.
pub fn run(ctx: &CallerContext, raw_command_line: &str) -> Result<Outcome, NsudoError> {
    let split = split_command_line(raw_command_line);
    let request = match invocation::resolve(&split)? {
        Invocation::ShowHelp => return Ok(Outcome::Help),
        Invocation::ShowVersion => return Ok(Outcome::Version),
        Invocation::Launch(request) => request,
    };

    if !ctx.is_elevated() {
        return Err(NsudoError::PrivilegeNotHeld);
    }

    let mut spec = request.spec;
    if spec.working_directory.is_none() {
        spec.working_directory = default_working_directory();
    }

    // Everything from here to launch runs as fully privileged SYSTEM; the
    // guard reverts the thread on every exit path.
    let _guard =
        ImpersonationGuard::impersonate_system().map_err(|_| NsudoError::PrivilegeNotHeld)?;

    let source = identity::acquire_source(request.identity, ctx).map_err(|err| match err {
        IdentityError::PrivilegeNotHeld(_) => NsudoError::PrivilegeNotHeld,
        IdentityError::Unavailable(code) | IdentityError::Os(code) => {
            NsudoError::CreateProcessFailed { code }
        }
    })?;
    tracing::debug!(identity = ?request.identity, "source token acquired");

    let token = transform::transform(
        source.as_raw(),
        ctx.session_id(),
        request.privileges,
        request.integrity,
    )
    .map_err(|err| NsudoError::CreateProcessFailed { code: err.0 })?;
    tracing::debug!("token transformed");

    let disposition = launcher::launch(token.as_raw(), &spec)
        .map_err(|err| NsudoError::CreateProcessFailed { code: err.code() })?;
    Ok(Outcome::Launched(disposition))
}

/// The launcher executable's own directory, the fallback when the caller
/// named no working directory.
fn default_working_directory() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
