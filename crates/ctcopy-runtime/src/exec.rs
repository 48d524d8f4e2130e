//! Invocation of the container runtime's command-line tools.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use ctcopy_common::error::{CopyError, Result};

/// Locates `program` on `PATH`.
///
/// # Errors
///
/// Returns [`CopyError::NotFound`] if the program is not installed.
pub fn tool_path(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|_| CopyError::NotFound {
        kind: "program",
        id: program.to_owned(),
    })
}

/// Runs a runtime tool to completion with inherited stdio.
///
/// # Errors
///
/// Returns an error if the program is missing or cannot be spawned. A
/// non-zero exit is not an error here; callers inspect the status.
pub fn run_tool<I, S>(program: &str, args: I) -> Result<ExitStatus>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let path = tool_path(program)?;
    let mut command = Command::new(&path);
    let _ = command.args(args);
    tracing::debug!(cmd = ?command, "running runtime tool");
    command.status().map_err(|e| CopyError::io(path, e))
}

/// Turns a failed exit status into a [`CopyError::Runtime`].
///
/// # Errors
///
/// Returns an error unless `status` reports success.
pub fn check_status(operation: &'static str, status: ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(CopyError::runtime(operation, format!("{status}")))
    }
}
