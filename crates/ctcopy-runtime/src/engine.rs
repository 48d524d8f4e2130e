//! Task dispatch for a single ctcopy invocation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::unistd::AccessFlags;

use ctcopy_common::constants::SHUTDOWN_TIMEOUT;
use ctcopy_common::error::{CopyError, Result};
use ctcopy_common::types::{CloneFlags, Task};
use ctcopy_core::mount::MountTable;

use crate::backend::{self, CloneRequest, ContainerBackend, ContainerHandle};
use crate::ephemeral::{self, EphemeralOutcome, EphemeralRequest};

/// Everything one invocation asks for.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone)]
pub struct Invocation {
    /// What to do with the source container.
    pub task: Task,
    /// Name of the source container.
    pub name: String,
    /// Directory holding the source container.
    pub lxc_path: PathBuf,
    /// Name of the new container.
    pub new_name: Option<String>,
    /// Directory for the new container; defaults to `lxc_path`.
    pub new_path: Option<PathBuf>,
    /// Backing store of the new root filesystem.
    pub backing_store: Option<String>,
    /// Block device size in bytes, `0` for the default.
    pub fssize: u64,
    /// Keep the source hostname.
    pub keep_name: bool,
    /// Keep the source MAC addresses.
    pub keep_mac: bool,
    /// Do not mark an ephemeral clone for removal.
    pub keep_data: bool,
    /// Start an ephemeral clone in the foreground.
    pub foreground: bool,
    /// Trailing arguments: clone hook arguments, or the command to run in
    /// an ephemeral clone.
    pub args: Vec<String>,
    /// Grace period for shutting down an ephemeral clone.
    pub shutdown_timeout: Duration,
}

impl Invocation {
    /// Creates an invocation of `task` on container `name`.
    #[must_use]
    pub fn new(task: Task, name: impl Into<String>, lxc_path: impl Into<PathBuf>) -> Self {
        Self {
            task,
            name: name.into(),
            lxc_path: lxc_path.into(),
            new_name: None,
            new_path: None,
            backing_store: None,
            fssize: 0,
            keep_name: false,
            keep_mac: false,
            keep_data: false,
            foreground: false,
            args: Vec::new(),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    /// Returns the clone flags derived from the task and keep options.
    #[must_use]
    pub const fn flags(&self) -> CloneFlags {
        CloneFlags::for_task(self.task, self.keep_name, self.keep_mac)
    }

    /// Returns the directory the new container goes to.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        self.new_path.as_deref().unwrap_or(&self.lxc_path)
    }

    fn require_new_name(&self) -> Result<&str> {
        self.new_name.as_deref().ok_or_else(|| CopyError::Config {
            message: "a new name is required for the clone".into(),
        })
    }
}

/// What a finished task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// A copy or snapshot was created under this name.
    Cloned {
        /// Name of the new container.
        name: String,
    },
    /// The container now has this name.
    Renamed {
        /// New name of the container.
        name: String,
    },
    /// An ephemeral clone ran.
    Ephemeral(EphemeralOutcome),
}

/// Runs ctcopy tasks against a container backend.
pub struct Engine {
    backend: Box<dyn ContainerBackend>,
}

impl Engine {
    /// Creates an engine with the platform backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(backend::detect_backend())
    }

    /// Creates an engine on top of a specific backend.
    #[must_use]
    pub fn with_backend(backend: Box<dyn ContainerBackend>) -> Self {
        Self { backend }
    }

    /// Checks the invocation, opens the source container and runs the task.
    ///
    /// `mounts` is only used by ephemeral clones and is dropped otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if a pre-flight check or the task fails.
    pub fn execute(&self, invocation: &Invocation, mounts: MountTable) -> Result<TaskOutcome> {
        let mut source = self.preflight(invocation)?;
        tracing::debug!(task = %invocation.task, name = %source.name, "running task");

        match invocation.task {
            Task::Copy | Task::Snapshot => self.clone_task(&source, invocation),
            Task::Rename => self.rename_task(&mut source, invocation),
            Task::Ephemeral => {
                let request = ephemeral_request(invocation);
                ephemeral::run(self.backend.as_ref(), &source, &request, mounts).map(TaskOutcome::Ephemeral)
            }
        }
    }

    /// Returns whether the backend is operational on this host.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    fn preflight(&self, invocation: &Invocation) -> Result<ContainerHandle> {
        if !nix::unistd::geteuid().is_root()
            && nix::unistd::access(&invocation.lxc_path, AccessFlags::R_OK | AccessFlags::W_OK).is_err()
        {
            return Err(CopyError::PermissionDenied {
                message: format!("you lack access to {}", invocation.lxc_path.display()),
            });
        }
        if invocation.task != Task::Ephemeral {
            let _ = invocation.require_new_name()?;
        }

        let source = self.backend.open(&invocation.name, &invocation.lxc_path)?;
        if !self.backend.may_control(&source) {
            return Err(CopyError::PermissionDenied {
                message: format!("insufficient privileges to control {}", source.name),
            });
        }
        if !self.backend.is_defined(&source) {
            return Err(CopyError::NotFound {
                kind: "container",
                id: source.name,
            });
        }
        Ok(source)
    }

    fn clone_task(&self, source: &ContainerHandle, invocation: &Invocation) -> Result<TaskOutcome> {
        let request = CloneRequest {
            new_name: invocation.require_new_name()?.to_owned(),
            new_path: invocation.target_path().to_path_buf(),
            flags: invocation.flags(),
            backing_store: invocation.backing_store.clone(),
            fssize: invocation.fssize,
            hook_args: invocation.args.clone(),
        };
        let clone = self.backend.clone_container(source, &request)?;
        let kind = if request.flags.snapshot { "snapshot" } else { "copy" };
        tracing::info!("Created container {} as {kind} of {}", clone.name, source.name);
        Ok(TaskOutcome::Cloned { name: clone.name })
    }

    fn rename_task(&self, source: &mut ContainerHandle, invocation: &Invocation) -> Result<TaskOutcome> {
        let new_name = invocation.require_new_name()?;
        let old_name = source.name.clone();
        self.backend.rename(source, new_name).map_err(|e| {
            CopyError::runtime("rename", format!("renaming container {old_name} to {new_name}: {e}"))
        })?;
        tracing::info!("Renamed container {old_name} to {new_name}");
        Ok(TaskOutcome::Renamed {
            name: new_name.to_owned(),
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn ephemeral_request(invocation: &Invocation) -> EphemeralRequest {
    EphemeralRequest {
        new_name: invocation.new_name.clone(),
        new_path: invocation.target_path().to_path_buf(),
        flags: invocation.flags(),
        backing_store: invocation.backing_store.clone(),
        fssize: invocation.fssize,
        keep_data: invocation.keep_data,
        foreground: invocation.foreground,
        command: invocation.args.clone(),
        shutdown_timeout: invocation.shutdown_timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_path_defaults_to_lxc_path() {
        let mut invocation = Invocation::new(Task::Copy, "base", "/var/lib/lxc");
        assert_eq!(invocation.target_path(), Path::new("/var/lib/lxc"));
        invocation.new_path = Some(PathBuf::from("/srv/lxc"));
        assert_eq!(invocation.target_path(), Path::new("/srv/lxc"));
    }

    #[test]
    fn snapshot_flag_follows_task() {
        assert!(!Invocation::new(Task::Copy, "a", "/l").flags().snapshot);
        assert!(Invocation::new(Task::Snapshot, "a", "/l").flags().snapshot);
        assert!(Invocation::new(Task::Ephemeral, "a", "/l").flags().snapshot);
        assert!(!Invocation::new(Task::Rename, "a", "/l").flags().snapshot);
    }

    #[test]
    fn ephemeral_request_takes_command_from_args() {
        let mut invocation = Invocation::new(Task::Ephemeral, "base", "/var/lib/lxc");
        invocation.args = vec!["ls".into(), "-l".into()];
        invocation.keep_data = true;

        let request = ephemeral_request(&invocation);
        assert_eq!(request.command, invocation.args);
        assert!(request.keep_data);
        assert!(request.flags.snapshot);
        assert_eq!(request.new_path, PathBuf::from("/var/lib/lxc"));
    }
}
