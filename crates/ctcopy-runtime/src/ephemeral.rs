//! Ephemeral clones.
//!
//! An ephemeral clone is a snapshot of a container that gets extra mounts
//! injected, is started, optionally runs one command, and is removed by the
//! runtime once it stops. Failures after the clone exists but before its
//! configuration is on disk destroy it again; see [`CloneLifecycle`].

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ctcopy_common::constants::{
    EPHEMERAL_KEY, MOUNT_ENTRY_KEY, RANDOM_NAME_DIR_MODE, RANDOM_SUFFIX_LEN, SHUTDOWN_TIMEOUT,
};
use ctcopy_common::error::{CopyError, Result};
use ctcopy_common::types::CloneFlags;
use ctcopy_core::mount::MountTable;
use ctcopy_core::mount::scratch::allocate_scratch_dirs;

use crate::backend::{AttachOptions, CloneRequest, ContainerBackend, ContainerHandle};

/// How far an ephemeral clone got; decides what a failure has to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneLifecycle {
    /// No clone exists yet.
    NotCreated,
    /// The clone exists but its configuration is not saved.
    Created,
    /// The configuration including mount entries is on disk.
    ConfigPersisted,
    /// The clone was started.
    Started,
}

impl CloneLifecycle {
    /// Returns whether a failure in this state destroys the clone.
    #[must_use]
    pub const fn destroys_on_failure(self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Parameters of an ephemeral clone.
#[derive(Debug, Clone)]
pub struct EphemeralRequest {
    /// Name of the clone; a unique `<source>_XXXXXX` name is made up if unset.
    pub new_name: Option<String>,
    /// Directory the clone is created in.
    pub new_path: PathBuf,
    /// Clone flags; the snapshot flag is expected to be set.
    pub flags: CloneFlags,
    /// Backing store of the clone's root filesystem.
    pub backing_store: Option<String>,
    /// Block device size in bytes, `0` for the default.
    pub fssize: u64,
    /// Keep the clone after it stops instead of marking it ephemeral.
    pub keep_data: bool,
    /// Start in the foreground instead of daemonizing.
    pub foreground: bool,
    /// Command to run inside the started clone.
    pub command: Vec<String>,
    /// Grace period handed to the runtime when shutting down.
    pub shutdown_timeout: Duration,
}

impl EphemeralRequest {
    /// Creates a request for a daemonized, data-discarding clone.
    #[must_use]
    pub fn new(new_path: &Path, flags: CloneFlags) -> Self {
        Self {
            new_name: None,
            new_path: new_path.to_path_buf(),
            flags,
            backing_store: None,
            fssize: 0,
            keep_data: false,
            foreground: false,
            command: Vec::new(),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    /// Returns whether the clone is started daemonized.
    ///
    /// Daemonizing is the default and is what a command needs to be
    /// attached; only an explicit foreground request overrides it.
    #[must_use]
    pub const fn daemonize(&self) -> bool {
        !self.foreground
    }

    fn clone_request(&self, name: &str) -> CloneRequest {
        CloneRequest {
            new_name: name.to_owned(),
            new_path: self.new_path.clone(),
            flags: self.flags,
            backing_store: self.backing_store.clone(),
            fssize: self.fssize,
            hook_args: Vec::new(),
        }
    }
}

/// Result of a completed ephemeral run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralOutcome {
    /// Name the clone was created under.
    pub name: String,
    /// The start failed because the clone already tore itself down.
    pub self_destructed: bool,
    /// Exit code of the attached command, if one ran.
    pub exit_status: Option<i32>,
}

/// Creates, configures and starts an ephemeral clone of `source`.
///
/// `mounts` is consumed; its entries are installed as `lxc.mount.entry`
/// items after their scratch directories were allocated.
///
/// # Errors
///
/// Returns an error if any step fails. A start failure of a clone marked
/// ephemeral is not an error; the outcome reports it as self-destructed.
pub fn run(
    backend: &dyn ContainerBackend,
    source: &ContainerHandle,
    request: &EphemeralRequest,
    mounts: MountTable,
) -> Result<EphemeralOutcome> {
    let name = match &request.new_name {
        Some(name) => name.clone(),
        None => reserve_name(&request.new_path, &source.name)?,
    };

    let mut clone = backend.clone_container(source, &request.clone_request(&name))?;
    let mut lifecycle = CloneLifecycle::Created;

    if let Err(e) = configure(backend, &mut clone, request, mounts, &mut lifecycle) {
        roll_back(backend, clone, lifecycle);
        return Err(e);
    }
    tracing::info!("Created {} as clone of {}", clone.name, source.name);

    let daemonize = request.daemonize();
    if request.foreground && !request.command.is_empty() {
        tracing::warn!(command = ?request.command, "command is not run in foreground mode");
    }
    backend.set_daemonize(&mut clone, daemonize);

    if let Err(e) = backend.start(&clone, &[]) {
        if backend.is_ephemeral(&clone) {
            tracing::info!(name = %clone.name, error = %e, "ephemeral container exited during start");
            return Ok(EphemeralOutcome {
                name,
                self_destructed: true,
                exit_status: None,
            });
        }
        roll_back(backend, clone, lifecycle);
        return Err(e);
    }
    lifecycle = CloneLifecycle::Started;

    let mut exit_status = None;
    if daemonize && !request.command.is_empty() {
        let options = AttachOptions { clear_env: true };
        let status = match backend.attach_run_wait(&clone, &options, &request.command) {
            Ok(status) => status,
            Err(e) => {
                roll_back(backend, clone, lifecycle);
                return Err(e);
            }
        };
        tracing::info!(name = %clone.name, status, "command finished");
        exit_status = Some(status);

        if let Err(e) = backend.shutdown(&clone, request.shutdown_timeout) {
            tracing::warn!(name = %clone.name, error = %e, "failed to shut down container");
        }
    }

    Ok(EphemeralOutcome {
        name,
        self_destructed: false,
        exit_status,
    })
}

/// Marks the clone, installs its mounts and saves its configuration.
fn configure(
    backend: &dyn ContainerBackend,
    clone: &mut ContainerHandle,
    request: &EphemeralRequest,
    mut mounts: MountTable,
    lifecycle: &mut CloneLifecycle,
) -> Result<()> {
    if !request.keep_data {
        backend.set_config_item(clone, EPHEMERAL_KEY, "1")?;
    }

    allocate_scratch_dirs(&mut mounts, &request.new_path, &clone.name)?;

    for spec in mounts {
        let entry = spec.to_entry()?;
        tracing::debug!(name = %clone.name, entry = %entry, "adding mount entry");
        backend.set_config_item(clone, MOUNT_ENTRY_KEY, &entry)?;
    }

    backend.save_config(clone)?;
    *lifecycle = CloneLifecycle::ConfigPersisted;
    Ok(())
}

/// Undoes a failed run according to how far it got.
fn roll_back(backend: &dyn ContainerBackend, clone: ContainerHandle, lifecycle: CloneLifecycle) {
    if !lifecycle.destroys_on_failure() {
        tracing::debug!(name = %clone.name, ?lifecycle, "releasing container");
        return;
    }
    let name = clone.name.clone();
    tracing::info!(name = %name, "destroying partially configured container");
    if let Err(e) = backend.destroy(clone) {
        tracing::warn!(name = %name, error = %e, "failed to destroy container");
    }
}

/// Creates `<base>/<source>_XXXXXX` and returns its basename as the clone name.
fn reserve_name(base: &Path, source: &str) -> Result<String> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("{source}_"))
        .rand_bytes(RANDOM_SUFFIX_LEN)
        .tempdir_in(base)
        .map_err(|e| CopyError::io(base, e))?;
    std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(RANDOM_NAME_DIR_MODE))
        .map_err(|e| CopyError::io(dir.path(), e))?;

    let path = dir.keep();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| CopyError::InvalidPath {
            path: path.display().to_string(),
        })?;
    tracing::debug!(name = %name, "reserved container name");
    Ok(name)
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::MetadataExt;

    use ctcopy_common::types::Task;

    use super::*;

    #[test]
    fn only_created_state_destroys() {
        assert!(!CloneLifecycle::NotCreated.destroys_on_failure());
        assert!(CloneLifecycle::Created.destroys_on_failure());
        assert!(!CloneLifecycle::ConfigPersisted.destroys_on_failure());
        assert!(!CloneLifecycle::Started.destroys_on_failure());
    }

    #[test]
    fn command_requests_daemon_unless_foreground() {
        let flags = CloneFlags::for_task(Task::Ephemeral, false, false);
        let mut request = EphemeralRequest::new(Path::new("/var/lib/lxc"), flags);
        assert!(request.daemonize());

        request.command = vec!["true".to_owned()];
        assert!(request.daemonize());

        request.foreground = true;
        assert!(!request.daemonize());

        request.command.clear();
        assert!(!request.daemonize());
    }

    #[test]
    fn reserved_name_is_a_fresh_directory() {
        let base = tempfile::tempdir().expect("tempdir");
        let first = reserve_name(base.path(), "web").expect("reserve");
        let second = reserve_name(base.path(), "web").expect("reserve");

        assert_ne!(first, second);
        assert!(first.starts_with("web_"));
        assert_eq!(first.len(), "web_".len() + RANDOM_SUFFIX_LEN);
        let meta = std::fs::metadata(base.path().join(&first)).expect("metadata");
        assert!(meta.is_dir());
        assert_eq!(meta.mode() & 0o777, RANDOM_NAME_DIR_MODE);
    }

    #[test]
    fn reserve_name_fails_without_base() {
        let base = tempfile::tempdir().expect("tempdir");
        let err = reserve_name(&base.path().join("missing"), "web").expect_err("missing base");
        assert!(matches!(err, CopyError::Io { .. }));
    }
}
