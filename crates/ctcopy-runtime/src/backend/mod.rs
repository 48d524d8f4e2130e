//! Container runtime abstraction.
//!
//! The clone workflows only talk to containers through [`ContainerBackend`];
//! [`lxc::LxcBackend`] is the implementation used by the binary.

pub mod lxc;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ctcopy_common::constants::{CONFIG_FILE_NAME, EPHEMERAL_KEY};
use ctcopy_common::error::Result;
use ctcopy_common::types::CloneFlags;

use crate::config::ContainerConfig;

/// An opened container: its location plus its in-memory configuration.
///
/// Configuration changes only reach disk through
/// [`ContainerBackend::save_config`]. Dropping a handle releases it without
/// touching the container.
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    /// Container name.
    pub name: String,
    /// Directory the container lives in.
    pub lxc_path: PathBuf,
    /// Configuration as last loaded or modified.
    pub config: ContainerConfig,
    /// Whether `start` detaches from the terminal.
    pub daemonize: bool,
}

impl ContainerHandle {
    /// Creates a handle with the default daemonized start mode.
    #[must_use]
    pub fn new(name: impl Into<String>, lxc_path: impl Into<PathBuf>, config: ContainerConfig) -> Self {
        Self {
            name: name.into(),
            lxc_path: lxc_path.into(),
            config,
            daemonize: true,
        }
    }

    /// Returns the container's own directory.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.lxc_path.join(&self.name)
    }

    /// Returns the path of the container's configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir().join(CONFIG_FILE_NAME)
    }
}

/// Parameters of a clone operation.
#[derive(Debug, Clone)]
pub struct CloneRequest {
    /// Name of the new container.
    pub new_name: String,
    /// Directory the new container is created in.
    pub new_path: PathBuf,
    /// Snapshot and keep-name/keep-MAC flags.
    pub flags: CloneFlags,
    /// Backing store of the new root filesystem, `None` for the default.
    pub backing_store: Option<String>,
    /// Size of a new block device in bytes, `0` for the default.
    pub fssize: u64,
    /// Extra arguments handed to the clone hooks.
    pub hook_args: Vec<String>,
}

impl CloneRequest {
    /// Creates a request with default backing store and no hook arguments.
    #[must_use]
    pub fn new(new_name: impl Into<String>, new_path: &Path, flags: CloneFlags) -> Self {
        Self {
            new_name: new_name.into(),
            new_path: new_path.to_path_buf(),
            flags,
            backing_store: None,
            fssize: 0,
            hook_args: Vec::new(),
        }
    }
}

/// Options for running a command inside a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachOptions {
    /// Start the command with an empty environment.
    pub clear_env: bool,
}

/// Capability surface of the container runtime.
pub trait ContainerBackend {
    /// Opens the container `name` under `lxc_path`.
    ///
    /// Opening succeeds for undefined containers; use
    /// [`is_defined`](Self::is_defined) to check.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing configuration cannot be read.
    fn open(&self, name: &str, lxc_path: &Path) -> Result<ContainerHandle>;

    /// Returns whether the container has a configuration on disk.
    fn is_defined(&self, handle: &ContainerHandle) -> bool;

    /// Returns whether the caller may modify the container.
    fn may_control(&self, handle: &ContainerHandle) -> bool;

    /// Creates a new container from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the new container cannot be created.
    fn clone_container(&self, source: &ContainerHandle, request: &CloneRequest) -> Result<ContainerHandle>;

    /// Renames a container in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the target name is taken or the move fails.
    fn rename(&self, handle: &mut ContainerHandle, new_name: &str) -> Result<()>;

    /// Sets a configuration item in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not accepted.
    fn set_config_item(&self, handle: &mut ContainerHandle, key: &str, value: &str) -> Result<()>;

    /// Writes the in-memory configuration to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    fn save_config(&self, handle: &ContainerHandle) -> Result<()>;

    /// Chooses between a daemonized and a foreground start.
    fn set_daemonize(&self, handle: &mut ContainerHandle, daemonize: bool) {
        handle.daemonize = daemonize;
    }

    /// Starts the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime reports a failed start.
    fn start(&self, handle: &ContainerHandle, args: &[String]) -> Result<()>;

    /// Runs `command` inside the running container and waits for it.
    ///
    /// Returns the command's exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be run or is killed.
    fn attach_run_wait(
        &self,
        handle: &ContainerHandle,
        options: &AttachOptions,
        command: &[String],
    ) -> Result<i32>;

    /// Asks the container to shut down, killing it after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn shutdown(&self, handle: &ContainerHandle, timeout: Duration) -> Result<()>;

    /// Removes the container and everything it owns.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be removed.
    fn destroy(&self, handle: ContainerHandle) -> Result<()>;

    /// Returns whether the configuration marks the container as ephemeral.
    fn is_ephemeral(&self, handle: &ContainerHandle) -> bool {
        handle.config.get(EPHEMERAL_KEY) == Some("1")
    }

    /// Returns whether this backend can operate on the current host.
    fn is_available(&self) -> bool;
}

/// Creates the backend for the current platform.
#[must_use]
pub fn detect_backend() -> Box<dyn ContainerBackend> {
    Box::new(lxc::LxcBackend::new())
}
