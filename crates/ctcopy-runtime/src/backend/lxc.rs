//! Directory based LXC backend.
//!
//! Containers live in `<lxcpath>/<name>/` with a `config` file and a root
//! filesystem. Cloning and renaming are done here directly; process
//! lifecycle is delegated to `lxc-start`, `lxc-attach` and `lxc-stop`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use nix::unistd::AccessFlags;

use ctcopy_common::constants::{
    CLONE_HOOK_KEY, CONFIG_FILE_NAME, ROOTFS_DIR_NAME, ROOTFS_PATH_KEY, SNAPSHOT_DELTA_DIR_NAME,
    UTS_NAME_KEY,
};
use ctcopy_common::error::{CopyError, Result};

use super::{AttachOptions, CloneRequest, ContainerBackend, ContainerHandle};
use crate::config::ContainerConfig;
use crate::exec;

/// How the clone's root filesystem is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootfsStorage {
    /// Full copy into `<newdir>/rootfs`.
    Copy,
    /// Overlay of the source rootfs with a writable `<newdir>/delta0`.
    Overlay,
}

impl RootfsStorage {
    fn for_request(request: &CloneRequest) -> Result<Self> {
        match request.backing_store.as_deref() {
            None | Some("dir") if request.flags.snapshot => Ok(Self::Overlay),
            None | Some("dir") => Ok(Self::Copy),
            Some("overlay" | "overlayfs") => Ok(Self::Overlay),
            Some(other) => Err(CopyError::Config {
                message: format!("unsupported backing store {other:?}"),
            }),
        }
    }
}

/// Backend operating on an LXC style container directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct LxcBackend;

impl LxcBackend {
    /// Creates a new LXC backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn populate_clone(
        source: &ContainerHandle,
        request: &CloneRequest,
        storage: RootfsStorage,
        new_dir: &Path,
    ) -> Result<ContainerHandle> {
        let source_rootfs = source_rootfs_dir(source)?;
        let rootfs_value = match storage {
            RootfsStorage::Copy => {
                let target = new_dir.join(ROOTFS_DIR_NAME);
                let status = exec::run_tool("cp", [
                    OsStr::new("-a"),
                    source_rootfs.as_os_str(),
                    target.as_os_str(),
                ])?;
                exec::check_status("rootfs copy", status)?;
                format!("dir:{}", target.display())
            }
            RootfsStorage::Overlay => {
                let delta = new_dir.join(SNAPSHOT_DELTA_DIR_NAME);
                std::fs::create_dir_all(&delta).map_err(|e| CopyError::io(&delta, e))?;
                format!("overlay:{}:{}", source_rootfs.display(), delta.display())
            }
        };

        let mut config = source.config.clone();
        let old_dir = source.dir();
        config.rewrite(|_, value| replace_dir(value, &old_dir, new_dir));
        config.set(ROOTFS_PATH_KEY, &rootfs_value);
        if !request.flags.keep_name {
            config.set(UTS_NAME_KEY, &request.new_name);
        }
        if !request.flags.keep_mac {
            config.rewrite(|key, value| {
                if is_hwaddr_key(key) {
                    *value = random_hwaddr();
                }
            });
        }

        let handle = ContainerHandle::new(&request.new_name, &request.new_path, config);
        handle.config.save(&handle.config_path())?;

        for hook in handle.config.get_all(CLONE_HOOK_KEY) {
            run_clone_hook(hook, source, &handle, &request.hook_args)?;
        }
        Ok(handle)
    }
}

impl ContainerBackend for LxcBackend {
    fn open(&self, name: &str, lxc_path: &Path) -> Result<ContainerHandle> {
        let mut handle = ContainerHandle::new(name, lxc_path, ContainerConfig::new());
        let path = handle.config_path();
        if path.is_file() {
            handle.config = ContainerConfig::load(&path)?;
        }
        tracing::debug!(name, lxc_path = %lxc_path.display(), "opened container");
        Ok(handle)
    }

    fn is_defined(&self, handle: &ContainerHandle) -> bool {
        handle.config_path().is_file()
    }

    fn may_control(&self, handle: &ContainerHandle) -> bool {
        nix::unistd::access(&handle.dir(), AccessFlags::R_OK | AccessFlags::W_OK).is_ok()
    }

    fn clone_container(&self, source: &ContainerHandle, request: &CloneRequest) -> Result<ContainerHandle> {
        let new_dir = request.new_path.join(&request.new_name);
        if new_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(CopyError::runtime(
                "clone",
                format!("container {} already exists", request.new_name),
            ));
        }
        let storage = RootfsStorage::for_request(request)?;
        if request.fssize != 0 {
            tracing::info!(
                fssize = request.fssize,
                "filesystem size only applies to block device backing stores, ignoring"
            );
        }

        let created = !new_dir.exists();
        std::fs::create_dir_all(&new_dir).map_err(|e| CopyError::io(&new_dir, e))?;

        match Self::populate_clone(source, request, storage, &new_dir) {
            Ok(handle) => {
                tracing::info!(
                    source = %source.name,
                    name = %handle.name,
                    storage = ?storage,
                    "container cloned"
                );
                Ok(handle)
            }
            Err(e) => {
                if created {
                    if let Err(cleanup) = std::fs::remove_dir_all(&new_dir) {
                        tracing::warn!(
                            dir = %new_dir.display(),
                            error = %cleanup,
                            "failed to remove partial clone"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    fn rename(&self, handle: &mut ContainerHandle, new_name: &str) -> Result<()> {
        let old_dir = handle.dir();
        let new_dir = handle.lxc_path.join(new_name);
        if new_dir.exists() {
            return Err(CopyError::runtime(
                "rename",
                format!("container {new_name} already exists"),
            ));
        }
        std::fs::rename(&old_dir, &new_dir).map_err(|e| CopyError::io(&old_dir, e))?;

        let old_name = std::mem::replace(&mut handle.name, new_name.to_owned());
        handle.config.rewrite(|_, value| replace_dir(value, &old_dir, &new_dir));
        if handle.config.get(UTS_NAME_KEY) == Some(old_name.as_str()) {
            handle.config.set(UTS_NAME_KEY, new_name);
        }
        self.save_config(handle)?;
        tracing::info!(from = %old_name, to = %new_name, "container renamed");
        Ok(())
    }

    fn set_config_item(&self, handle: &mut ContainerHandle, key: &str, value: &str) -> Result<()> {
        if !key.starts_with("lxc.") {
            return Err(CopyError::Config {
                message: format!("unknown configuration key {key:?}"),
            });
        }
        handle.config.set(key, value);
        Ok(())
    }

    fn save_config(&self, handle: &ContainerHandle) -> Result<()> {
        handle.config.save(&handle.config_path())
    }

    fn start(&self, handle: &ContainerHandle, args: &[String]) -> Result<()> {
        let mut argv = base_args(handle);
        argv.push(if handle.daemonize { "-d" } else { "-F" }.to_owned());
        if !args.is_empty() {
            argv.push("--".to_owned());
            argv.extend_from_slice(args);
        }
        tracing::info!(name = %handle.name, daemonize = handle.daemonize, "starting container");
        let status = exec::run_tool("lxc-start", &argv)?;
        exec::check_status("start", status)
    }

    fn attach_run_wait(
        &self,
        handle: &ContainerHandle,
        options: &AttachOptions,
        command: &[String],
    ) -> Result<i32> {
        let mut argv = base_args(handle);
        if options.clear_env {
            argv.push("--clear-env".to_owned());
        }
        argv.push("--".to_owned());
        argv.extend_from_slice(command);
        let status = exec::run_tool("lxc-attach", &argv)?;
        status
            .code()
            .ok_or_else(|| CopyError::runtime("attach", format!("command {status}")))
    }

    fn shutdown(&self, handle: &ContainerHandle, timeout: Duration) -> Result<()> {
        let mut argv = base_args(handle);
        argv.extend(["-t".to_owned(), timeout.as_secs().to_string()]);
        let status = exec::run_tool("lxc-stop", &argv)?;
        exec::check_status("shutdown", status)
    }

    fn destroy(&self, handle: ContainerHandle) -> Result<()> {
        let dir = handle.dir();
        std::fs::remove_dir_all(&dir).map_err(|e| CopyError::io(&dir, e))?;
        tracing::info!(name = %handle.name, "container destroyed");
        Ok(())
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && exec::tool_path("lxc-start").is_ok()
    }
}

fn base_args(handle: &ContainerHandle) -> Vec<String> {
    vec![
        "-n".to_owned(),
        handle.name.clone(),
        "-P".to_owned(),
        handle.lxc_path.display().to_string(),
    ]
}

/// Resolves the directory holding the source container's root filesystem.
fn source_rootfs_dir(source: &ContainerHandle) -> Result<PathBuf> {
    match source.config.get(ROOTFS_PATH_KEY) {
        None => Ok(source.dir().join(ROOTFS_DIR_NAME)),
        Some(value) => {
            let path = value.strip_prefix("dir:").unwrap_or(value);
            if path.starts_with('/') {
                Ok(PathBuf::from(path))
            } else {
                Err(CopyError::runtime(
                    "clone",
                    format!("cannot clone rootfs {value:?}"),
                ))
            }
        }
    }
}

/// Replaces every occurrence of the `old` directory in `value` with `new`.
///
/// Only whole path components match: the directory must start the value
/// or follow one of the separators used in config values, and must end
/// the value or be followed by `/`. So `/lxc/web` touches neither
/// `/lxc/web2` nor `/mnt/lxc/web`.
fn replace_dir(value: &mut String, old: &Path, new: &Path) {
    let (Some(old), Some(new)) = (old.to_str(), new.to_str()) else {
        return;
    };
    if old.is_empty() {
        return;
    }

    let mut rewritten = String::with_capacity(value.len());
    let mut copied = 0;
    let mut search = 0;
    while let Some(offset) = value[search..].find(old) {
        let pos = search + offset;
        let end = pos + old.len();
        let starts = value[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| matches!(c, '/' | ':' | '=' | ',' | ' '));
        let ends = value[end..].chars().next().is_none_or(|c| c == '/');
        if starts && ends {
            rewritten.push_str(&value[copied..pos]);
            rewritten.push_str(new);
            copied = end;
            search = end;
        } else {
            search = pos + old.chars().next().map_or(1, char::len_utf8);
        }
    }
    if copied > 0 {
        rewritten.push_str(&value[copied..]);
        *value = rewritten;
    }
}

fn is_hwaddr_key(key: &str) -> bool {
    key.starts_with("lxc.net.") && key.ends_with(".hwaddr")
}

/// Generates a MAC address in the `00:16:3e` range reserved for Xen/LXC.
fn random_hwaddr() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    format!("00:16:3e:{:02x}:{:02x}:{:02x}", bytes[0], bytes[1], bytes[2])
}

/// Runs one `lxc.hook.clone` entry for a freshly created clone.
fn run_clone_hook(
    hook: &str,
    source: &ContainerHandle,
    clone: &ContainerHandle,
    extra_args: &[String],
) -> Result<()> {
    let mut words = hook.split_whitespace();
    let Some(program) = words.next() else {
        return Ok(());
    };
    let mut command = Command::new(program);
    let _ = command
        .args(words)
        .arg(&clone.name)
        .arg("lxc")
        .arg("clone")
        .args(extra_args)
        .env("LXC_NAME", &clone.name)
        .env("LXC_SRC_NAME", &source.name)
        .env("LXC_CONFIG_FILE", clone.config_path())
        .env("LXC_ROOTFS_PATH", clone.config.get(ROOTFS_PATH_KEY).unwrap_or_default());
    tracing::debug!(cmd = ?command, "running clone hook");
    let status = command.status().map_err(|e| CopyError::io(program, e))?;
    exec::check_status("clone hook", status)
}
