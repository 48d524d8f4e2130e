//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Default container directory when running as root.
pub const SYSTEM_LXC_PATH: &str = "/var/lib/lxc";

/// Returns the container directory, preferring the XDG data directory for
/// unprivileged users and falling back to `/var/lib/lxc` for root.
fn resolve_lxc_path() -> PathBuf {
    if nix::unistd::geteuid().is_root() {
        return PathBuf::from(SYSTEM_LXC_PATH);
    }
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        if !data_home.is_empty() {
            return PathBuf::from(data_home).join("lxc");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/share/lxc");
    }
    PathBuf::from(SYSTEM_LXC_PATH)
}

static LXC_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved default container directory for this session.
pub fn default_lxc_path() -> &'static PathBuf {
    LXC_PATH.get_or_init(resolve_lxc_path)
}

/// Name of the per-container configuration file.
pub const CONFIG_FILE_NAME: &str = "config";

/// Name of the root filesystem directory of a `dir` backed container.
pub const ROOTFS_DIR_NAME: &str = "rootfs";

/// Name of the writable layer of an overlay snapshot.
pub const SNAPSHOT_DELTA_DIR_NAME: &str = "delta0";

/// Fixed xino cache file handed to every aufs mount.
pub const AUFS_XINO_PATH: &str = "/dev/shm/aufs.xino";

/// Configuration key receiving one rendered mount entry.
pub const MOUNT_ENTRY_KEY: &str = "lxc.mount.entry";

/// Configuration key marking a container as self-destructing.
pub const EPHEMERAL_KEY: &str = "lxc.ephemeral";

/// Configuration key holding the container hostname.
pub const UTS_NAME_KEY: &str = "lxc.uts.name";

/// Configuration key holding the root filesystem location.
pub const ROOTFS_PATH_KEY: &str = "lxc.rootfs.path";

/// Configuration key listing hooks run after a clone.
pub const CLONE_HOOK_KEY: &str = "lxc.hook.clone";

/// Prefix of upper directories created for copy-on-write mounts.
pub const UPPER_DIR_PREFIX: &str = "delta-";

/// Prefix of work directories created for overlay mounts.
pub const WORK_DIR_PREFIX: &str = "work-";

/// Number of random characters in generated directory names.
pub const RANDOM_SUFFIX_LEN: usize = 6;

/// Mode applied to a directory created to reserve a random container name.
pub const RANDOM_NAME_DIR_MODE: u32 = 0o770;

/// Grace period given to an ephemeral clone after its command finished.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "CTCOPY_CONFIG";

/// Application name used in CLI output.
pub const APP_NAME: &str = "ctcopy";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lxc_path_ends_in_lxc() {
        let path = default_lxc_path();
        assert!(path.ends_with("lxc"));
    }
}
