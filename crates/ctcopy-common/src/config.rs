//! Global configuration model for ctcopy.
//!
//! Defaults come from [`crate::constants`]; an optional JSON file can
//! override them, and command-line flags override both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CopyError, Result};

/// Root configuration for ctcopy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Directory holding the source containers.
    pub lxc_path: PathBuf,
    /// Backing store used for new clones when none is given.
    pub backing_store: Option<String>,
    /// Seconds an ephemeral clone is given to shut down after its command.
    pub shutdown_timeout_secs: u64,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            lxc_path: crate::constants::default_lxc_path().clone(),
            backing_store: None,
            shutdown_timeout_secs: crate::constants::SHUTDOWN_TIMEOUT.as_secs(),
        }
    }
}

impl CopyConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CopyError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads the file named by `path` if any, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a named file cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Returns the shutdown grace period.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_one_second_shutdown() {
        let config = CopyConfig::default();
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(1));
        assert!(config.backing_store.is_none());
    }

    #[test]
    fn load_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ctcopy.json");
        std::fs::write(&path, r#"{"lxc_path": "/srv/lxc"}"#).expect("write");

        let config = CopyConfig::load(&path).expect("load");
        assert_eq!(config.lxc_path, PathBuf::from("/srv/lxc"));
        assert_eq!(config.shutdown_timeout_secs, 1);
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ctcopy.json");
        std::fs::write(&path, "{ not json").expect("write");

        let err = CopyConfig::load(&path).expect_err("should fail");
        assert!(matches!(err, CopyError::Serialization { .. }));
    }

    #[test]
    fn load_or_default_without_path() {
        let config = CopyConfig::load_or_default(None).expect("defaults");
        assert_eq!(config, CopyConfig::default());
    }
}
