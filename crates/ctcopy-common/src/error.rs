//! Unified error types for the ctcopy workspace.
//!
//! Every library crate returns [`Result`]; the binary converts the error
//! into a process exit status at the very edge.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CopyError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A user supplied path could not be normalized.
    #[error("invalid path: {path:?}")]
    InvalidPath {
        /// The offending input.
        path: String,
    },

    /// A `-m` mount directive is malformed.
    #[error("invalid mount directive {directive:?}: {message}")]
    MountSpec {
        /// The raw directive text.
        directive: String,
        /// What is wrong with it.
        message: String,
    },

    /// A bind mount option other than `rw` or `ro` was given.
    #[error("invalid mount option {option:?}: expected \"rw\" or \"ro\"")]
    InvalidMountOption {
        /// The rejected option token.
        option: String,
    },

    /// An operation of the container runtime failed.
    #[error("{operation} failed: {message}")]
    Runtime {
        /// Name of the runtime operation.
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A permission or access check failed.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// An internal ordering invariant was violated.
    #[error("internal consistency violation: {message}")]
    InternalConsistency {
        /// Description of the violated invariant.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl CopyError {
    /// Builds an [`CopyError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`CopyError::Runtime`] for the named operation.
    pub fn runtime(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Runtime {
            operation,
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_mount_option_names_the_token() {
        let err = CopyError::InvalidMountOption {
            option: "badoption".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid mount option \"badoption\": expected \"rw\" or \"ro\""
        );
    }

    #[test]
    fn runtime_helper_formats_operation() {
        let err = CopyError::runtime("start", "exit status 1");
        assert_eq!(err.to_string(), "start failed: exit status 1");
    }
}
