//! Canonicalization of user supplied paths.
//!
//! Purely lexical: nothing here touches the filesystem, so paths that do
//! not exist yet (mount destinations inside the container) normalize the
//! same way as host paths.

use ctcopy_common::error::{CopyError, Result};

const SEPARATOR: char = '/';

/// Normalizes `path` into a clean, slash-joined form.
///
/// Empty and `.` segments are dropped and `..` folds into the preceding
/// segment. An absolute input stays absolute. With `as_prefix` the result
/// always carries a leading separator so it can be used as a root-anchored
/// prefix even when the input was relative.
///
/// # Errors
///
/// Returns [`CopyError::InvalidPath`] for an empty input, an input holding
/// a NUL byte, or a relative input that normalizes to nothing.
pub fn normalize(path: &str, as_prefix: bool) -> Result<String> {
    if path.is_empty() || path.contains('\0') {
        return Err(invalid(path));
    }

    let absolute = path.starts_with(SEPARATOR);
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    let _ = segments.pop();
                }
                // `..` at the root is the root itself
                _ if absolute || as_prefix => {}
                _ => segments.push(segment),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute || as_prefix {
        Ok(format!("{SEPARATOR}{joined}"))
    } else if joined.is_empty() {
        Err(invalid(path))
    } else {
        Ok(joined)
    }
}

fn invalid(path: &str) -> CopyError {
    CopyError::InvalidPath {
        path: path.to_owned(),
    }
}
