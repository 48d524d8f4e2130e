//! Domain primitive types used across the ctcopy workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CopyError, Result};

/// What a single invocation does with the source container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    /// Full copy of the container.
    #[default]
    Copy,
    /// Copy-on-write snapshot of the container.
    Snapshot,
    /// Rename the container in place.
    Rename,
    /// Throwaway snapshot that is started and destroyed on shutdown.
    Ephemeral,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Snapshot => write!(f, "snapshot"),
            Self::Rename => write!(f, "rename"),
            Self::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// Flags forwarded to the clone operation.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneFlags {
    /// Create a copy-on-write snapshot instead of a full copy.
    pub snapshot: bool,
    /// Keep the hostname of the source container.
    pub keep_name: bool,
    /// Keep the MAC addresses of the source container.
    pub keep_mac: bool,
}

impl CloneFlags {
    /// Derives the clone flags for a task.
    ///
    /// Ephemeral clones are always snapshots.
    #[must_use]
    pub const fn for_task(task: Task, keep_name: bool, keep_mac: bool) -> Self {
        Self {
            snapshot: matches!(task, Task::Snapshot | Task::Ephemeral),
            keep_name,
            keep_mac,
        }
    }
}

/// Parses a block device size such as `512`, `2G` or `0x100 k` into bytes.
///
/// The number accepts decimal, `0x`-prefixed hexadecimal and `0`-prefixed
/// octal notation. Without a unit the value is in MiB; `b`, `k`, `m`, `g`
/// and `t` (either case, optionally followed by `B` or `iB`) select the
/// binary unit explicitly.
///
/// # Errors
///
/// Returns an error if the number or unit is invalid or the result overflows.
pub fn parse_fssize(input: &str) -> Result<u64> {
    let invalid = |reason: &str| CopyError::Config {
        message: format!("invalid filesystem size {input:?}: {reason}"),
    };

    let s = input.trim_start();
    let (digits, radix, rest) = split_number(s);
    if digits.is_empty() {
        return Err(invalid("missing number"));
    }
    let value = u64::from_str_radix(digits, radix).map_err(|_| invalid("number out of range"))?;

    let rest = rest.trim_start_matches([' ', '\t']);
    let mut chars = rest.chars();
    let multiplier: u64 = match chars.next() {
        None => 1 << 20,
        Some('b' | 'B') => 1,
        Some('k' | 'K') => 1 << 10,
        Some('m' | 'M') => 1 << 20,
        Some('g' | 'G') => 1 << 30,
        Some('t' | 'T') => 1 << 40,
        Some(other) => return Err(invalid(&format!("unknown unit '{other}'"))),
    };
    if !matches!(chars.as_str(), "" | "b" | "B" | "iB") {
        return Err(invalid("trailing characters after unit"));
    }

    value
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("size overflows 64 bits"))
}

/// Splits the leading number off `s`, returning its digits, radix and the rest.
fn split_number(s: &str) -> (&str, u32, &str) {
    let (body, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.starts_with(|c: char| c.is_ascii_hexdigit()) {
            (hex, 16)
        } else {
            (s, 10)
        }
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    let end = body
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(body.len());
    if radix == 8 && end == 0 {
        // a lone leading zero
        return ("0", 10, body);
    }
    (&body[..end], radix, &body[end..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_number_is_mebibytes() {
        assert_eq!(parse_fssize("512").expect("size"), 512 << 20);
    }

    #[test]
    fn units_are_case_insensitive() {
        assert_eq!(parse_fssize("2G").expect("size"), 2 << 30);
        assert_eq!(parse_fssize("2g").expect("size"), 2 << 30);
        assert_eq!(parse_fssize("3k").expect("size"), 3 << 10);
        assert_eq!(parse_fssize("1T").expect("size"), 1 << 40);
        assert_eq!(parse_fssize("100b").expect("size"), 100);
    }

    #[test]
    fn blanks_between_number_and_unit() {
        assert_eq!(parse_fssize("4 \tM").expect("size"), 4 << 20);
    }

    #[test]
    fn long_unit_suffixes() {
        assert_eq!(parse_fssize("1GiB").expect("size"), 1 << 30);
        assert_eq!(parse_fssize("1MB").expect("size"), 1 << 20);
    }

    #[test]
    fn hex_and_octal_numbers() {
        assert_eq!(parse_fssize("0x10 b").expect("size"), 16);
        assert_eq!(parse_fssize("010b").expect("size"), 8);
        assert_eq!(parse_fssize("0").expect("size"), 0);
    }

    #[test]
    fn rejects_missing_number() {
        assert!(parse_fssize("G").is_err());
        assert!(parse_fssize("").is_err());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_fssize("10x").is_err());
        assert!(parse_fssize("10Gfoo").is_err());
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_fssize("99999999999T").is_err());
    }

    #[test]
    fn ephemeral_and_snapshot_imply_snapshot_flag() {
        assert!(CloneFlags::for_task(Task::Ephemeral, false, false).snapshot);
        assert!(CloneFlags::for_task(Task::Snapshot, false, false).snapshot);
        assert!(!CloneFlags::for_task(Task::Copy, true, true).snapshot);
    }
}
