//! Parser for the `-m` mount directive mini-language.
//!
//! A `-m` value is a comma separated list of `kind=value` directives, where
//! `kind` is `bind`, `aufs` or `overlay` and `value` is a colon separated
//! `src[:dest[:opt]]` triple:
//!
//! | kind    | `src`       | `src:x`                                   | `src:dest:opt`     |
//! |---------|-------------|-------------------------------------------|--------------------|
//! | bind    | dest = src  | `x` is the destination if it contains a `/`, else the option | as written |
//! | aufs    | dest = src  | `x` is the destination                    | `opt` is ignored   |
//! | overlay | dest = src  | `x` is the destination                    | `opt` is ignored   |

use std::path::PathBuf;

use ctcopy_common::constants::AUFS_XINO_PATH;
use ctcopy_common::error::{CopyError, Result};

use super::{MountKind, MountSpec, MountTable};
use crate::path::normalize;

const FIELD_SEPARATOR: char = ':';
const DIRECTIVE_SEPARATOR: char = ',';
const DEFAULT_BIND_OPTION: &str = "rw";

/// Parses the value of one `kind=value` directive into a spec.
///
/// Fields past the last meaningful one are logged and ignored.
///
/// # Errors
///
/// Returns [`CopyError::MountSpec`] if the source or destination is not a
/// valid path, and [`CopyError::InvalidMountOption`] if a bind option is
/// anything but `rw` or `ro`.
pub fn parse_directive(kind: MountKind, raw: &str) -> Result<MountSpec> {
    let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
    let path = |field: &str, as_prefix: bool| {
        normalize(field, as_prefix).map_err(|e| CopyError::MountSpec {
            directive: format!("{kind}={raw}"),
            message: e.to_string(),
        })
    };

    let source = path(fields[0], true)?;
    let max_fields = if kind == MountKind::Bind { 3 } else { 2 };
    if fields.len() > max_fields {
        tracing::info!(
            kind = %kind,
            directive = raw,
            ignored = fields.len() - max_fields,
            "excess elements in mount specification"
        );
    }

    let mut spec = match kind {
        MountKind::Bind => {
            let (destination, option) = match fields[..] {
                [src] => (path(src, false)?, None),
                // a bare word names an option, which must then be `rw` or `ro`
                [src, opt] if !opt.contains('/') => (path(src, false)?, Some(opt)),
                [_, dest] => (path(dest, false)?, None),
                [_, dest, opt, ..] => (path(dest, false)?, Some(opt)),
                [] => unreachable!("split yields at least one field"),
            };
            let option = option.unwrap_or(DEFAULT_BIND_OPTION);
            if !is_bind_option(option) {
                return Err(CopyError::InvalidMountOption {
                    option: option.to_owned(),
                });
            }
            let mut spec = MountSpec::new(kind, source, destination);
            spec.options = option.to_owned();
            spec
        }
        MountKind::Aufs | MountKind::Overlay => {
            let destination = match fields[..] {
                [src] => path(src, false)?,
                [_, dest, ..] => path(dest, false)?,
                [] => unreachable!("split yields at least one field"),
            };
            MountSpec::new(kind, source, destination)
        }
    };

    if kind == MountKind::Aufs {
        spec.work_dir = Some(PathBuf::from(AUFS_XINO_PATH));
    }

    tracing::debug!(
        kind = %spec.kind,
        source = %spec.source,
        destination = %spec.destination,
        "parsed mount directive"
    );
    Ok(spec)
}

/// Parses one `-m` value and appends its directives to `table`.
///
/// Unknown directive keys and empty items are skipped.
///
/// # Errors
///
/// Returns the first directive error. Entries appended before the failure
/// stay in `table`; callers are expected to discard the table as a whole,
/// which [`MountTable::from_directives`] does.
pub fn parse_mount_option(value: &str, table: &mut MountTable) -> Result<()> {
    for item in value.split(DIRECTIVE_SEPARATOR).filter(|s| !s.is_empty()) {
        let (key, raw) = match item.split_once('=') {
            Some((key, raw)) => (key, Some(raw)),
            None => (item, None),
        };
        let Ok(kind) = key.parse::<MountKind>() else {
            tracing::debug!(key, "skipping unknown mount directive");
            continue;
        };
        let raw = raw.ok_or_else(|| CopyError::MountSpec {
            directive: item.to_owned(),
            message: "missing source path".into(),
        })?;
        table.push(parse_directive(kind, raw)?);
    }
    Ok(())
}

impl MountTable {
    /// Builds a table from every `-m` value given on the command line.
    ///
    /// A single bad directive invalidates the whole set: the partially
    /// built table is dropped and only the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first directive error encountered.
    pub fn from_directives<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for value in values {
            parse_mount_option(value.as_ref(), &mut table)?;
        }
        Ok(table)
    }
}

fn is_bind_option(token: &str) -> bool {
    matches!(token, "rw" | "ro")
}
