//! Extra mounts injected into an ephemeral clone.
//!
//! A [`MountTable`] is built from the `-m` command-line directives
//! ([`parser`]), gets scratch directories for its copy-on-write entries
//! ([`scratch`]) and is finally rendered into `lxc.mount.entry` lines
//! ([`entry`]). The table is a plain owned value: whoever holds it decides
//! when it is dropped, and it is dropped as a whole.

pub mod entry;
pub mod parser;
pub mod scratch;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use ctcopy_common::error::CopyError;

/// Kind of mount requested by a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountKind {
    /// Plain bind mount of a host path.
    Bind,
    /// aufs union of a fresh writable branch over the host path.
    Aufs,
    /// overlayfs with the host path as lower directory.
    Overlay,
}

impl MountKind {
    /// Every kind, in directive-key order.
    pub const ALL: [Self; 3] = [Self::Bind, Self::Aufs, Self::Overlay];

    /// Returns the directive key selecting this kind.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Aufs => "aufs",
            Self::Overlay => "overlay",
        }
    }

    /// Returns whether mounts of this kind need an upper directory.
    #[must_use]
    pub const fn needs_scratch(self) -> bool {
        matches!(self, Self::Aufs | Self::Overlay)
    }
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for MountKind {
    type Err = CopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| CopyError::NotFound {
                kind: "mount type",
                id: s.to_owned(),
            })
    }
}

/// One requested extra mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Kind of mount.
    pub kind: MountKind,
    /// Normalized host path.
    pub source: String,
    /// Normalized path inside the container.
    pub destination: String,
    /// `rw` or `ro` for bind mounts, empty otherwise.
    pub options: String,
    /// Writable branch of an aufs or overlay mount.
    pub upper_dir: Option<PathBuf>,
    /// Overlay work directory, or the aufs xino file.
    pub work_dir: Option<PathBuf>,
}

impl MountSpec {
    /// Creates a spec with no options and no scratch paths.
    #[must_use]
    pub fn new(kind: MountKind, source: String, destination: String) -> Self {
        Self {
            kind,
            source,
            destination,
            options: String::new(),
            upper_dir: None,
            work_dir: None,
        }
    }
}

/// Ordered collection of mount specs, in command-line order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    entries: Vec<MountSpec>,
}

impl MountTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a parsed spec.
    pub fn push(&mut self, spec: MountSpec) {
        self.entries.push(spec);
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, MountSpec> {
        self.entries.iter()
    }

    /// Iterates mutably over the entries in insertion order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, MountSpec> {
        self.entries.iter_mut()
    }

    /// Returns whether any entry needs scratch directories.
    #[must_use]
    pub fn needs_scratch(&self) -> bool {
        self.entries.iter().any(|m| m.kind.needs_scratch())
    }
}

impl<'a> IntoIterator for &'a MountTable {
    type Item = &'a MountSpec;
    type IntoIter = std::slice::Iter<'a, MountSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for MountTable {
    type Item = MountSpec;
    type IntoIter = std::vec::IntoIter<MountSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_key() {
        for kind in MountKind::ALL {
            assert_eq!(kind.key().parse::<MountKind>().expect("kind"), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!("tmpfs".parse::<MountKind>().is_err());
        assert!("Bind".parse::<MountKind>().is_err());
    }

    #[test]
    fn only_layered_kinds_need_scratch() {
        assert!(!MountKind::Bind.needs_scratch());
        assert!(MountKind::Aufs.needs_scratch());
        assert!(MountKind::Overlay.needs_scratch());
    }

    #[test]
    fn table_keeps_insertion_order() {
        let mut table = MountTable::new();
        table.push(MountSpec::new(MountKind::Overlay, "/b".into(), "/b".into()));
        table.push(MountSpec::new(MountKind::Bind, "/a".into(), "/a".into()));

        let sources: Vec<_> = table.iter().map(|m| m.source.as_str()).collect();
        assert_eq!(sources, ["/b", "/a"]);
        assert!(table.needs_scratch());
        assert_eq!(table.len(), 2);
    }
}
