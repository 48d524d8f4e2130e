//! Container configuration files.
//!
//! A container's `config` file is a list of `key = value` lines. Comments,
//! blank lines and line order are preserved across a load/save cycle so
//! that a clone's configuration reads like the one it was copied from.

use std::fmt;
use std::io::Write;
use std::path::Path;

use ctcopy_common::error::{CopyError, Result};

/// Keys that may appear any number of times; every `set` appends.
const MULTI_VALUED_KEYS: &[&str] = &[
    "lxc.mount.entry",
    "lxc.cap.drop",
    "lxc.cap.keep",
    "lxc.environment",
    "lxc.idmap",
    "lxc.include",
    "lxc.group",
    "lxc.apparmor.raw",
];

/// Key prefixes whose keys may appear any number of times.
const MULTI_VALUED_PREFIXES: &[&str] = &["lxc.hook."];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry { key: String, value: String },
    Verbatim(String),
}

/// In-memory model of a container configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerConfig {
    lines: Vec<Line>,
}

impl ContainerConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Parses configuration text.
    ///
    /// Lines that are not `key = value` pairs are kept verbatim.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return Line::Verbatim(raw.to_owned());
                }
                match trimmed.split_once('=') {
                    Some((key, value)) if !key.trim().is_empty() => Line::Entry {
                        key: key.trim().to_owned(),
                        value: value.trim().to_owned(),
                    },
                    _ => Line::Verbatim(raw.to_owned()),
                }
            })
            .collect();
        Self { lines }
    }

    /// Loads a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading container config");
        let text = std::fs::read_to_string(path).map_err(|e| CopyError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    /// Writes the configuration to `path` atomically.
    ///
    /// The text goes to a temporary file next to `path` which is then
    /// renamed over it, so readers never see a half written file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or renamed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CopyError::io(dir, e))?;
        tmp.write_all(self.to_string().as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| CopyError::io(tmp.path(), e))?;
        let _ = tmp.persist(path).map_err(|e| CopyError::io(path, e.error))?;
        tracing::debug!(path = %path.display(), "saved container config");
        Ok(())
    }

    /// Returns the last value set for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v)
            .next_back()
    }

    /// Returns every value set for `key`, in file order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries().filter(move |(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Iterates over all `(key, value)` pairs in file order.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, value } => Some((key.as_str(), value.as_str())),
            Line::Verbatim(_) => None,
        })
    }

    /// Sets `key` to `value`.
    ///
    /// Multi-valued keys such as `lxc.mount.entry` gain one more line; any
    /// other key has its last occurrence replaced, or is appended.
    pub fn set(&mut self, key: &str, value: &str) {
        if !is_multi_valued(key) {
            let last = self.lines.iter_mut().rev().find_map(|line| match line {
                Line::Entry { key: k, value: v } if *k == key => Some(v),
                _ => None,
            });
            if let Some(slot) = last {
                value.clone_into(slot);
                return;
            }
        }
        self.lines.push(Line::Entry {
            key: key.to_owned(),
            value: value.to_owned(),
        });
    }

    /// Rewrites values in place; `f` receives each key and a mutable value.
    pub fn rewrite(&mut self, mut f: impl FnMut(&str, &mut String)) {
        for line in &mut self.lines {
            if let Line::Entry { key, value } = line {
                f(key.as_str(), value);
            }
        }
    }
}

impl fmt::Display for ContainerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line {
                Line::Entry { key, value } => writeln!(f, "{key} = {value}")?,
                Line::Verbatim(raw) => writeln!(f, "{raw}")?,
            }
        }
        Ok(())
    }
}

fn is_multi_valued(key: &str) -> bool {
    MULTI_VALUED_KEYS.contains(&key) || MULTI_VALUED_PREFIXES.iter().any(|p| key.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Distribution configuration
lxc.include = /usr/share/lxc/config/common.conf
lxc.arch = linux64

lxc.rootfs.path = dir:/var/lib/lxc/base/rootfs
lxc.uts.name = base
lxc.net.0.hwaddr = 00:16:3e:aa:bb:cc
";

    #[test]
    fn parse_and_display_preserve_layout() {
        let config = ContainerConfig::parse(SAMPLE);
        assert_eq!(config.to_string(), SAMPLE);
    }

    #[test]
    fn get_returns_trimmed_value() {
        let config = ContainerConfig::parse("lxc.uts.name   =   web  \n");
        assert_eq!(config.get("lxc.uts.name"), Some("web"));
        assert_eq!(config.get("lxc.arch"), None);
    }

    #[test]
    fn set_replaces_single_valued_key() {
        let mut config = ContainerConfig::parse(SAMPLE);
        config.set("lxc.uts.name", "clone");
        assert_eq!(config.get_all("lxc.uts.name").count(), 1);
        assert_eq!(config.get("lxc.uts.name"), Some("clone"));
    }

    #[test]
    fn set_appends_multi_valued_key() {
        let mut config = ContainerConfig::parse(SAMPLE);
        config.set("lxc.mount.entry", "/a a none bind,optional,rw,create=dir 0 0");
        config.set("lxc.mount.entry", "/b b none bind,optional,ro,create=dir 0 0");
        config.set("lxc.hook.clone", "/usr/share/lxc/hooks/clonehostname");

        let entries: Vec<_> = config.get_all("lxc.mount.entry").collect();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].starts_with("/a "));
        assert!(config.to_string().ends_with("lxc.hook.clone = /usr/share/lxc/hooks/clonehostname\n"));
    }

    #[test]
    fn set_appends_unknown_key() {
        let mut config = ContainerConfig::new();
        config.set("lxc.ephemeral", "1");
        assert_eq!(config.to_string(), "lxc.ephemeral = 1\n");
    }

    #[test]
    fn rewrite_touches_every_entry() {
        let mut config = ContainerConfig::parse(SAMPLE);
        config.rewrite(|_, value| *value = value.replace("/base/", "/copy/"));
        assert_eq!(config.get("lxc.rootfs.path"), Some("dir:/var/lib/lxc/copy/rootfs"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config");
        let mut config = ContainerConfig::parse(SAMPLE);
        config.set("lxc.ephemeral", "1");

        config.save(&path).expect("save");
        let loaded = ContainerConfig::load(&path).expect("load");
        assert_eq!(loaded, config);
        assert_eq!(std::fs::read_dir(dir.path()).expect("read").count(), 1);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(ContainerConfig::load(&dir.path().join("config")).is_err());
    }
}
