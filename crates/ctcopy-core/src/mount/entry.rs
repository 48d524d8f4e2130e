//! Rendering of mount specs into `lxc.mount.entry` values.
//!
//! The output is parsed by the container runtime as an fstab line, so the
//! templates below are a compatibility contract and must stay byte-exact.

use std::path::{Path, PathBuf};

use ctcopy_common::error::{CopyError, Result};

use super::{MountKind, MountSpec};

/// Renders one spec into the value of an `lxc.mount.entry` key.
///
/// Bind mounts create a directory or a file at the destination depending on
/// whether the source currently is a directory.
///
/// # Errors
///
/// Returns [`CopyError::InternalConsistency`] if an aufs or overlay spec is
/// rendered before its scratch directories were allocated.
pub fn render_entry(spec: &MountSpec) -> Result<String> {
    let MountSpec {
        source,
        destination,
        ..
    } = spec;

    let entry = match spec.kind {
        MountKind::Bind => {
            let create = if Path::new(source).is_dir() {
                "create=dir"
            } else {
                "create=file"
            };
            format!(
                "{source} {destination} none bind,optional,{},{create} 0 0",
                spec.options
            )
        }
        MountKind::Aufs => {
            let upper = scratch(spec, spec.upper_dir.as_ref(), "upper")?;
            let xino = scratch(spec, spec.work_dir.as_ref(), "xino")?;
            format!(
                "{source} {destination} aufs br={}=rw:{source}=ro,xino={},create=dir",
                upper.display(),
                xino.display()
            )
        }
        MountKind::Overlay => {
            let upper = scratch(spec, spec.upper_dir.as_ref(), "upper")?;
            let work = scratch(spec, spec.work_dir.as_ref(), "work")?;
            format!(
                "{source} {destination} overlay lowerdir={source},upperdir={},workdir={},create=dir",
                upper.display(),
                work.display()
            )
        }
    };
    Ok(entry)
}

impl MountSpec {
    /// Renders this spec into an `lxc.mount.entry` value.
    ///
    /// # Errors
    ///
    /// See [`render_entry`].
    pub fn to_entry(&self) -> Result<String> {
        render_entry(self)
    }
}

fn scratch<'a>(spec: &MountSpec, dir: Option<&'a PathBuf>, what: &str) -> Result<&'a PathBuf> {
    dir.ok_or_else(|| CopyError::InternalConsistency {
        message: format!(
            "{} mount of {} rendered without its {what} directory",
            spec.kind, spec.source
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::parser::parse_directive;

    #[test]
    fn bind_on_directory_creates_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().to_str().expect("utf-8").to_owned();
        let spec = parse_directive(MountKind::Bind, &src).expect("parse");

        assert_eq!(
            render_entry(&spec).expect("render"),
            format!("{src} {src} none bind,optional,rw,create=dir 0 0")
        );
    }

    #[test]
    fn bind_on_file_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("resolv.conf");
        std::fs::write(&file, b"nameserver 127.0.0.1\n").expect("write");
        let src = file.to_str().expect("utf-8");
        let spec = parse_directive(MountKind::Bind, &format!("{src}:/etc/resolv.conf:ro")).expect("parse");

        assert_eq!(
            spec.to_entry().expect("render"),
            format!("{src} /etc/resolv.conf none bind,optional,ro,create=file 0 0")
        );
    }

    #[test]
    fn bind_on_missing_source_creates_file() {
        let spec = parse_directive(MountKind::Bind, "/nonexistent/ctcopy-src:/mnt").expect("parse");
        assert_eq!(
            spec.to_entry().expect("render"),
            "/nonexistent/ctcopy-src /mnt none bind,optional,rw,create=file 0 0"
        );
    }

    #[test]
    fn overlay_entry_template() {
        let mut spec = parse_directive(MountKind::Overlay, "/lower:/merged").expect("parse");
        spec.upper_dir = Some(PathBuf::from("/new/ct/delta-XXXXXX"));
        spec.work_dir = Some(PathBuf::from("/new/ct/work-XXXXXX"));

        assert_eq!(
            render_entry(&spec).expect("render"),
            "/lower /merged overlay lowerdir=/lower,upperdir=/new/ct/delta-XXXXXX,workdir=/new/ct/work-XXXXXX,create=dir"
        );
    }

    #[test]
    fn aufs_entry_template() {
        let mut spec = parse_directive(MountKind::Aufs, "/lower").expect("parse");
        spec.upper_dir = Some(PathBuf::from("/new/ct/delta-abc123"));

        assert_eq!(
            render_entry(&spec).expect("render"),
            "/lower /lower aufs br=/new/ct/delta-abc123=rw:/lower=ro,xino=/dev/shm/aufs.xino,create=dir"
        );
    }

    #[test]
    fn rendering_is_repeatable() {
        let mut spec = parse_directive(MountKind::Overlay, "/lower").expect("parse");
        spec.upper_dir = Some(PathBuf::from("/u"));
        spec.work_dir = Some(PathBuf::from("/w"));
        assert_eq!(spec.to_entry().expect("first"), spec.to_entry().expect("second"));
    }

    #[test]
    fn layered_mount_without_scratch_is_an_internal_error() {
        let spec = parse_directive(MountKind::Overlay, "/lower").expect("parse");
        assert!(matches!(render_entry(&spec), Err(CopyError::InternalConsistency { .. })));

        let spec = parse_directive(MountKind::Aufs, "/lower").expect("parse");
        assert!(matches!(render_entry(&spec), Err(CopyError::InternalConsistency { .. })));
    }
}
