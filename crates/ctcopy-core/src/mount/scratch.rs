//! Scratch directories backing copy-on-write mounts.
//!
//! Every aufs or overlay mount needs a private writable branch, and overlay
//! additionally a work directory on the same filesystem. Both live inside
//! the new container's directory so they disappear with it.

use std::path::Path;

use ctcopy_common::constants::{RANDOM_SUFFIX_LEN, UPPER_DIR_PREFIX, WORK_DIR_PREFIX};
use ctcopy_common::error::{CopyError, Result};
use tempfile::TempDir;

use super::{MountKind, MountTable};

/// Creates the upper and work directories of every layered mount in `table`.
///
/// Directories are named `<new_path>/<new_name>/delta-XXXXXX` and
/// `.../work-XXXXXX`. Each name is claimed by an exclusive `mkdir`, retried
/// with a new suffix on collision, so repeated calls never reuse a name.
///
/// Nothing is recorded in the table unless every directory was created;
/// on failure the directories created so far are removed again.
///
/// # Errors
///
/// Returns [`CopyError::Io`] if a directory cannot be created.
pub fn allocate_scratch_dirs(table: &mut MountTable, new_path: &Path, new_name: &str) -> Result<()> {
    if !table.needs_scratch() {
        return Ok(());
    }
    let base = new_path.join(new_name);
    let mut staged: Vec<(usize, TempDir, Option<TempDir>)> = Vec::new();

    for (index, spec) in table.iter().enumerate() {
        if !spec.kind.needs_scratch() {
            continue;
        }
        let upper = scratch_dir(&base, UPPER_DIR_PREFIX)?;
        let work = if spec.kind == MountKind::Overlay {
            Some(scratch_dir(&base, WORK_DIR_PREFIX)?)
        } else {
            None
        };
        staged.push((index, upper, work));
    }

    let mut staged = staged.into_iter().peekable();
    for (index, spec) in table.iter_mut().enumerate() {
        let Some((_, upper, work)) = staged.next_if(|(i, ..)| *i == index) else {
            continue;
        };
        spec.upper_dir = Some(upper.keep());
        if let Some(work) = work {
            spec.work_dir = Some(work.keep());
        }
        tracing::debug!(
            source = %spec.source,
            upper = ?spec.upper_dir,
            work = ?spec.work_dir,
            "allocated scratch directories"
        );
    }
    Ok(())
}

fn scratch_dir(base: &Path, prefix: &str) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .rand_bytes(RANDOM_SUFFIX_LEN)
        .tempdir_in(base)
        .map_err(|e| CopyError::io(base.join(format!("{prefix}XXXXXX")), e))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::mount::MountSpec;

    fn table_of(kinds: &[MountKind]) -> MountTable {
        let mut table = MountTable::new();
        for (i, kind) in kinds.iter().enumerate() {
            let path = format!("/src{i}");
            let mut spec = MountSpec::new(*kind, path.clone(), path);
            if *kind == MountKind::Aufs {
                spec.work_dir = Some(PathBuf::from("/dev/shm/aufs.xino"));
            }
            table.push(spec);
        }
        table
    }

    #[test]
    fn overlay_gets_upper_and_work_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("ct")).expect("container dir");
        let mut table = table_of(&[MountKind::Overlay]);

        allocate_scratch_dirs(&mut table, dir.path(), "ct").expect("allocate");

        let spec = table.iter().next().expect("entry");
        let upper = spec.upper_dir.as_ref().expect("upper");
        let work = spec.work_dir.as_ref().expect("work");
        assert!(upper.is_dir());
        assert!(work.is_dir());
        assert_eq!(upper.parent(), Some(dir.path().join("ct").as_path()));
        let upper_name = upper.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(upper_name.starts_with("delta-"));
        assert_eq!(upper_name.len(), "delta-".len() + 6);
        let work_name = work.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(work_name.starts_with("work-"));
    }

    #[test]
    fn aufs_keeps_xino_path_and_bind_is_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("ct")).expect("container dir");
        let mut table = table_of(&[MountKind::Bind, MountKind::Aufs]);

        allocate_scratch_dirs(&mut table, dir.path(), "ct").expect("allocate");

        let entries: Vec<_> = table.iter().collect();
        assert!(entries[0].upper_dir.is_none());
        assert!(entries[0].work_dir.is_none());
        assert!(entries[1].upper_dir.as_ref().is_some_and(|p| p.is_dir()));
        assert_eq!(entries[1].work_dir, Some(PathBuf::from("/dev/shm/aufs.xino")));
    }

    #[test]
    fn repeated_allocation_never_reuses_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("ct")).expect("container dir");
        let mut first = table_of(&[MountKind::Overlay]);
        let mut second = table_of(&[MountKind::Overlay]);

        allocate_scratch_dirs(&mut first, dir.path(), "ct").expect("first");
        allocate_scratch_dirs(&mut second, dir.path(), "ct").expect("second");

        let a = first.iter().next().expect("entry");
        let b = second.iter().next().expect("entry");
        assert_ne!(a.upper_dir, b.upper_dir);
        assert_ne!(a.work_dir, b.work_dir);
    }

    #[test]
    fn failure_leaves_table_and_disk_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut table = table_of(&[MountKind::Overlay]);
        let before = table.clone();

        // the container directory does not exist
        let err = allocate_scratch_dirs(&mut table, dir.path(), "missing").expect_err("no dir");
        assert!(matches!(err, CopyError::Io { .. }));
        assert_eq!(table, before);
        assert!(!dir.path().join("missing").exists());
    }
}
