//! Source-tree scans.
//!
//! Two read-only walks over the source tree, both honoring the same
//! exclusion rules as the copy phase:
//! - `count_files`: the progress denominator
//! - `collect_source_set`: every surviving file and directory path, which
//!   the cleanup phase uses to decide what is obsolete
//!
//! Both walks use an explicit stack so nesting depth is bounded only by
//! memory, not by the call stack.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::fs_ops::{self, EntryKind};
use crate::model::{Exclusions, CACHE_DIR_NAME};

/// Absolute paths of the non-excluded entries under a source root.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    pub files: HashSet<PathBuf>,
    pub dirs: HashSet<PathBuf>,
}

impl SourceSet {
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path) || self.dirs.contains(path)
    }

    pub fn contains_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }
}

/// True for the root-level source entry that would land on the cache directory.
pub fn is_reserved_entry(root: &Path, path: &Path) -> bool {
    path.parent() == Some(root) && path.file_name().is_some_and(|n| n == CACHE_DIR_NAME)
}

/// Count the files under `root` that the copy phase will process.
pub fn count_files(root: &Path, exclusions: &Exclusions) -> Result<u64, EngineError> {
    let mut count = 0;
    walk(root, exclusions, |_, kind| {
        if kind == EntryKind::File {
            count += 1;
        }
    })?;
    Ok(count)
}

/// Collect the absolute paths of every non-excluded file and directory under `root`.
pub fn collect_source_set(root: &Path, exclusions: &Exclusions) -> Result<SourceSet, EngineError> {
    let mut set = SourceSet::default();
    walk(root, exclusions, |path, kind| match kind {
        EntryKind::File => {
            set.files.insert(path.to_path_buf());
        }
        EntryKind::Dir => {
            set.dirs.insert(path.to_path_buf());
        }
        EntryKind::Other => {}
    })?;
    Ok(set)
}

// Visit every non-excluded file and directory beneath `root` (not `root` itself).
fn walk<F>(root: &Path, exclusions: &Exclusions, mut visit: F) -> Result<(), EngineError>
where
    F: FnMut(&Path, EntryKind),
{
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs_ops::list_dir(&dir, true)? {
            if is_reserved_entry(root, &entry.path) {
                continue;
            }
            match entry.kind {
                EntryKind::File if !exclusions.is_excluded_file(&entry.path) => {
                    visit(&entry.path, EntryKind::File);
                }
                EntryKind::Dir if !exclusions.is_excluded_dir(&entry.path) => {
                    visit(&entry.path, EntryKind::Dir);
                    stack.push(entry.path);
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SyncJob;
    use std::fs;

    fn build_tree(root: &Path) {
        fs::create_dir_all(root.join("docs/drafts")).unwrap();
        fs::create_dir_all(root.join("build/out")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("Thumbs.db"), "x").unwrap();
        fs::write(root.join("docs/b.txt"), "b").unwrap();
        fs::write(root.join("docs/drafts/c.txt"), "c").unwrap();
        fs::write(root.join("docs/drafts/Thumbs.db"), "x").unwrap();
        fs::write(root.join("build/out/bin"), "x").unwrap();
        fs::write(root.join(".cache/stale"), "x").unwrap();
    }

    fn exclusions() -> Exclusions {
        SyncJob::new("/s", "/d", "t")
            .with_excluded_files(["Thumbs.db"])
            .with_excluded_dirs(["build"])
            .exclusions
    }

    #[test]
    fn test_count_files_respects_exclusions() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        build_tree(temp_dir.path());

        let count = count_files(temp_dir.path(), &exclusions()).expect("count failed");
        assert_eq!(count, 3);
    }

    #[test]
    fn test_count_empty_tree_is_zero() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        assert_eq!(count_files(temp_dir.path(), &Exclusions::default()).unwrap(), 0);
    }

    #[test]
    fn test_collect_source_set() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        build_tree(root);

        let set = collect_source_set(root, &exclusions()).expect("collect failed");
        assert_eq!(set.files.len(), 3);
        assert!(set.files.contains(&root.join("docs/drafts/c.txt")));
        assert!(!set.files.contains(&root.join("Thumbs.db")));

        assert_eq!(set.dirs.len(), 2);
        assert!(set.contains_dir(&root.join("docs")));
        assert!(set.contains_dir(&root.join("docs/drafts")));
        assert!(!set.contains(&root.join("build")));
        assert!(!set.contains(&root.join(".cache")));
    }

    #[test]
    fn test_reserved_entry_only_at_root() {
        let root = Path::new("/src");
        assert!(is_reserved_entry(root, Path::new("/src/.cache")));
        assert!(!is_reserved_entry(root, Path::new("/src/sub/.cache")));
        assert!(!is_reserved_entry(root, Path::new("/src/cache")));
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = count_files(&temp_dir.path().join("gone"), &Exclusions::default());
        assert!(result.is_err());
    }
}
