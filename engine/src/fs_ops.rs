//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Listing a directory with entry kinds resolved
//! - Copying files with modification time and permission preservation
//! - Deep content comparison of two files
//! - Creating and removing directories and files

use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

const COMPARE_BUFFER_SIZE: usize = 64 * 1024;

/// Kind of a directory entry as seen by the walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Special file, broken symlink, or anything else that is neither
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// List the entries directly inside `dir`.
///
/// With `follow_links`, symlinks are classified by their target (a broken
/// link becomes `EntryKind::Other`); without it, a symlink is reported as a
/// file so it can be removed without touching its target.
///
/// # Errors
/// Returns EngineError::EnumerationFailed if the directory cannot be read.
pub fn list_dir(dir: &Path, follow_links: bool) -> Result<Vec<DirEntryInfo>, EngineError> {
    let entries = fs::read_dir(dir).map_err(|e| EngineError::EnumerationFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut listing = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::EnumerationFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();

        let kind = if follow_links {
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => EntryKind::File,
                Ok(meta) if meta.is_dir() => EntryKind::Dir,
                Ok(_) => EntryKind::Other,
                Err(e) if e.kind() == io::ErrorKind::NotFound => EntryKind::Other,
                Err(e) => {
                    return Err(EngineError::EnumerationFailed {
                        path: path.clone(),
                        source: e,
                    })
                }
            }
        } else {
            let file_type = entry.file_type().map_err(|e| EngineError::EnumerationFailed {
                path: path.clone(),
                source: e,
            })?;
            if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() || file_type.is_symlink() {
                EntryKind::File
            } else {
                EntryKind::Other
            }
        };

        listing.push(DirEntryInfo { path, kind });
    }

    Ok(listing)
}

/// Copy a file from source to destination with metadata preservation.
///
/// Permissions are carried by the copy itself; access and modification
/// times are applied afterwards where the target filesystem allows it.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> io::Result<u64> {
    // A read-only copy from an earlier run must not block the overwrite
    if let Ok(existing) = fs::metadata(dst) {
        let mut permissions = existing.permissions();
        if existing.is_file() && permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(dst, permissions)?;
        }
    }

    let bytes_copied = fs::copy(src, dst)?;

    let src_metadata = fs::metadata(src)?;
    let mtime = filetime::FileTime::from_last_modification_time(&src_metadata);
    let atime = filetime::FileTime::from_last_access_time(&src_metadata);
    if let Err(e) = filetime::set_file_times(dst, atime, mtime) {
        tracing::debug!("Could not preserve timestamps on {}: {}", dst.display(), e);
    }

    Ok(bytes_copied)
}

/// Compare two files byte for byte.
///
/// Sizes are checked first; equal-sized files are read in full. Modification
/// times are never consulted.
///
/// # Errors
/// Returns EngineError::CompareFailed if either file cannot be read.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool, EngineError> {
    let compare_err = |source: io::Error| EngineError::CompareFailed {
        src: a.to_path_buf(),
        dst: b.to_path_buf(),
        source,
    };

    let len_a = fs::metadata(a).map_err(compare_err)?.len();
    let len_b = fs::metadata(b).map_err(compare_err)?.len();
    if len_a != len_b {
        return Ok(false);
    }

    let mut reader_a = BufReader::new(fs::File::open(a).map_err(compare_err)?);
    let mut reader_b = BufReader::new(fs::File::open(b).map_err(compare_err)?);
    let mut buf_a = vec![0u8; COMPARE_BUFFER_SIZE];
    let mut buf_b = vec![0u8; COMPARE_BUFFER_SIZE];

    loop {
        let n = read_full(&mut reader_a, &mut buf_a).map_err(compare_err)?;
        let m = read_full(&mut reader_b, &mut buf_b).map_err(compare_err)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

// Fill `buf` as far as the reader allows; short only at end of file.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Ensure a directory exists, creating it (and its parents) if necessary.
///
/// # Returns
/// `true` if the directory had to be created
///
/// # Errors
/// Returns EngineError if the path exists but is not a directory, or if
/// creation fails
pub fn ensure_dir_exists(path: &Path) -> Result<bool, EngineError> {
    match fs::metadata(path) {
        Ok(metadata) => {
            if metadata.is_dir() {
                Ok(false)
            } else {
                Err(EngineError::DirectoryCreationFailed {
                    path: path.to_path_buf(),
                    source: io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "Path exists but is not a directory",
                    ),
                })
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            Ok(true)
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Remove a single file (or symlink).
pub fn remove_file(path: &Path) -> Result<(), EngineError> {
    fs::remove_file(path).map_err(|e| EngineError::RemoveFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Remove a directory and everything beneath it.
pub fn remove_tree(path: &Path) -> Result<(), EngineError> {
    fs::remove_dir_all(path).map_err(|e| EngineError::RemoveFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_list_dir_classifies_entries() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        fs::write(root.join("file1.txt"), b"data1").expect("Failed to write file1");
        fs::create_dir(root.join("subdir")).expect("Failed to create subdir");

        let listing = list_dir(root, true).expect("Failed to list");
        assert_eq!(listing.len(), 2);

        let files: Vec<_> = listing.iter().filter(|e| e.kind == EntryKind::File).collect();
        let dirs: Vec<_> = listing.iter().filter(|e| e.kind == EntryKind::Dir).collect();
        assert_eq!(files.len(), 1);
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].path.ends_with("subdir"));
    }

    #[cfg(unix)]
    #[test]
    fn test_list_dir_broken_symlink_is_other_when_following() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        std::os::unix::fs::symlink(root.join("missing"), root.join("dangling"))
            .expect("Failed to create symlink");

        let followed = list_dir(root, true).expect("Failed to list");
        assert_eq!(followed[0].kind, EntryKind::Other);

        let unfollowed = list_dir(root, false).expect("Failed to list");
        assert_eq!(unfollowed[0].kind, EntryKind::File);
    }

    #[test]
    fn test_list_nonexistent_dir_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = list_dir(&temp_dir.path().join("nonexistent"), true);
        assert!(matches!(result, Err(EngineError::EnumerationFailed { .. })));
    }

    #[test]
    fn test_copy_file_with_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");

        let mut file = fs::File::create(&src_file).expect("Failed to create source");
        file.write_all(b"test content").expect("Failed to write source");
        drop(file);

        let old = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src_file, old).expect("Failed to set mtime");

        let bytes = copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(bytes, 12);

        let content = fs::read_to_string(&dst_file).expect("Failed to read dest");
        assert_eq!(content, "test content");

        let dst_meta = fs::metadata(&dst_file).expect("Failed to stat dest");
        assert_eq!(filetime::FileTime::from_last_modification_time(&dst_meta), old);
    }

    #[test]
    fn test_copy_overwrites_existing_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");
        fs::write(&src_file, "new").expect("Failed to write source");
        fs::write(&dst_file, "old and longer").expect("Failed to write dest");

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(fs::read_to_string(&dst_file).unwrap(), "new");
    }

    #[test]
    fn test_copy_overwrites_read_only_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("dest.txt");
        fs::write(&src_file, "v2").unwrap();
        fs::write(&dst_file, "v1").unwrap();
        let mut permissions = fs::metadata(&dst_file).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&dst_file, permissions).unwrap();

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(fs::read_to_string(&dst_file).unwrap(), "v2");
    }

    #[test]
    fn test_files_identical_deep_compare() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        let c = temp_dir.path().join("c");

        fs::write(&a, "same bytes").unwrap();
        fs::write(&b, "same bytes").unwrap();
        fs::write(&c, "diff bytes").unwrap();

        // Identical timestamps must not make differing content look equal
        let stamp = filetime::FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(&a, stamp).unwrap();
        filetime::set_file_mtime(&c, stamp).unwrap();

        assert!(files_identical(&a, &b).expect("compare failed"));
        assert!(!files_identical(&a, &c).expect("compare failed"));
    }

    #[test]
    fn test_files_identical_large_files_differ_in_tail() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let a = temp_dir.path().join("a.bin");
        let b = temp_dir.path().join("b.bin");

        let mut data = vec![7u8; COMPARE_BUFFER_SIZE * 3 + 17];
        fs::write(&a, &data).unwrap();
        if let Some(last) = data.last_mut() {
            *last = 8;
        }
        fs::write(&b, &data).unwrap();

        assert!(!files_identical(&a, &b).expect("compare failed"));
        assert!(files_identical(&a, &a).expect("compare failed"));
    }

    #[test]
    fn test_files_identical_missing_file_errors() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let a = temp_dir.path().join("a");
        fs::write(&a, "x").unwrap();

        let result = files_identical(&a, &temp_dir.path().join("missing"));
        assert!(matches!(result, Err(EngineError::CompareFailed { .. })));
    }

    #[test]
    fn test_ensure_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("nested");

        assert!(ensure_dir_exists(&path).expect("Failed to create dir"));
        assert!(path.is_dir());
        assert!(!ensure_dir_exists(&path).expect("Second call failed"));
    }

    #[test]
    fn test_ensure_dir_exists_rejects_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("occupied");
        fs::write(&path, "not a dir").unwrap();

        let result = ensure_dir_exists(&path);
        assert!(matches!(result, Err(EngineError::DirectoryCreationFailed { .. })));
    }

    #[test]
    fn test_remove_helpers() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("gone.txt");
        let tree = temp_dir.path().join("tree");
        fs::write(&file, "x").unwrap();
        fs::create_dir_all(tree.join("a/b")).unwrap();
        fs::write(tree.join("a/b/c.txt"), "x").unwrap();

        remove_file(&file).expect("remove_file failed");
        remove_tree(&tree).expect("remove_tree failed");
        assert!(!file.exists());
        assert!(!tree.exists());

        assert!(matches!(remove_file(&file), Err(EngineError::RemoveFailed { .. })));
    }
}
