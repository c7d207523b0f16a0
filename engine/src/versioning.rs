//! Versioned copies of overwritten files.
//!
//! Before a destination file is replaced, its current content is copied into
//! the reserved cache directory. The cache mirrors the destination layout, so
//! `sub/report.txt` is versioned as `.cache/sub/report.txt.<stamp>`, where the
//! stamp is the local time at microsecond resolution (`YYYYMMDDHHMMSSffffff`).
//! If that name is taken, `-1`, `-2`, ... is appended until it is free.
//!
//! Retention is counted per relative path: after a new version is written,
//! the oldest versions of that same file beyond the limit are deleted. A limit
//! of 0 keeps every version.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{error, info};

use crate::error::EngineError;
use crate::fs_ops::{self, EntryKind};
use crate::model::CACHE_DIR_NAME;

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";
const STAMP_LEN: usize = 20;

/// A cached version found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedVersion {
    pub path: PathBuf,
    pub stamp: String,
    pub discriminator: u32,
}

/// The cache directory of one destination tree.
#[derive(Debug, Clone)]
pub struct VersionCache {
    root: PathBuf,
    dir: PathBuf,
    retention: usize,
}

impl VersionCache {
    pub fn new(destination_root: &Path, retention: usize) -> Self {
        VersionCache {
            root: destination_root.to_path_buf(),
            dir: destination_root.join(CACHE_DIR_NAME),
            retention,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the cache directory if needed.
    pub fn ensure_exists(&self) -> Result<bool, EngineError> {
        fs_ops::ensure_dir_exists(&self.dir)
    }

    /// Copy `existing` into the cache as a new version, then apply retention.
    ///
    /// `existing` is expected under the destination root; anything else is
    /// versioned by file name at the top of the cache.
    ///
    /// # Returns
    /// Path of the newly written version
    ///
    /// # Errors
    /// Returns EngineError::VersioningFailed if the copy fails; the caller
    /// must not overwrite `existing` in that case.
    pub fn store_version(&self, existing: &Path, now: DateTime<Local>) -> Result<PathBuf, EngineError> {
        let relative = self.relative_path(existing);
        let (version_dir, file_name) = self.location_of(&relative);
        let stamp = now.format(STAMP_FORMAT).to_string();

        if let Err(e) = fs::create_dir_all(&version_dir) {
            let version_path = version_dir.join(file_name);
            error!(
                "Failed to prepare cache directory {}: {}",
                version_dir.display(),
                e
            );
            return Err(EngineError::VersioningFailed {
                path: existing.to_path_buf(),
                version_path,
                source: e,
            });
        }
        let version_path = free_version_path(&version_dir, file_name, &stamp);

        if let Err(e) = fs_ops::copy_file_with_metadata(existing, &version_path) {
            error!(
                "Failed to version {} into {}: {}",
                existing.display(),
                version_path.display(),
                e
            );
            return Err(EngineError::VersioningFailed {
                path: existing.to_path_buf(),
                version_path,
                source: e,
            });
        }
        info!("Previous version saved: {} -> {}", existing.display(), version_path.display());

        if self.retention > 0 {
            self.prune(&relative)?;
        }

        Ok(version_path)
    }

    /// List the cached versions of the file at `relative` (a path relative to
    /// the destination root), oldest first.
    pub fn versions_of(&self, relative: &Path) -> Result<Vec<CachedVersion>, EngineError> {
        let (version_dir, file_name) = self.location_of(relative);
        let Some(name) = file_name.to_str() else {
            return Ok(Vec::new());
        };
        if !version_dir.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}.", name);

        let mut versions = Vec::new();
        for entry in fs_ops::list_dir(&version_dir, false)? {
            if entry.kind != EntryKind::File {
                continue;
            }
            let Some(entry_name) = entry.path.file_name().and_then(OsStr::to_str) else {
                continue;
            };
            let Some(suffix) = entry_name.strip_prefix(&prefix) else {
                continue;
            };
            if let Some((stamp, discriminator)) = parse_version_suffix(suffix) {
                versions.push(CachedVersion {
                    path: entry.path.clone(),
                    stamp,
                    discriminator,
                });
            }
        }

        versions.sort_by(|a, b| {
            a.stamp
                .cmp(&b.stamp)
                .then(a.discriminator.cmp(&b.discriminator))
        });
        Ok(versions)
    }

    /// Delete the oldest versions of `relative` beyond the retention limit.
    ///
    /// # Returns
    /// Paths of the versions removed
    pub fn prune(&self, relative: &Path) -> Result<Vec<PathBuf>, EngineError> {
        if self.retention == 0 {
            return Ok(Vec::new());
        }

        let versions = self.versions_of(relative)?;
        let excess = versions.len().saturating_sub(self.retention);
        let mut removed = Vec::with_capacity(excess);
        for version in versions.into_iter().take(excess) {
            if let Err(e) = fs_ops::remove_file(&version.path) {
                error!("Failed to prune cached version {}: {}", version.path.display(), e);
                return Err(e);
            }
            info!("Pruned cached version: {}", version.path.display());
            removed.push(version.path);
        }
        Ok(removed)
    }

    fn relative_path(&self, existing: &Path) -> PathBuf {
        match existing.strip_prefix(&self.root) {
            Ok(relative) if relative.file_name().is_some() => relative.to_path_buf(),
            _ => PathBuf::from(existing.file_name().unwrap_or_else(|| OsStr::new("unnamed"))),
        }
    }

    /// Cache directory and base name holding the versions of `relative`.
    fn location_of<'a>(&self, relative: &'a Path) -> (PathBuf, &'a OsStr) {
        let file_name = relative.file_name().unwrap_or_else(|| OsStr::new("unnamed"));
        let dir = match relative.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.dir.join(parent),
            _ => self.dir.clone(),
        };
        (dir, file_name)
    }
}

fn free_version_path(dir: &Path, file_name: &OsStr, stamp: &str) -> PathBuf {
    let mut base = OsString::from(file_name);
    base.push(".");
    base.push(stamp);

    let candidate = dir.join(&base);
    if !candidate.exists() {
        return candidate;
    }

    let mut discriminator = 1u32;
    loop {
        let mut name = base.clone();
        name.push(format!("-{}", discriminator));
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        discriminator += 1;
    }
}

/// Split `<stamp>[-<k>]` into its parts; None if it is not a version suffix.
fn parse_version_suffix(suffix: &str) -> Option<(String, u32)> {
    let (stamp, discriminator) = match suffix.split_once('-') {
        Some((stamp, k)) => (stamp, k.parse::<u32>().ok()?),
        None => (suffix, 0),
    };
    if stamp.len() != STAMP_LEN || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((stamp.to_string(), discriminator))
}
