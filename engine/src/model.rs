//! Core data model for synchronization runs.
//!
//! This module defines:
//! - SyncJob: the immutable description of one synchronization pass
//! - Exclusions: bare file and directory names removed from consideration
//! - SyncStats: the per-run accumulator of counters and progress state
//! - RunPhase, FileOutcome: enums describing run and per-file results

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Name of the reserved cache subdirectory under the destination root.
pub const CACHE_DIR_NAME: &str = ".cache";

/// Describes one synchronization pass from `source` to `destination`.
///
/// A SyncJob is immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct SyncJob {
    /// Root source directory; must exist
    pub source: PathBuf,

    /// Root destination directory; created if absent
    pub destination: PathBuf,

    /// Names excluded from the sync
    pub exclusions: Exclusions,

    /// Maximum number of cached versions kept per file (0 = unlimited)
    pub version_retention: usize,

    /// Caller-supplied identifier, used only for log attribution
    pub job_id: String,

    /// Scheduling frequency in hours (informational; the engine never self-schedules)
    pub frequency_hours: Option<f64>,
}

impl SyncJob {
    pub fn new<S, D>(source: S, destination: D, job_id: impl Into<String>) -> Self
    where
        S: AsRef<Path>,
        D: AsRef<Path>,
    {
        SyncJob {
            source: source.as_ref().to_path_buf(),
            destination: destination.as_ref().to_path_buf(),
            exclusions: Exclusions::default(),
            version_retention: 0,
            job_id: job_id.into(),
            frequency_hours: None,
        }
    }

    pub fn with_excluded_files<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        self.exclusions.files.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_excluded_dirs<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        self.exclusions.dirs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_version_retention(mut self, limit: usize) -> Self {
        self.version_retention = limit;
        self
    }

    pub fn with_frequency_hours(mut self, hours: f64) -> Self {
        self.frequency_hours = Some(hours);
        self
    }
}

/// Bare file and directory names excluded from every phase of a run.
///
/// Matching is on the entry's base name only; these are not patterns or paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    pub files: HashSet<OsString>,
    pub dirs: HashSet<OsString>,
}

impl Exclusions {
    /// Split a semicolon-delimited name list, dropping blank segments.
    pub fn parse_list(list: &str) -> Vec<String> {
        list.split(';')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_excluded_file(&self, path: &Path) -> bool {
        Self::name_in(path, &self.files)
    }

    pub fn is_excluded_dir(&self, path: &Path) -> bool {
        Self::name_in(path, &self.dirs)
    }

    fn name_in(path: &Path, names: &HashSet<OsString>) -> bool {
        path.file_name()
            .map(|name| names.contains(OsStr::new(name)))
            .unwrap_or(false)
    }
}

/// Counters and progress state for a single run.
///
/// Reset to zero at the start of every run; never persisted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub directories_added: u64,
    pub files_added: u64,
    pub files_modified: u64,
    pub directories_deleted: u64,
    pub files_deleted: u64,

    /// Non-excluded files found by the precount (progress denominator)
    pub total_files_to_process: u64,

    /// Files that completed copy, version-and-copy, or skip-identical handling
    pub processed_files_count: u64,

    /// Last progress percentage emitted, if any
    pub last_reported_progress: Option<u8>,
}

/// The lifecycle of one run. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Idle,
    Validating,
    Copying,
    CollectingSourceSet,
    CleaningUp,
    Summarizing,
    Done,
    Failed,
}

impl RunPhase {
    /// Returns true once the run can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Validating => "validating",
            RunPhase::Copying => "copying",
            RunPhase::CollectingSourceSet => "collecting source set",
            RunPhase::CleaningUp => "cleaning up",
            RunPhase::Summarizing => "summarizing",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened to a single source file during the copy phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Destination did not exist; file copied
    Added,
    /// Destination differed; previous content versioned, then overwritten
    Modified,
    /// Destination already byte-identical
    Unchanged,
}
