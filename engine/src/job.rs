//! Synchronization run orchestration.
//!
//! `SyncEngine` owns one full pass from source to destination:
//! - Validating paths and bootstrapping the destination and cache
//! - Counting the files to process
//! - Copying and updating files, versioning anything overwritten
//! - Deleting destination entries that no longer exist in the source
//! - Logging the final summary
//!
//! The engine is synchronous and single-threaded. Any I/O failure is logged
//! where it happens and aborts the run; there is no per-file retry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::fs_ops::{self, EntryKind};
use crate::model::{Exclusions, FileOutcome, RunPhase, SyncJob, SyncStats};
use crate::progress::ProgressCallback;
use crate::scan::{self, SourceSet};
use crate::summary::{progress_line, SyncSummary};
use crate::versioning::VersionCache;

/// Runs synchronization passes for one job.
#[derive(Debug)]
pub struct SyncEngine {
    job: SyncJob,
    source_root: PathBuf,
    destination_root: PathBuf,
    cache: VersionCache,
    stats: SyncStats,
    phase: RunPhase,
    run_id: Option<Uuid>,
}

impl SyncEngine {
    pub fn new(job: SyncJob) -> Self {
        let cache = VersionCache::new(&job.destination, job.version_retention);
        SyncEngine {
            source_root: job.source.clone(),
            destination_root: job.destination.clone(),
            cache,
            job,
            stats: SyncStats::default(),
            phase: RunPhase::Idle,
            run_id: None,
        }
    }

    pub fn job(&self) -> &SyncJob {
        &self.job
    }

    /// Statistics of the current or most recent run.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Identifier of the current or most recent run.
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.dir()
    }

    /// Execute one synchronization pass.
    ///
    /// Statistics are reset, then the run proceeds through validation, copy,
    /// source-set collection, cleanup and summary. A failure at any point
    /// leaves the engine in `RunPhase::Failed`; destination changes made
    /// before the failure are not rolled back.
    ///
    /// # Errors
    /// Returns EngineError for pre-flight failures (nothing touched) and for
    /// the first I/O failure during the walks.
    pub fn run(
        &mut self,
        progress: Option<&dyn ProgressCallback>,
    ) -> Result<SyncSummary, EngineError> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.stats = SyncStats::default();

        info!(
            "Starting synchronization for '{}' (run {})",
            self.job.job_id, run_id
        );

        match self.run_phases(progress, started) {
            Ok(summary) => {
                self.phase = RunPhase::Done;
                Ok(summary)
            }
            Err(e) => {
                let failed_in = self.phase;
                self.phase = RunPhase::Failed;
                if e.is_preflight() {
                    error!("Path verification failed: {}", e);
                } else {
                    error!(
                        "Synchronization for '{}' aborted while {}: {}",
                        self.job.job_id, failed_in, e
                    );
                }
                info!("Synchronization finished with errors (run {})", run_id);
                Err(e)
            }
        }
    }

    fn run_phases(
        &mut self,
        progress: Option<&dyn ProgressCallback>,
        started: Instant,
    ) -> Result<SyncSummary, EngineError> {
        self.phase = RunPhase::Validating;
        self.validate_paths()?;
        if let Some(hours) = self.job.frequency_hours {
            info!("Configured frequency: every {} hours", hours);
        }

        self.phase = RunPhase::Copying;
        self.stats.total_files_to_process =
            scan::count_files(&self.source_root, &self.job.exclusions)?;
        info!("Total files to process: {}", self.stats.total_files_to_process);
        if let Some(cb) = progress {
            cb.on_run_started(&self.job.job_id, self.stats.total_files_to_process);
        }

        Self::emit_progress(self.stats.start_progress(), progress);
        self.copy_tree(progress)?;
        Self::emit_progress(self.stats.finish_progress(), progress);
        info!("Copy/update phase finished for '{}'", self.job.job_id);

        self.phase = RunPhase::CollectingSourceSet;
        let source_set = scan::collect_source_set(&self.source_root, &self.job.exclusions)?;

        self.phase = RunPhase::CleaningUp;
        self.cleanup_obsolete(&source_set)?;

        self.phase = RunPhase::Summarizing;
        let summary = SyncSummary::from_stats(&self.stats, started.elapsed().as_secs());
        info!(
            "Synchronization for '{}' completed successfully (run {})",
            self.job.job_id,
            self.run_id.map(|id| id.to_string()).unwrap_or_default()
        );
        for line in summary.log_lines() {
            info!("{}", line);
        }
        if let Some(cb) = progress {
            cb.on_run_completed(&summary);
        }

        Ok(summary)
    }

    /// Check the source, bootstrap the destination and the cache directory.
    fn validate_paths(&mut self) -> Result<(), EngineError> {
        let source = match fs::canonicalize(&self.job.source) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::SourceNotFound {
                    path: self.job.source.clone(),
                });
            }
            Err(e) => {
                return Err(EngineError::SourceAccessDenied {
                    path: self.job.source.clone(),
                    source: e,
                });
            }
        };
        if !source.is_dir() {
            return Err(EngineError::SourceNotDirectory {
                path: self.job.source.clone(),
            });
        }

        let destination = resolve_destination(&self.job.destination).map_err(|e| {
            EngineError::DirectoryCreationFailed {
                path: self.job.destination.clone(),
                source: e,
            }
        })?;
        if trees_overlap(&source, &destination, &self.job.exclusions) {
            return Err(EngineError::OverlappingPaths {
                source_path: source,
                destination_path: destination,
            });
        }

        if fs_ops::ensure_dir_exists(&destination)? {
            info!("Destination directory did not exist, created: {}", destination.display());
            self.stats.directories_added += 1;
        }

        self.cache = VersionCache::new(&destination, self.job.version_retention);
        self.cache.ensure_exists()?;

        self.source_root = source;
        self.destination_root = destination;
        Ok(())
    }

    /// Mirror the source tree onto the destination, depth first.
    fn copy_tree(&mut self, progress: Option<&dyn ProgressCallback>) -> Result<(), EngineError> {
        let mut stack = vec![(self.source_root.clone(), self.destination_root.clone())];

        while let Some((src_dir, dst_dir)) = stack.pop() {
            // The root itself is never subject to exclusion
            if src_dir != self.source_root && self.job.exclusions.is_excluded_dir(&src_dir) {
                info!("Excluded directory: {}", src_dir.display());
                continue;
            }

            self.prepare_dir(&dst_dir)?;

            let mut subdirs = Vec::new();
            for entry in fs_ops::list_dir(&src_dir, true)? {
                let Some(name) = entry.path.file_name() else {
                    continue;
                };
                let dst_path = dst_dir.join(name);

                if scan::is_reserved_entry(&self.source_root, &entry.path) {
                    warn!(
                        "Skipping source entry that collides with the cache directory: {}",
                        entry.path.display()
                    );
                    continue;
                }

                match entry.kind {
                    EntryKind::File => {
                        if self.job.exclusions.is_excluded_file(&entry.path) {
                            info!("Excluded file: {}", entry.path.display());
                            continue;
                        }
                        let outcome = self.sync_file(&entry.path, &dst_path)?;
                        if let Some(cb) = progress {
                            cb.on_file_processed(&entry.path, outcome);
                        }
                        Self::emit_progress(self.stats.record_processed(), progress);
                    }
                    EntryKind::Dir => subdirs.push((entry.path, dst_path)),
                    EntryKind::Other => {
                        warn!(
                            "Skipping entry that is neither a file nor a directory: {}",
                            entry.path.display()
                        );
                    }
                }
            }

            // Reversed so the first listed subdirectory is popped first
            stack.extend(subdirs.into_iter().rev());
        }

        Ok(())
    }

    /// Make sure `dst_dir` exists as a directory, replacing a file in its way.
    fn prepare_dir(&mut self, dst_dir: &Path) -> Result<(), EngineError> {
        if let Ok(meta) = fs::symlink_metadata(dst_dir) {
            if !meta.is_dir() && !dst_dir.is_dir() {
                info!("Replacing file with directory: {}", dst_dir.display());
                self.cache.store_version(dst_dir, Local::now())?;
                self.log_failure(fs_ops::remove_file(dst_dir))?;
                self.stats.files_deleted += 1;
            }
        }

        if self.log_failure(fs_ops::ensure_dir_exists(dst_dir))? {
            self.stats.directories_added += 1;
            info!("Directory created: {}", dst_dir.display());
        }
        Ok(())
    }

    /// Apply the copy-or-version rule to one file.
    fn sync_file(&mut self, src: &Path, dst: &Path) -> Result<FileOutcome, EngineError> {
        let existing = match fs::symlink_metadata(dst) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                error!("Failed to inspect {}: {}", dst.display(), e);
                return Err(EngineError::EnumerationFailed {
                    path: dst.to_path_buf(),
                    source: e,
                });
            }
        };

        match existing {
            Some(meta) if meta.is_dir() => {
                info!("Replacing directory with file: {}", dst.display());
                self.log_failure(fs_ops::remove_tree(dst))?;
                self.stats.directories_deleted += 1;
                self.copy_into_place(src, dst)?;
                self.stats.files_added += 1;
                info!("File copied: {} -> {}", src.display(), dst.display());
                Ok(FileOutcome::Added)
            }
            Some(_) => {
                if self.log_failure(fs_ops::files_identical(src, dst))? {
                    info!("Identical file, skipped: {}", src.display());
                    return Ok(FileOutcome::Unchanged);
                }

                info!("Modified file: {}. Versioning previous content.", src.display());
                self.cache.store_version(dst, Local::now())?;
                self.stats.files_modified += 1;
                self.copy_into_place(src, dst)?;
                info!("File updated: {} -> {}", src.display(), dst.display());
                Ok(FileOutcome::Modified)
            }
            None => {
                self.copy_into_place(src, dst)?;
                self.stats.files_added += 1;
                info!("File copied: {} -> {}", src.display(), dst.display());
                Ok(FileOutcome::Added)
            }
        }
    }

    fn copy_into_place(&self, src: &Path, dst: &Path) -> Result<(), EngineError> {
        fs_ops::copy_file_with_metadata(src, dst)
            .map(|_| ())
            .map_err(|e| {
                error!("Failed to copy {} -> {}: {}", src.display(), dst.display(), e);
                EngineError::CopyFailed {
                    src: src.to_path_buf(),
                    dst: dst.to_path_buf(),
                    source: e,
                }
            })
    }

    /// Delete destination entries that have no counterpart in `source_set`.
    fn cleanup_obsolete(&mut self, source_set: &SourceSet) -> Result<(), EngineError> {
        info!("Starting obsolete-entry cleanup for '{}'", self.job.job_id);
        let mut stack = vec![self.destination_root.clone()];

        while let Some(dir) = stack.pop() {
            for entry in fs_ops::list_dir(&dir, false)? {
                if entry.path.as_path() == self.cache.dir() {
                    continue;
                }
                let Ok(relative) = entry.path.strip_prefix(&self.destination_root) else {
                    continue;
                };
                let expected = self.source_root.join(relative);

                if source_set.contains(&expected) {
                    if entry.kind == EntryKind::Dir && source_set.contains_dir(&expected) {
                        stack.push(entry.path);
                    }
                    continue;
                }

                match entry.kind {
                    EntryKind::File => {
                        if self.job.exclusions.is_excluded_file(&entry.path) {
                            continue;
                        }
                        self.log_failure(fs_ops::remove_file(&entry.path))?;
                        self.stats.files_deleted += 1;
                        info!("Obsolete file deleted: {}", entry.path.display());
                    }
                    EntryKind::Dir => {
                        if self.job.exclusions.is_excluded_dir(&entry.path) {
                            continue;
                        }
                        self.log_failure(fs_ops::remove_tree(&entry.path))?;
                        self.stats.directories_deleted += 1;
                        info!("Obsolete directory deleted: {}", entry.path.display());
                    }
                    EntryKind::Other => {
                        warn!(
                            "Entry left in place during cleanup (neither file nor directory): {}",
                            entry.path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }

    fn log_failure<T>(&self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            error!("{} (job '{}')", e, self.job.job_id);
        }
        result
    }

    fn emit_progress(percent: Option<u8>, progress: Option<&dyn ProgressCallback>) {
        if let Some(percent) = percent {
            info!("{}", progress_line(percent));
            if let Some(cb) = progress {
                cb.on_progress(percent);
            }
        }
    }
}

/// Run a single synchronization pass for `job`.
pub fn run_job(
    job: SyncJob,
    progress: Option<&dyn ProgressCallback>,
) -> Result<SyncSummary, EngineError> {
    SyncEngine::new(job).run(progress)
}

/// True if one tree contains the other.
///
/// A destination inside the source is accepted when the path between them
/// crosses an excluded directory, since the copy walk never enters it.
fn trees_overlap(source: &Path, destination: &Path, exclusions: &Exclusions) -> bool {
    if source.starts_with(destination) {
        return true;
    }
    match destination.strip_prefix(source) {
        Ok(inside) => !inside
            .components()
            .any(|c| exclusions.dirs.contains(c.as_os_str())),
        Err(_) => false,
    }
}

// Existing destinations are canonicalized like the source; missing ones are
// made absolute so the overlap check compares like with like.
fn resolve_destination(path: &Path) -> io::Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let absolute = std::path::absolute(path)?;
            // Resolve the deepest existing ancestor so symlinked parents compare correctly
            let mut existing = absolute.as_path();
            let mut tail = Vec::new();
            while !existing.exists() {
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Ok(absolute),
                }
            }
            let mut resolved = fs::canonicalize(existing)?;
            for name in tail.into_iter().rev() {
                resolved.push(name);
            }
            Ok(resolved)
        }
        Err(e) => Err(e),
    }
}
