//! Supervisor-side task registry.
//!
//! Tracks one record per job id for processes running the engine. State is
//! derived from two sources: the log the process writes, and how the process
//! exited. The registry is an ordinary value; share it with `Arc` between
//! request handlers.
//!
//! Each run gets its own log file named after its config and start time
//! (`task_log_path`). Old task logs are removed by `prune_old_logs`, and a
//! long-lived supervisor log is emptied by `truncate_if_older`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::sanitize_name;
use crate::error::RegistryError;
use crate::status::{self, ParsedSummary};

/// Age after which task logs are removed.
pub const DEFAULT_LOG_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const LOG_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Lifecycle of a supervised task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Stopped,
    Error,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Stopped | TaskStatus::Error)
    }
}

/// Snapshot of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub job_id: String,
    pub log_path: PathBuf,
    pub status: TaskStatus,
    pub progress: u8,
    pub summary: Option<ParsedSummary>,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
    pub exit_code: Option<i32>,
    pub last_error: Option<String>,
}

impl TaskRecord {
    fn new(job_id: &str, log_path: &Path) -> Self {
        TaskRecord {
            job_id: job_id.to_string(),
            log_path: log_path.to_path_buf(),
            status: TaskStatus::Idle,
            progress: 0,
            summary: None,
            started_at: None,
            ended_at: None,
            exit_code: None,
            last_error: None,
        }
    }

    /// Seconds between start and end (or now, while running).
    pub fn duration_secs(&self) -> i64 {
        match self.started_at {
            Some(start) => {
                let end = self.ended_at.unwrap_or_else(Local::now);
                (end - start).num_seconds().max(0)
            }
            None => 0,
        }
    }

    fn finish(&mut self, status: TaskStatus) {
        self.status = status;
        self.ended_at = Some(Local::now());
    }
}

/// Registry of supervised tasks keyed by job id.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskRecord>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register (or re-register) a task in the `Idle` state.
    ///
    /// # Errors
    /// Returns RegistryError::AlreadyRunning if a task with this id is running.
    pub fn register(&self, job_id: &str, log_path: &Path) -> Result<(), RegistryError> {
        let mut tasks = self.lock();
        if let Some(existing) = tasks.get(job_id) {
            if existing.status == TaskStatus::Running {
                return Err(RegistryError::AlreadyRunning {
                    job_id: job_id.to_string(),
                });
            }
        }
        tasks.insert(job_id.to_string(), TaskRecord::new(job_id, log_path));
        Ok(())
    }

    pub fn mark_running(&self, job_id: &str) -> Result<(), RegistryError> {
        self.update(job_id, |task| {
            task.status = TaskStatus::Running;
            task.progress = 0;
            task.started_at = Some(Local::now());
            task.ended_at = None;
            task.exit_code = None;
            info!("Task '{}' started, log: {}", task.job_id, task.log_path.display());
        })
    }

    /// Re-read the task's log and update progress and statistics.
    ///
    /// An unreadable log only logs a warning; it never moves the task to
    /// `Error`.
    pub fn refresh_from_log(&self, job_id: &str) -> Result<TaskStatus, RegistryError> {
        let log_path = self.get(job_id)?.log_path;

        let parsed = match status::parse_log_file(&log_path) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Could not read log {} for task '{}': {}", log_path.display(), job_id, e);
                return self.get(job_id).map(|t| t.status);
            }
        };

        self.update(job_id, |task| {
            task.progress = parsed.progress;
            if parsed.summary.is_some() {
                task.summary = parsed.summary.clone();
            }
            if parsed.last_error.is_some() {
                task.last_error = parsed.last_error.clone();
            }
            if task.status == TaskStatus::Running && parsed.is_finished() {
                info!("Task '{}' reported completion in its log", task.job_id);
                task.finish(TaskStatus::Completed);
            }
        })?;
        self.get(job_id).map(|t| t.status)
    }

    /// Record how the task's process ended.
    ///
    /// A stop requested by the supervisor wins over the exit code. Otherwise
    /// exit code 0 means `Completed`, anything else (including no code at
    /// all, i.e. killed by a signal) means `Error`.
    pub fn record_exit(
        &self,
        job_id: &str,
        exit_code: Option<i32>,
        stop_requested: bool,
    ) -> Result<TaskStatus, RegistryError> {
        let mut result = TaskStatus::Idle;
        self.update(job_id, |task| {
            task.exit_code = exit_code;
            let status = if stop_requested {
                TaskStatus::Stopped
            } else if exit_code == Some(0) {
                task.progress = 100;
                TaskStatus::Completed
            } else {
                TaskStatus::Error
            };
            match status {
                TaskStatus::Error => warn!(
                    "Task '{}' ended with an error (exit code {:?})",
                    task.job_id, exit_code
                ),
                _ => info!("Task '{}' ended: {:?}", task.job_id, status),
            }
            task.finish(status);
            result = status;
        })?;
        Ok(result)
    }

    /// Cloned snapshot of one task.
    pub fn get(&self, job_id: &str) -> Result<TaskRecord, RegistryError> {
        self.lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownJob {
                job_id: job_id.to_string(),
            })
    }

    /// Snapshots of all tasks, sorted by job id.
    pub fn list(&self) -> Vec<TaskRecord> {
        let mut tasks: Vec<_> = self.lock().values().cloned().collect();
        tasks.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        tasks
    }

    pub fn remove(&self, job_id: &str) -> Option<TaskRecord> {
        self.lock().remove(job_id)
    }

    fn update<F>(&self, job_id: &str, f: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut tasks = self.lock();
        let task = tasks.get_mut(job_id).ok_or_else(|| RegistryError::UnknownJob {
            job_id: job_id.to_string(),
        })?;
        f(task);
        Ok(())
    }
}

/// Log file for a run of `config_name` started at `now`:
/// `<dir>/<name>_<YYYYmmdd_HHMMSS>.log`.
pub fn task_log_path(dir: &Path, config_name: &str, now: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "{}_{}.log",
        sanitize_name(config_name),
        now.format(LOG_STAMP_FORMAT)
    ))
}

/// Delete the files in `dir` last modified more than `max_age` ago.
///
/// Subdirectories are left alone. A file that cannot be inspected or removed
/// is logged and skipped.
///
/// # Returns
/// Paths of the removed files, sorted
///
/// # Errors
/// Returns the I/O error if `dir` itself cannot be read.
pub fn prune_old_logs(dir: &Path, max_age: Duration) -> io::Result<Vec<PathBuf>> {
    let cutoff = cutoff_for(max_age);
    let mut removed = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                error!("Failed to read an entry of {}: {}", dir.display(), e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }

        let outcome = modified_before(&path, cutoff).and_then(|old| {
            if old {
                fs::remove_file(&path).map(|_| true)
            } else {
                Ok(false)
            }
        });
        match outcome {
            Ok(true) => {
                info!("Old task log deleted: {}", path.display());
                removed.push(path);
            }
            Ok(false) => {}
            Err(e) => error!("Failed to clean up log {}: {}", path.display(), e),
        }
    }

    removed.sort();
    Ok(removed)
}

/// Empty the file at `path` if it was last modified more than `max_age` ago.
///
/// # Returns
/// true if the file was truncated; a missing file is not an error
pub fn truncate_if_older(path: &Path, max_age: Duration) -> io::Result<bool> {
    match modified_before(path, cutoff_for(max_age)) {
        Ok(true) => {
            OpenOptions::new().write(true).truncate(true).open(path)?;
            info!("Log emptied because it was too old: {}", path.display());
            Ok(true)
        }
        Ok(false) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn cutoff_for(max_age: Duration) -> SystemTime {
    SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn modified_before(path: &Path, cutoff: SystemTime) -> io::Result<bool> {
    Ok(fs::metadata(path)?.modified()? < cutoff)
}
