//! # Synchro Engine - One-Way Directory Synchronization
//!
//! A headless library that mirrors a source directory tree onto a destination
//! tree, preserving the previous content of every overwritten file in a
//! versioned cache under the destination.
//!
//! ## Overview
//!
//! One run of the engine:
//! - Validates the source and bootstraps the destination and its `.cache` directory
//! - Counts the files to process (after name exclusions)
//! - Copies new files, versions and replaces changed ones, skips identical ones
//! - Deletes destination entries that no longer exist in the source
//! - Logs throttled `Progress: N%` lines and a fixed-shape summary block
//!
//! The log is the status channel: `status::parse_log` reconstructs progress
//! and statistics from it, and `registry::TaskRegistry` tracks supervised
//! runs by job id.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use synchro_engine::{SyncEngine, SyncJob};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = SyncJob::new("/data/docs", "/backup/docs", "docs")
//!     .with_excluded_files(["Thumbs.db"])
//!     .with_excluded_dirs(["node_modules"])
//!     .with_version_retention(2);
//!
//! let mut engine = SyncEngine::new(job);
//! let summary = engine.run(None)?;
//! println!("{} files added, {} modified", summary.files_added, summary.files_modified);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Job description, exclusions, statistics, run phases
//! - **error**: Error types
//! - **fs_ops**: Low-level filesystem operations
//! - **scan**: Source-tree counting and source-set collection
//! - **versioning**: The versioned cache of overwritten files
//! - **progress**: Progress throttling and the callback trait
//! - **summary**: End-of-run summary and its log lines
//! - **job**: Run orchestration
//! - **status**: Log parsing
//! - **registry**: Supervisor-side task tracking and log retention
//! - **config**: Named JSON job configurations
//! - **logging**: Subscriber setup

pub mod model;
pub mod error;
pub mod fs_ops;
pub mod scan;
pub mod versioning;
pub mod progress;
pub mod summary;
pub mod job;
pub mod status;
pub mod registry;
pub mod config;
pub mod logging;

// Re-export main types and functions
pub use model::{Exclusions, FileOutcome, RunPhase, SyncJob, SyncStats, CACHE_DIR_NAME};
pub use error::{ConfigError, EngineError, LoggingError, RegistryError};
pub use job::{run_job, SyncEngine};
pub use progress::ProgressCallback;
pub use summary::SyncSummary;
pub use status::{parse_log, parse_log_file, LogStatus, ParsedSummary};
pub use registry::{prune_old_logs, task_log_path, TaskRecord, TaskRegistry, TaskStatus};
pub use config::{ConfigStore, JobConfig};
pub use logging::{LogGuard, LogOptions};
