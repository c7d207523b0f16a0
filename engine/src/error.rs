//! Error types for the synchronization engine.
//!
//! `EngineError` covers everything that can abort a run: pre-flight failures
//! (bad source, overlapping trees) and per-entry I/O failures during the copy
//! or cleanup walks. There is no per-file error recording; the first failure
//! ends the run and is surfaced to the caller.
//!
//! `ConfigError` and `LoggingError` belong to the config store and the
//! logging setup respectively.

use std::io;
use std::path::PathBuf;

/// Errors that abort a synchronization run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("Source directory not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source path exists but is not a directory
    #[error("Source is not a directory: {}", path.display())]
    SourceNotDirectory { path: PathBuf },

    /// Source directory could not be inspected
    #[error("Source directory not accessible: {}: {source}", path.display())]
    SourceAccessDenied { path: PathBuf, source: io::Error },

    /// Source and destination trees nest inside one another
    #[error(
        "Source and destination overlap: {} / {}",
        source_path.display(),
        destination_path.display()
    )]
    OverlappingPaths {
        source_path: PathBuf,
        destination_path: PathBuf,
    },

    /// Failed to create a directory
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to list a directory or stat one of its entries
    #[error("Failed to enumerate directory {}: {source}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Failed to compare a source file against its destination copy
    #[error("Failed to compare {} with {}: {source}", src.display(), dst.display())]
    CompareFailed {
        src: PathBuf,
        dst: PathBuf,
        source: io::Error,
    },

    /// Failed to copy a source file over its destination
    #[error("Failed to copy {} to {}: {source}", src.display(), dst.display())]
    CopyFailed {
        src: PathBuf,
        dst: PathBuf,
        source: io::Error,
    },

    /// Failed to preserve the previous destination content in the cache
    #[error("Failed to version {} into {}: {source}", path.display(), version_path.display())]
    VersioningFailed {
        path: PathBuf,
        version_path: PathBuf,
        source: io::Error,
    },

    /// Failed to delete an obsolete entry or a pruned version
    #[error("Failed to remove {}: {source}", path.display())]
    RemoveFailed { path: PathBuf, source: io::Error },
}

impl EngineError {
    /// True for errors raised before any mutation of the destination tree.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::SourceNotDirectory { .. }
                | Self::SourceAccessDenied { .. }
                | Self::OverlappingPaths { .. }
        )
    }
}

/// Errors raised by the named job-config store.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config directory {}: {source}", path.display())]
    Directory { path: PathBuf, source: io::Error },

    #[error("Failed to read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write config {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("Invalid config JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Config '{name}' not found")]
    NotFound { name: String },
}

/// Errors that may occur while installing the log subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to prepare log directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to create log file {}: {source}", path.display())]
    CreateLogFile { path: PathBuf, source: io::Error },

    #[error("Log file path has no file name: {}", path.display())]
    InvalidPath { path: PathBuf },

    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Errors raised by the task registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No task registered for job '{job_id}'")]
    UnknownJob { job_id: String },

    #[error("Task for job '{job_id}' is already running")]
    AlreadyRunning { job_id: String },
}
