//! End-of-run summary and its log rendering.
//!
//! The summary block is read back by supervisors scanning the log, so its
//! shape is fixed: a header line containing `Summary of operation`, then one
//! line per statistic, each indented by exactly two spaces and labelled with
//! the constants below.

use serde::{Deserialize, Serialize};

use crate::model::SyncStats;

pub const SUMMARY_HEADER: &str = "Summary of operation:";
pub const PROGRESS_PREFIX: &str = "Progress:";

pub const LABEL_DURATION: &str = "Total duration";
pub const LABEL_DIRS_ADDED: &str = "Directories added";
pub const LABEL_FILES_ADDED: &str = "Files added";
pub const LABEL_DIRS_MODIFIED: &str = "Directories modified";
pub const LABEL_FILES_MODIFIED: &str = "Files modified";
pub const LABEL_DIRS_DELETED: &str = "Directories deleted";
pub const LABEL_FILES_DELETED: &str = "Files deleted";
pub const LABEL_TOTAL_PROCESSED: &str = "Total files processed";

/// Final statistics of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub duration_secs: u64,
    pub directories_added: u64,
    pub files_added: u64,
    /// In-place directory modification is not tracked; always 0
    pub directories_modified: u64,
    pub files_modified: u64,
    pub directories_deleted: u64,
    pub files_deleted: u64,
    pub total_files_processed: u64,
}

impl SyncSummary {
    pub fn from_stats(stats: &SyncStats, duration_secs: u64) -> Self {
        SyncSummary {
            duration_secs,
            directories_added: stats.directories_added,
            files_added: stats.files_added,
            directories_modified: 0,
            files_modified: stats.files_modified,
            directories_deleted: stats.directories_deleted,
            files_deleted: stats.files_deleted,
            total_files_processed: stats.processed_files_count,
        }
    }

    /// The summary block, one log message per element, header first.
    pub fn log_lines(&self) -> Vec<String> {
        vec![
            SUMMARY_HEADER.to_string(),
            format!("  {}: {} seconds", LABEL_DURATION, self.duration_secs),
            format!("  {}: {}", LABEL_DIRS_ADDED, self.directories_added),
            format!("  {}: {}", LABEL_FILES_ADDED, self.files_added),
            format!("  {}: {}", LABEL_DIRS_MODIFIED, self.directories_modified),
            format!("  {}: {}", LABEL_FILES_MODIFIED, self.files_modified),
            format!("  {}: {}", LABEL_DIRS_DELETED, self.directories_deleted),
            format!("  {}: {}", LABEL_FILES_DELETED, self.files_deleted),
            format!("  {}: {}", LABEL_TOTAL_PROCESSED, self.total_files_processed),
        ]
    }

    /// True if the run changed nothing on disk.
    pub fn is_noop(&self) -> bool {
        self.directories_added == 0
            && self.files_added == 0
            && self.files_modified == 0
            && self.directories_deleted == 0
            && self.files_deleted == 0
    }
}

/// Progress line payload, e.g. `Progress: 45%`.
pub fn progress_line(percent: u8) -> String {
    format!("{} {}%", PROGRESS_PREFIX, percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_lines_shape() {
        let stats = SyncStats {
            directories_added: 2,
            files_added: 3,
            files_modified: 1,
            directories_deleted: 1,
            files_deleted: 4,
            processed_files_count: 4,
            ..Default::default()
        };
        let lines = SyncSummary::from_stats(&stats, 7).log_lines();

        assert!(lines[0].contains("Summary of operation"));
        assert!(lines[1..].iter().all(|l| l.starts_with("  ") && !l.starts_with("   ")));
        assert!(lines.contains(&"  Directories added: 2".to_string()));
        assert!(lines.contains(&"  Files added: 3".to_string()));
        assert!(lines.contains(&"  Directories modified: 0".to_string()));
        assert!(lines.contains(&"  Files modified: 1".to_string()));
        assert!(lines.contains(&"  Directories deleted: 1".to_string()));
        assert!(lines.contains(&"  Files deleted: 4".to_string()));
        assert!(lines.contains(&"  Total duration: 7 seconds".to_string()));
    }

    #[test]
    fn test_progress_line() {
        assert_eq!(progress_line(45), "Progress: 45%");
    }

    #[test]
    fn test_is_noop() {
        let mut summary = SyncSummary {
            total_files_processed: 10,
            ..Default::default()
        };
        assert!(summary.is_noop());
        summary.files_deleted = 1;
        assert!(!summary.is_noop());
    }
}
