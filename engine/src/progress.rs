//! Progress reporting.
//!
//! Progress is the share of precounted files that finished processing,
//! floored to a whole percent. Lines are throttled: a percentage is reported
//! only when it is a multiple of 5 (which covers 0 and 100) and differs from
//! the last one reported.
//!
//! The `ProgressCallback` trait lets library callers observe a run without
//! reading the log.

use std::path::Path;

use crate::model::{FileOutcome, SyncStats};
use crate::summary::SyncSummary;

/// Trait for receiving progress updates from a synchronization run.
///
/// All methods are called synchronously from the thread executing the run.
pub trait ProgressCallback: Send {
    /// Called once the precount is known, before any file is copied.
    fn on_run_started(&self, job_id: &str, total_files: u64);

    /// Called after each non-excluded source file finishes processing.
    fn on_file_processed(&self, path: &Path, outcome: FileOutcome);

    /// Called whenever a (throttled) progress percentage is emitted.
    fn on_progress(&self, percent: u8);

    /// Called after the summary has been logged.
    fn on_run_completed(&self, summary: &SyncSummary);
}

/// Whole-percent progress, clamped to [0, 100]; 0 when nothing is expected.
pub fn progress_percent(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = processed.saturating_mul(100) / total;
    percent.min(100) as u8
}

/// Throttling rule for progress lines.
pub fn should_report(percent: u8, last_reported: Option<u8>) -> bool {
    let on_step = percent % 5 == 0 || percent == 0 || percent == 100;
    on_step && last_reported != Some(percent)
}

impl SyncStats {
    /// Count one more processed file.
    ///
    /// # Returns
    /// The percentage to emit, if the throttle lets one through
    pub fn record_processed(&mut self) -> Option<u8> {
        self.processed_files_count += 1;
        let percent = progress_percent(self.processed_files_count, self.total_files_to_process);
        self.try_report(percent)
    }

    /// Force a final 100% line at the end of the copy phase.
    pub fn finish_progress(&mut self) -> Option<u8> {
        self.try_report(100)
    }

    /// The 0% line emitted before the first file.
    pub fn start_progress(&mut self) -> Option<u8> {
        self.try_report(0)
    }

    fn try_report(&mut self, percent: u8) -> Option<u8> {
        if should_report(percent, self.last_reported_progress) {
            self.last_reported_progress = Some(percent);
            Some(percent)
        } else {
            None
        }
    }
}
