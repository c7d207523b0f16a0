//! Reconstructing run status from a log file.
//!
//! A supervisor that only has the log of a running or finished job can
//! recover its progress and final statistics from it. Only the payload after
//! the level marker of each line matters; timestamps are ignored.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::summary::{
    LABEL_DIRS_ADDED, LABEL_DIRS_DELETED, LABEL_DIRS_MODIFIED, LABEL_DURATION,
    LABEL_FILES_ADDED, LABEL_FILES_DELETED, LABEL_FILES_MODIFIED, LABEL_TOTAL_PROCESSED,
    SUMMARY_HEADER,
};

static LEVEL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*?\b(TRACE|DEBUG|INFO|WARN|ERROR) (.*)$").expect("valid level regex")
});
static PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Progress:\s*(\d+)%").expect("valid progress regex"));
static STAT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+([A-Za-z ]+?):\s*(\d+)").expect("valid stat regex"));
static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid escape regex"));

/// Statistics recovered from a summary block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedSummary {
    pub directories_added: u64,
    pub files_added: u64,
    pub directories_modified: u64,
    pub files_modified: u64,
    pub directories_deleted: u64,
    pub files_deleted: u64,
    pub duration_secs: Option<u64>,
    pub total_files_processed: Option<u64>,
}

/// What a log says about a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogStatus {
    /// Last reported progress, 0 if none was reported
    pub progress: u8,
    pub summary: Option<ParsedSummary>,
    /// Number of error-level lines
    pub errors_seen: usize,
    pub last_error: Option<String>,
}

impl LogStatus {
    /// True once the log shows full progress and a summary.
    pub fn is_finished(&self) -> bool {
        self.progress == 100 && self.summary.is_some()
    }

    pub fn has_errors(&self) -> bool {
        self.errors_seen > 0
    }
}

/// Split a log line into its level and message payload.
///
/// Lines without a level marker are returned whole with no level.
pub fn message_payload(line: &str) -> (Option<&str>, &str) {
    match LEVEL_MARKER.captures(line) {
        Some(caps) => {
            let level = caps.get(1).map(|m| m.as_str());
            let payload = caps.get(2).map_or("", |m| m.as_str());
            (level, payload)
        }
        None => (None, line),
    }
}

/// Parse the full text of a log.
///
/// Terminal colour codes are stripped first, so captured console output
/// parses the same as the log file.
pub fn parse_log(text: &str) -> LogStatus {
    let mut status = LogStatus::default();
    let mut in_summary = false;

    for raw in text.lines() {
        let line = ANSI_ESCAPE.replace_all(raw, "");
        let (level, payload) = message_payload(&line);

        if level == Some("ERROR") {
            status.errors_seen += 1;
            status.last_error = Some(payload.trim().to_string());
        }

        if in_summary {
            if payload.starts_with("  ") && !payload.trim().is_empty() {
                if let Some(summary) = status.summary.as_mut() {
                    apply_stat_line(summary, payload);
                }
                continue;
            }
            in_summary = false;
        }

        if status.summary.is_none() && payload.contains(SUMMARY_HEADER.trim_end_matches(':')) {
            status.summary = Some(ParsedSummary::default());
            in_summary = true;
            continue;
        }

        if let Some(caps) = PROGRESS.captures(payload) {
            if let Ok(percent) = caps[1].parse::<u64>() {
                status.progress = percent.min(100) as u8;
            }
        }
    }

    status
}

/// Read and parse a log file.
pub fn parse_log_file(path: &Path) -> io::Result<LogStatus> {
    let bytes = fs::read(path)?;
    Ok(parse_log(&String::from_utf8_lossy(&bytes)))
}

fn apply_stat_line(summary: &mut ParsedSummary, payload: &str) {
    let Some(caps) = STAT_LINE.captures(payload) else {
        return;
    };
    let Ok(value) = caps[2].parse::<u64>() else {
        return;
    };
    match &caps[1] {
        LABEL_DIRS_ADDED => summary.directories_added = value,
        LABEL_FILES_ADDED => summary.files_added = value,
        LABEL_DIRS_MODIFIED => summary.directories_modified = value,
        LABEL_FILES_MODIFIED => summary.files_modified = value,
        LABEL_DIRS_DELETED => summary.directories_deleted = value,
        LABEL_FILES_DELETED => summary.files_deleted = value,
        LABEL_DURATION => summary.duration_secs = Some(value),
        LABEL_TOTAL_PROCESSED => summary.total_files_processed = Some(value),
        _ => {}
    }
}
