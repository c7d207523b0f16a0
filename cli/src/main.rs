//! Synchro - Command-line interface for the synchronization engine.
//!
//! `synchro run` performs one synchronization pass and logs progress and the
//! final summary; `synchro status` reads such a log back and prints what it
//! says as JSON; `synchro prune-logs` removes old run logs. Exit codes: 0
//! success, 1 synchronization failure, 2 invalid invocation or setup failure.

use clap::{Args, Parser, Subcommand};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;
use synchro_engine::{
    config::{ConfigStore, JobConfig, DEFAULT_CONFIG_NAME},
    logging::{self, LogOptions},
    registry::{self, DEFAULT_LOG_MAX_AGE},
    status, EngineError, FileOutcome, ProgressCallback, SyncEngine, SyncSummary,
};

/// Synchro - one-way directory synchronization with versioned backups
#[derive(Parser, Debug)]
#[command(name = "synchro")]
#[command(version = "0.1.0")]
#[command(about = "Mirror a directory tree, keeping previous versions of overwritten files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one synchronization pass
    Run(RunArgs),
    /// Print the progress and summary recorded in a run log
    Status(StatusArgs),
    /// Delete run logs older than the given age
    PruneLogs(PruneLogsArgs),
}

#[derive(Args, Debug, Default, Clone)]
struct RunArgs {
    /// Source directory
    #[arg(long, value_name = "PATH")]
    source: Option<PathBuf>,

    /// Destination directory
    #[arg(long, value_name = "PATH")]
    destination: Option<PathBuf>,

    /// Synchronization frequency in hours (informational)
    #[arg(long, value_name = "HOURS")]
    frequency: Option<f64>,

    /// Semicolon-separated file names to exclude
    #[arg(long, value_name = "NAMES")]
    blacklist_files: Option<String>,

    /// Semicolon-separated directory names to exclude
    #[arg(long, value_name = "NAMES")]
    blacklist_dirs: Option<String>,

    /// Job name, used in log lines and to look up a stored config
    #[arg(long, value_name = "NAME")]
    config_name: Option<String>,

    /// Directory of stored JSON configs; explicit flags override stored values
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// Log file to write
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Directory for a new `<config>_<YYYYmmdd_HHMMSS>.log`; ignored with --log-file
    #[arg(long, value_name = "PATH")]
    log_dir: Option<PathBuf>,

    /// Cached versions kept per file (0 = unlimited)
    #[arg(long, value_name = "N")]
    max_cached_versions: Option<usize>,

    /// Print each processed file to stderr
    #[arg(long)]
    verbose: bool,
}

#[derive(Args, Debug, Clone)]
struct StatusArgs {
    /// Log file written by `synchro run`
    #[arg(long, value_name = "PATH")]
    log_file: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct PruneLogsArgs {
    /// Directory of run logs
    #[arg(long, value_name = "PATH")]
    log_dir: PathBuf,

    /// Maximum age in days
    #[arg(long, value_name = "DAYS", default_value_t = DEFAULT_LOG_MAX_AGE.as_secs() / 86_400)]
    max_age_days: u64,

    /// Long-lived log to empty instead of delete once it is too old
    #[arg(long, value_name = "PATH")]
    app_log: Option<PathBuf>,
}

/// Why a command failed, and therefore how the process exits.
#[derive(Debug)]
enum CliFailure {
    Usage(String),
    Sync(EngineError),
}

impl CliFailure {
    fn exit_code(&self) -> i32 {
        match self {
            CliFailure::Sync(_) => 1,
            CliFailure::Usage(_) => 2,
        }
    }
}

impl fmt::Display for CliFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliFailure::Usage(msg) => write!(f, "{}", msg),
            CliFailure::Sync(e) => write!(f, "Synchronization failed: {}", e),
        }
    }
}

/// CLI implementation of ProgressCallback printing per-file outcomes
struct CliProgress {
    verbose: bool,
}

impl ProgressCallback for CliProgress {
    fn on_run_started(&self, job_id: &str, total_files: u64) {
        if self.verbose {
            eprintln!("[{}] {} files to process", job_id, total_files);
        }
    }

    fn on_file_processed(&self, path: &Path, outcome: FileOutcome) {
        if self.verbose {
            let status = match outcome {
                FileOutcome::Added => "Added",
                FileOutcome::Modified => "Modified",
                FileOutcome::Unchanged => "Unchanged",
            };
            eprintln!("{:>9}: {}", status, path.display());
        }
    }

    fn on_progress(&self, _percent: u8) {}

    fn on_run_completed(&self, summary: &SyncSummary) {
        if self.verbose {
            eprintln!(
                "Done in {}s: {} added, {} modified, {} deleted",
                summary.duration_secs,
                summary.files_added,
                summary.files_modified,
                summary.files_deleted + summary.directories_deleted
            );
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match &cli.command {
        Command::Run(args) => run_command(args),
        Command::Status(args) => match run_status(args) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(failure) => {
                eprintln!("Error: {}", failure);
                failure.exit_code()
            }
        },
        Command::PruneLogs(args) => prune_logs_command(args),
    };

    std::process::exit(exit_code);
}

/// Set up logging, run the job and map the outcome to an exit code.
///
/// The log guard is dropped before returning so buffered lines reach the
/// file before the process exits.
fn run_command(args: &RunArgs) -> i32 {
    let options = LogOptions {
        log_file: log_file_for(args),
        ..Default::default()
    };
    let _guard = match logging::init(&options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            return 2;
        }
    };
    install_panic_hook();

    match panic::catch_unwind(AssertUnwindSafe(|| run_cli(args))) {
        Ok(Ok(_)) => 0,
        Ok(Err(failure)) => {
            if let CliFailure::Usage(msg) = &failure {
                tracing::error!("Invalid invocation: {}", msg);
            }
            eprintln!("Error: {}", failure);
            failure.exit_code()
        }
        Err(_) => 1,
    }
}

/// The explicit log file, else a timestamped one under `--log-dir`.
fn log_file_for(args: &RunArgs) -> Option<PathBuf> {
    if let Some(path) = &args.log_file {
        return Some(path.clone());
    }
    let name = args.config_name.as_deref().unwrap_or(DEFAULT_CONFIG_NAME);
    args.log_dir
        .as_ref()
        .map(|dir| registry::task_log_path(dir, name, chrono::Local::now()))
}

fn prune_logs_command(args: &PruneLogsArgs) -> i32 {
    let _guard = match logging::init(&LogOptions::default()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {}", e);
            return 2;
        }
    };
    match run_prune_logs(args) {
        Ok(removed) => {
            tracing::info!("Removed {} old log(s) from {}", removed.len(), args.log_dir.display());
            0
        }
        Err(failure) => {
            eprintln!("Error: {}", failure);
            failure.exit_code()
        }
    }
}

fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        tracing::error!("Unexpected failure: {}\n{}", info, backtrace);
        default_hook(info);
    }));
}

/// Main run logic - separated for testability
fn run_cli(args: &RunArgs) -> Result<SyncSummary, CliFailure> {
    let config = resolve_config(args)?;
    let job = config.to_sync_job();
    let progress = CliProgress {
        verbose: args.verbose,
    };

    SyncEngine::new(job)
        .run(Some(&progress))
        .map_err(CliFailure::Sync)
}

/// Merge the stored config (if any) with the flags given on the command line.
fn resolve_config(args: &RunArgs) -> Result<JobConfig, CliFailure> {
    let name = args
        .config_name
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_NAME.to_string());

    let mut config = match &args.config_dir {
        Some(dir) => {
            if args.config_name.is_none() {
                return Err(CliFailure::Usage(
                    "--config-name is required with --config-dir".to_string(),
                ));
            }
            let store = ConfigStore::open(dir)
                .map_err(|e| CliFailure::Usage(format!("Config store error: {}", e)))?;
            store
                .load_required(&name)
                .map_err(|e| CliFailure::Usage(format!("Config store error: {}", e)))?
        }
        None => match (&args.source, &args.destination) {
            (Some(source), Some(destination)) => JobConfig::new(name.clone(), source, destination),
            _ => {
                return Err(CliFailure::Usage(
                    "--source and --destination are required unless --config-dir is given"
                        .to_string(),
                ))
            }
        },
    };

    config.name = name;
    if let Some(source) = &args.source {
        config.source = source.clone();
    }
    if let Some(destination) = &args.destination {
        config.destination = destination.clone();
    }
    if let Some(hours) = args.frequency {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(CliFailure::Usage(format!(
                "Invalid frequency '{}'. Must be a positive number of hours",
                hours
            )));
        }
        config.frequency_hours = Some(hours);
    }
    if let Some(files) = &args.blacklist_files {
        config.blacklist_files = files.clone();
    }
    if let Some(dirs) = &args.blacklist_dirs {
        config.blacklist_dirs = dirs.clone();
    }
    if let Some(limit) = args.max_cached_versions {
        config.max_cached_versions = limit;
    }

    Ok(config)
}

/// Parse a run log and render it as pretty JSON.
fn run_status(args: &StatusArgs) -> Result<String, CliFailure> {
    let parsed = status::parse_log_file(&args.log_file).map_err(|e| {
        CliFailure::Usage(format!(
            "Cannot read log file {}: {}",
            args.log_file.display(),
            e
        ))
    })?;
    serde_json::to_string_pretty(&parsed)
        .map_err(|e| CliFailure::Usage(format!("Cannot render status: {}", e)))
}

/// Remove stale run logs and empty a stale app log.
fn run_prune_logs(args: &PruneLogsArgs) -> Result<Vec<PathBuf>, CliFailure> {
    let max_age = Duration::from_secs(args.max_age_days.saturating_mul(86_400));
    let removed = registry::prune_old_logs(&args.log_dir, max_age).map_err(|e| {
        CliFailure::Usage(format!(
            "Cannot read log directory {}: {}",
            args.log_dir.display(),
            e
        ))
    })?;
    if let Some(app_log) = &args.app_log {
        if let Err(e) = registry::truncate_if_older(app_log, max_age) {
            tracing::error!("Failed to clean up log {}: {}", app_log.display(), e);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args_for(src: &Path, dst: &Path) -> RunArgs {
        RunArgs {
            source: Some(src.to_path_buf()),
            destination: Some(dst.to_path_buf()),
            config_name: Some("cli-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_cli_with_valid_directories() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");

        let summary = run_cli(&args_for(src_dir.path(), dst_dir.path()))
            .expect("CLI should succeed with valid directories");
        assert_eq!(summary.files_added, 1);
        assert_eq!(
            std::fs::read_to_string(dst_dir.path().join("test.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_cli_applies_blacklists() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("keep.txt"), "k").unwrap();
        std::fs::write(src_dir.path().join("skip.tmp"), "s").unwrap();
        std::fs::create_dir(src_dir.path().join("cache_dir")).unwrap();
        std::fs::write(src_dir.path().join("cache_dir/x"), "x").unwrap();

        let args = RunArgs {
            blacklist_files: Some("skip.tmp; other".to_string()),
            blacklist_dirs: Some("cache_dir".to_string()),
            ..args_for(src_dir.path(), dst_dir.path())
        };

        let summary = run_cli(&args).expect("CLI should succeed");
        assert_eq!(summary.files_added, 1);
        assert!(!dst_dir.path().join("skip.tmp").exists());
        assert!(!dst_dir.path().join("cache_dir").exists());
    }

    #[test]
    fn test_cli_rejects_missing_source() {
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        let result = run_cli(&args_for(Path::new("/nonexistent/path"), dst_dir.path()));
        let failure = result.expect_err("CLI should reject missing source");
        assert_eq!(failure.exit_code(), 1);
    }

    #[test]
    fn test_cli_requires_paths_without_config_dir() {
        let args = RunArgs {
            source: Some(PathBuf::from("/tmp")),
            ..Default::default()
        };
        let failure = run_cli(&args).expect_err("CLI should require a destination");
        assert_eq!(failure.exit_code(), 2);
    }

    #[test]
    fn test_cli_rejects_invalid_frequency() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");

        let args = RunArgs {
            frequency: Some(-1.0),
            ..args_for(src_dir.path(), dst_dir.path())
        };
        let failure = resolve_config(&args).expect_err("CLI should reject negative frequency");
        assert_eq!(failure.exit_code(), 2);
    }

    #[test]
    fn test_config_dir_requires_name() {
        let config_dir = TempDir::new().expect("Failed to create temp dir");
        let args = RunArgs {
            config_dir: Some(config_dir.path().to_path_buf()),
            ..Default::default()
        };
        let failure = resolve_config(&args).expect_err("name is required");
        assert_eq!(failure.exit_code(), 2);
    }

    #[test]
    fn test_stored_config_with_overrides() {
        let config_dir = TempDir::new().expect("Failed to create temp dir");
        let store = ConfigStore::open(config_dir.path()).unwrap();
        let mut stored = JobConfig::new("docs", "/data/docs", "/backup/docs");
        stored.blacklist_files = "Thumbs.db".to_string();
        stored.max_cached_versions = 4;
        store.save("docs", &stored).unwrap();

        let args = RunArgs {
            config_dir: Some(config_dir.path().to_path_buf()),
            config_name: Some("docs".to_string()),
            destination: Some(PathBuf::from("/elsewhere")),
            max_cached_versions: Some(1),
            ..Default::default()
        };

        let config = resolve_config(&args).expect("config should resolve");
        assert_eq!(config.source, PathBuf::from("/data/docs"));
        assert_eq!(config.destination, PathBuf::from("/elsewhere"));
        assert_eq!(config.blacklist_files, "Thumbs.db");
        assert_eq!(config.max_cached_versions, 1);
    }

    #[test]
    fn test_missing_stored_config_is_usage_error() {
        let config_dir = TempDir::new().expect("Failed to create temp dir");
        let args = RunArgs {
            config_dir: Some(config_dir.path().to_path_buf()),
            config_name: Some("absent".to_string()),
            ..Default::default()
        };
        let failure = run_cli(&args).expect_err("absent config should fail");
        assert_eq!(failure.exit_code(), 2);
    }

    #[test]
    fn test_default_retention_and_name() {
        let args = args_for(Path::new("/s"), Path::new("/d"));
        let config = resolve_config(&RunArgs {
            config_name: None,
            ..args
        })
        .unwrap();
        assert_eq!(config.name, DEFAULT_CONFIG_NAME);
        assert_eq!(config.max_cached_versions, 2);
    }

    #[test]
    fn test_status_renders_json() {
        let log_dir = TempDir::new().expect("Failed to create temp dir");
        let log_file = log_dir.path().join("run.log");
        std::fs::write(
            &log_file,
            "2025-05-20 10:00:00,000  INFO Progress: 100%\n\
             2025-05-20 10:00:00,000  INFO Summary of operation:\n\
             2025-05-20 10:00:00,000  INFO   Files added: 3\n",
        )
        .unwrap();

        let json = run_status(&StatusArgs { log_file }).expect("status should render");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["progress"], 100);
        assert_eq!(value["summary"]["files_added"], 3);
    }

    #[test]
    fn test_log_dir_gets_timestamped_file() {
        let args = RunArgs {
            log_dir: Some(PathBuf::from("/var/log/synchro")),
            config_name: Some("docs".to_string()),
            ..Default::default()
        };
        let path = log_file_for(&args).expect("log file");
        assert_eq!(path.parent(), Some(Path::new("/var/log/synchro")));
        let name = path.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.starts_with("docs_") && name.ends_with(".log"), "{}", name);
        // docs_YYYYmmdd_HHMMSS.log
        assert_eq!(name.len(), "docs_".len() + 15 + ".log".len());

        let explicit = RunArgs {
            log_file: Some(PathBuf::from("run.log")),
            ..args
        };
        assert_eq!(log_file_for(&explicit), Some(PathBuf::from("run.log")));
        assert_eq!(log_file_for(&RunArgs::default()), None);
    }

    #[test]
    fn test_prune_logs_removes_stale_logs() {
        let log_dir = TempDir::new().expect("Failed to create temp dir");
        let stale = log_dir.path().join("docs_20250101_000000.log");
        let fresh = log_dir.path().join("docs_20250520_000000.log");
        std::fs::write(&stale, "old").unwrap();
        std::fs::write(&fresh, "new").unwrap();
        let old = std::time::SystemTime::now() - Duration::from_secs(3 * 86_400);
        filetime::set_file_mtime(&stale, filetime::FileTime::from_system_time(old)).unwrap();

        let args = PruneLogsArgs {
            log_dir: log_dir.path().to_path_buf(),
            max_age_days: 2,
            app_log: None,
        };
        let removed = run_prune_logs(&args).expect("prune should succeed");
        assert_eq!(removed, vec![stale.clone()]);
        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_prune_logs_missing_dir_is_usage_error() {
        let log_dir = TempDir::new().expect("Failed to create temp dir");
        let args = PruneLogsArgs {
            log_dir: log_dir.path().join("none"),
            max_age_days: 7,
            app_log: None,
        };
        let failure = run_prune_logs(&args).expect_err("missing dir should fail");
        assert_eq!(failure.exit_code(), 2);
    }

    #[test]
    fn test_status_missing_log() {
        let log_dir = TempDir::new().expect("Failed to create temp dir");
        let args = StatusArgs {
            log_file: log_dir.path().join("none.log"),
        };
        assert!(run_status(&args).is_err());
    }
}
