//! Named job configurations stored as JSON files.
//!
//! Each configuration lives in `<dir>/<name>.json`. Names are sanitized to
//! alphanumerics, `_` and `-` before they become file names.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::model::{Exclusions, SyncJob};

pub const DEFAULT_CONFIG_NAME: &str = "default_config";
pub const DEFAULT_MAX_CACHED_VERSIONS: usize = 2;
const CONFIG_EXTENSION: &str = "json";

fn default_max_cached_versions() -> usize {
    DEFAULT_MAX_CACHED_VERSIONS
}

/// A persisted job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub frequency_hours: Option<f64>,
    /// Semicolon-separated file names
    #[serde(default)]
    pub blacklist_files: String,
    /// Semicolon-separated directory names
    #[serde(default)]
    pub blacklist_dirs: String,
    #[serde(default = "default_max_cached_versions")]
    pub max_cached_versions: usize,
}

impl JobConfig {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        JobConfig {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            frequency_hours: None,
            blacklist_files: String::new(),
            blacklist_dirs: String::new(),
            max_cached_versions: DEFAULT_MAX_CACHED_VERSIONS,
        }
    }

    /// Build the engine job this configuration describes.
    pub fn to_sync_job(&self) -> SyncJob {
        let mut job = SyncJob::new(&self.source, &self.destination, self.name.clone())
            .with_excluded_files(Exclusions::parse_list(&self.blacklist_files))
            .with_excluded_dirs(Exclusions::parse_list(&self.blacklist_dirs))
            .with_version_retention(self.max_cached_versions);
        if let Some(hours) = self.frequency_hours {
            job = job.with_frequency_hours(hours);
        }
        job
    }
}

/// Reduce `name` to characters safe in a file name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        warn!("Invalid or empty config name '{}', using '{}'", name, DEFAULT_CONFIG_NAME);
        DEFAULT_CONFIG_NAME.to_string()
    } else {
        cleaned
    }
}

/// Directory of named configurations.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Open the store, creating its directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ConfigError::Directory {
            path: dir.clone(),
            source,
        })?;
        Ok(ConfigStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(sanitize_name(name))
            .with_extension(CONFIG_EXTENSION)
    }

    /// Names of all stored configurations, sorted.
    pub fn list(&self) -> Result<Vec<String>, ConfigError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| ConfigError::Directory {
            path: self.dir.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::Directory {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() || path.extension() != Some(OsStr::new(CONFIG_EXTENSION)) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(OsStr::to_str) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load a configuration; `Ok(None)` if it does not exist.
    pub fn load(&self, name: &str) -> Result<Option<JobConfig>, ConfigError> {
        let path = self.path_for(name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Config file not found: {}", path.display());
                return Ok(None);
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config = serde_json::from_str(&contents)
            .map_err(|source| ConfigError::Json { path: path.clone(), source })?;
        info!("Config '{}' loaded from {}", name, path.display());
        Ok(Some(config))
    }

    /// Like [`load`](Self::load), but a missing configuration is an error.
    pub fn load_required(&self, name: &str) -> Result<JobConfig, ConfigError> {
        self.load(name)?.ok_or_else(|| ConfigError::NotFound {
            name: name.to_string(),
        })
    }

    /// Write `config` under `name` as pretty JSON.
    pub fn save(&self, name: &str, config: &JobConfig) -> Result<PathBuf, ConfigError> {
        let path = self.path_for(name);
        let json = serde_json::to_string_pretty(config)
            .map_err(|source| ConfigError::Json { path: path.clone(), source })?;
        fs::write(&path, json).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
        info!("Config '{}' saved to {}", name, path.display());
        Ok(path)
    }

    /// Delete a configuration. Returns false if it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool, ConfigError> {
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Config '{}' deleted", name);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Attempted to delete missing config: {}", path.display());
                Ok(false)
            }
            Err(source) => Err(ConfigError::Write { path, source }),
        }
    }
}
