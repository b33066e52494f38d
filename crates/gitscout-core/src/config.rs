//! Centralized configuration for GitScout.
//!
//! Constant tables for network, download, and path parameters, plus the
//! persisted `Settings` overlay loaded from a JSON file next to the working
//! directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GitScoutError, Result};

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const MAX_RETRIES: u32 = 3;
    /// Longest rate-limit reset the retry wrapper is willing to sleep through.
    pub const RATE_LIMIT_MAX_WAIT: Duration = Duration::from_secs(300);
    pub const OFFLINE_RECHECK_INTERVAL: Duration = Duration::from_secs(30);
    pub const ONLINE_VERIFY_INTERVAL: Duration = Duration::from_secs(300);
    pub const RESPONSE_CACHE_TTL: Duration = Duration::from_secs(3600);

    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const GITHUB_WEB_BASE: &'static str = "https://github.com";
    pub const GITHUB_RAW_BASE: &'static str = "https://raw.githubusercontent.com";
    pub const REPOS_PER_PAGE: u32 = 100;
    pub const USER_AGENT: &'static str = "gitscout/0.1";
}

/// Download subsystem configuration.
pub struct DownloadConfig;

impl DownloadConfig {
    pub const MAX_WORKERS: usize = 5;
    pub const TEMP_SUFFIX: &'static str = ".part";
    pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
    /// How long shutdown waits for workers to finish their in-flight task.
    pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
}

/// Shared directory and file name configuration.
pub struct PathsConfig;

impl PathsConfig {
    pub const CACHE_DIR_NAME: &'static str = "cache";
    pub const DOWNLOADS_DIR_NAME: &'static str = "downloads";
    pub const REPOSITORIES_DIR_NAME: &'static str = "repositories";
    pub const SETTINGS_FILENAME: &'static str = "config.json";
}

/// Persisted user settings.
///
/// Loaded from a JSON file, with unknown or missing fields falling back to
/// defaults. A corrupt file is replaced with a fresh default one rather than
/// failing startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// TTL for the response cache, in seconds.
    pub cache_ttl_secs: u64,
    /// Size of the download worker pool.
    pub max_concurrent_downloads: usize,
    /// Interval between background connectivity checks, in seconds.
    pub connection_check_interval_secs: u64,
    /// GitHub API token. The `GITHUB_TOKEN` environment variable wins over
    /// this value.
    pub github_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: NetworkConfig::RESPONSE_CACHE_TTL.as_secs(),
            max_concurrent_downloads: DownloadConfig::MAX_WORKERS,
            connection_check_interval_secs: NetworkConfig::OFFLINE_RECHECK_INTERVAL.as_secs(),
            github_token: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, creating the file with defaults when it is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Settings file {} is corrupt ({}), rewriting defaults", path.display(), e);
                    let settings = Settings::default();
                    let _ = settings.save(path);
                    settings
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Settings::default();
                let _ = settings.save(path);
                settings
            }
            Err(e) => {
                warn!("Failed to read settings {}: {}", path.display(), e);
                Settings::default()
            }
        }
    }

    /// Persist settings to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| GitScoutError::io_with_path(e, parent))?;
            }
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| GitScoutError::io_with_path(e, path))?;
        Ok(())
    }

    /// Resolve the GitHub token: environment first, then the persisted value.
    pub fn github_token(&self) -> Option<String> {
        std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.github_token.clone())
    }

    /// TTL for the response cache as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Standard directory layout rooted at a working directory.
#[derive(Debug, Clone)]
pub struct WorkDirs {
    root: PathBuf,
}

impl WorkDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::CACHE_DIR_NAME)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::DOWNLOADS_DIR_NAME)
    }

    pub fn repositories_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::REPOSITORIES_DIR_NAME)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(PathsConfig::SETTINGS_FILENAME)
    }
}
