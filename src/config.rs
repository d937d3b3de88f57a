//! Application configuration and metadata directory resolution.
//!
//! Two layers:
//! 1. Application settings, a TOML file at `$MLCACHE_CONFIG` or
//!    `~/.config/mlcache/config.toml` (Linux/macOS),
//!    `%APPDATA%\mlcache\config.toml` (Windows). Built-in defaults otherwise.
//! 2. Cache tuning, the `mails_cache_config` JSON file inside the metadata
//!    directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MlError, Result};

/// Name of the metadata directory looked up in the working and home directories.
pub const ROOT_DIR_NAME: &str = ".mlcache";

/// File name of the cache tuning file inside the metadata directory.
pub const CACHE_CONFIG_FILE: &str = "mails_cache_config";

/// Log file written inside the metadata directory.
pub const LOG_FILE: &str = "mlcache.log";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Raw-source fetching.
    pub fetch: FetchConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Metadata directory used when neither `--dir` nor `$MLCACHE_DIR` is given.
    pub root_dir: Option<PathBuf>,
}

/// Raw-source fetching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Public-inbox site serving `/all/<msgid>/raw`.
    pub site: String,
    /// Minimum delay before every network fetch, in milliseconds.
    pub throttle_ms: u64,
}

/// Size limits of the tiered mail cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Active segment size (bytes, measured at open) that triggers rotation.
    pub max_active_cache_sz: u64,
    /// Maximum number of archive segments kept on disk.
    pub max_archived_caches: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            root_dir: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            site: "https://lore.kernel.org".to_string(),
            throttle_ms: 300,
        }
    }
}

impl FetchConfig {
    /// Throttle delay as a [`Duration`].
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_active_cache_sz: 100 * 1024 * 1024, // 100 MiB
            max_archived_caches: 9,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MLCACHE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mlcache").join("config.toml"))
}

/// Load the cache limits stored in `<root>/mails_cache_config`.
///
/// A missing file means defaults; missing keys keep their defaults. An
/// unreadable or malformed file is logged and the defaults are used.
pub fn load_cache_config(root: &Path) -> CacheConfig {
    let path = root.join(CACHE_CONFIG_FILE);
    if !path.is_file() {
        return CacheConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<CacheConfig>(&contents) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse cache config, using defaults"
                );
                CacheConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read cache config, using defaults"
            );
            CacheConfig::default()
        }
    }
}

/// Resolve the metadata directory holding cache and tag files.
///
/// Candidates, first existing wins: `explicit` (must exist), `$MLCACHE_DIR`,
/// `general.root_dir`, `./.mlcache`, `~/.mlcache`.
pub fn resolve_root_dir(explicit: Option<&Path>, config: &Config) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        if dir.is_dir() {
            return Ok(dir.to_path_buf());
        }
        return Err(MlError::RootNotFound(format!(
            "given directory {} does not exist",
            dir.display()
        )));
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(env_dir) = std::env::var("MLCACHE_DIR") {
        candidates.push(PathBuf::from(env_dir));
    }
    if let Some(ref dir) = config.general.root_dir {
        candidates.push(dir.clone());
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(ROOT_DIR_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(ROOT_DIR_NAME));
    }

    if let Some(found) = candidates.iter().find(|c| c.is_dir()) {
        return Ok(found.clone());
    }

    let tried: Vec<String> = candidates.iter().map(|c| c.display().to_string()).collect();
    Err(MlError::RootNotFound(format!("tried {}", tried.join(", "))))
}
