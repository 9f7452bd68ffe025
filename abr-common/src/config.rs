//! Configuration loading and config file resolution
//!
//! Every field carries a compiled default, so a missing or partial TOML file
//! never prevents startup. Resolution order for the file itself:
//! 1. Command-line argument (highest priority)
//! 2. `ABR_CONFIG` environment variable
//! 3. Platform config locations (`~/.config/abr/abr-meta.toml`, `/etc/abr/abr-meta.toml`)
//! 4. Compiled defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ABR_CONFIG";

/// File name looked up in the platform config directories
pub const CONFIG_FILE_NAME: &str = "abr-meta.toml";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub rate_limits: RateLimitConfig,
    pub timeouts: TimeoutConfig,
    pub mam: MamConfig,
    pub audnex: AudnexConfig,
    pub audible: AudibleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5780".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive ("info", "abr_meta=debug", ...); `RUST_LOG` wins
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("abr.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of requests waiting for resolution
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Minimum interval between calls to each external source, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub scrape_secs: f64,
    pub primary_secs: f64,
    pub fallback_secs: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            scrape_secs: 5.0,
            primary_secs: 1.0,
            fallback_secs: 1.0,
        }
    }
}

/// Per-adapter call budget, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub scrape_secs: f64,
    pub primary_secs: f64,
    pub fallback_secs: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            scrape_secs: 45.0,
            primary_secs: 15.0,
            fallback_secs: 20.0,
        }
    }
}

/// MyAnonamouse page scraping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MamConfig {
    pub base_url: String,
    /// `mam_id` session cookie value
    pub mam_id: Option<String>,
    /// Optional Browserless endpoint used instead of a direct fetch
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
}

impl Default for MamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.myanonamouse.net".to_string(),
            mam_id: None,
            browserless_url: None,
            browserless_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudnexConfig {
    pub base_url: String,
    pub region: String,
}

impl Default for AudnexConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.audnex.us".to_string(),
            region: "us".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudibleConfig {
    pub base_url: String,
    pub num_results: u32,
    /// Follow the chosen search hit with a product detail call
    pub fetch_detail: bool,
}

impl Default for AudibleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.audible.com".to_string(),
            num_results: 5,
            fetch_detail: true,
        }
    }
}

/// Convert a seconds value from the config file into a Duration.
///
/// Negative, NaN and infinite values collapse to zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

impl TomlConfig {
    /// Apply environment overrides for secrets and deployment-specific values
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = non_empty_env("ABR_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = non_empty_env("ABR_DATABASE") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env("ABR_MAM_ID") {
            self.mam.mam_id = Some(v);
        }
        if let Some(v) = non_empty_env("ABR_BROWSERLESS_URL") {
            self.mam.browserless_url = Some(v);
        }
        if let Some(v) = non_empty_env("ABR_BROWSERLESS_TOKEN") {
            self.mam.browserless_token = Some(v);
        }
    }

    /// Reject values that would make the service misbehave rather than degrade
    pub fn validate(&self) -> Result<()> {
        if self.queue.capacity == 0 {
            return Err(Error::Config("queue.capacity must be at least 1".to_string()));
        }
        for (name, url) in [
            ("mam.base_url", &self.mam.base_url),
            ("audnex.base_url", &self.audnex.base_url),
            ("audible.base_url", &self.audible.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!("{name} must be an http(s) URL, got {url:?}")));
            }
        }
        if self.audible.num_results == 0 {
            return Err(Error::Config("audible.num_results must be at least 1".to_string()));
        }
        // A call that must wait a full interval for its slot would always hit its budget
        for (name, interval, budget) in [
            ("scrape", self.rate_limits.scrape_secs, self.timeouts.scrape_secs),
            ("primary", self.rate_limits.primary_secs, self.timeouts.primary_secs),
            ("fallback", self.rate_limits.fallback_secs, self.timeouts.fallback_secs),
        ] {
            let (interval, budget) = (secs_to_duration(interval), secs_to_duration(budget));
            if !budget.is_zero() && interval >= budget {
                return Err(Error::Config(format!(
                    "rate_limits.{name}_secs ({:?}) must be below timeouts.{name}_secs ({:?})",
                    interval, budget
                )));
            }
        }
        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Locate the config file following the resolution order above.
///
/// Returns `None` when no file applies; callers fall back to compiled defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Some(path) = non_empty_env(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("abr").join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/abr").join(CONFIG_FILE_NAME);
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the config for startup: resolve, read, apply env overrides.
///
/// A missing file logs a warning and yields defaults. A file that exists but
/// does not parse is an error, since silently ignoring it would hide typos.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            load_toml_config(&path)?
        }
        Some(path) => {
            warn!("Config file {} not found, using defaults", path.display());
            TomlConfig::default()
        }
        None => {
            info!("No config file found, using compiled defaults");
            TomlConfig::default()
        }
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Write config to disk atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// OS-dependent default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("abr"))
        .unwrap_or_else(|| PathBuf::from("./abr_data"))
}
