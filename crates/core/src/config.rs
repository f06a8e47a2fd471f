//! Resilience settings loader
//!
//! Loads [`ResilienceSettings`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If none are set, falls back to loading from file
//! 3. Searches multiple paths for config files
//! 4. Supports JSON and TOML formats
//! 5. Uses [`ResilienceSettings::default`] when no source is present
//!
//! ## Environment Variables
//! Each variable overrides one default; unset variables keep the default.
//! - `BULWARK_CB_FAILURE_THRESHOLD`: Consecutive failures before opening
//! - `BULWARK_CB_SUCCESS_THRESHOLD`: Half-open successes before closing
//! - `BULWARK_CB_TIMEOUT_MS`: Open-state dwell time in milliseconds
//! - `BULWARK_CB_FAILURE_RATE_THRESHOLD`: Failure percentage that opens
//! - `BULWARK_CB_MIN_REQUESTS`: Sample size before rate checks apply
//! - `BULWARK_RETRY_MAX_ATTEMPTS`: Attempts including the first
//! - `BULWARK_RETRY_BASE_DELAY_MS`: Delay before the second attempt
//! - `BULWARK_RETRY_MAX_DELAY_MS`: Backoff cap
//! - `BULWARK_RETRY_BACKOFF_FACTOR`: Multiplier per attempt
//! - `BULWARK_RETRY_JITTER`: Whether to randomize delays (true/false)
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./bulwark.toml` or `./bulwark.json` (current working directory)
//! 2. `../bulwark.toml` or `../bulwark.json` (parent directory)
//! 3. Relative to executable location

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bulwark_common::error::ConfigError;
use bulwark_common::resilience::{BulkheadConfig, CircuitBreakerConfig, RetryConfig};
use bulwark_common::utils::serde::option_duration_millis;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No BULWARK_* environment variables are set")]
    NoEnvironment,

    #[error("Invalid value for {name}: {message}")]
    InvalidEnv { name: String, message: String },

    #[error("Config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("No config file found in any of the standard locations")]
    NoConfigFile,

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {format} format: {message}")]
    Parse { format: &'static str, message: String },

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Result alias for settings loading
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Service-wide resilience settings
///
/// Per-name breaker overrides apply when a breaker is created without an
/// explicit config. Configured bulkheads are registered up front.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub default_circuit_breaker: CircuitBreakerConfig,
    pub default_retry: RetryConfig,
    pub circuit_breakers: BTreeMap<String, CircuitBreakerConfig>,
    pub bulkheads: BTreeMap<String, BulkheadConfig>,
    /// Acquire timeout for bulkheads created on first use
    #[serde(rename = "default_bulkhead_acquire_timeout_ms", with = "option_duration_millis")]
    pub default_bulkhead_acquire_timeout: Option<Duration>,
}

impl ResilienceSettings {
    /// Breaker config for `name`: its override, else the default
    #[must_use]
    pub fn circuit_breaker_config(&self, name: &str) -> &CircuitBreakerConfig {
        self.circuit_breakers.get(name).unwrap_or(&self.default_circuit_breaker)
    }

    /// Validate every contained config
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] whose field is scoped to the offending
    /// entry, such as `circuit_breakers.<name>.timeout`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_circuit_breaker.validate()?;
        self.default_retry.validate()?;
        for (name, config) in &self.circuit_breakers {
            config.validate().map_err(|err| scoped(err, "circuit_breakers", name))?;
        }
        for (name, config) in &self.bulkheads {
            config.validate().map_err(|err| scoped(err, "bulkheads", name))?;
        }
        if self.default_bulkhead_acquire_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConfigError::invalid(
                "default_bulkhead_acquire_timeout",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn scoped(err: ConfigError, table: &str, name: &str) -> ConfigError {
    match err {
        ConfigError::Invalid { field, message } => {
            ConfigError::invalid(format!("{table}.{name}.{field}"), message)
        }
        other => other,
    }
}

/// Load settings with automatic fallback strategy
///
/// Environment first, then the first config file found by
/// [`search_config_paths`], then defaults. A source that is present but
/// malformed is an error; only absence falls through.
///
/// # Errors
/// Returns [`SettingsError`] if a present source cannot be parsed or holds
/// invalid values.
pub fn load() -> SettingsResult<ResilienceSettings> {
    match load_from_env() {
        Ok(settings) => {
            tracing::info!("Resilience settings loaded from environment variables");
            return Ok(settings);
        }
        Err(SettingsError::NoEnvironment) => {
            tracing::debug!("No resilience environment variables set, trying file");
        }
        Err(err) => return Err(err),
    }

    match load_from_file(None) {
        Err(SettingsError::NoConfigFile) => {
            tracing::debug!("No resilience config file found, using defaults");
            Ok(ResilienceSettings::default())
        }
        other => other,
    }
}

/// Load settings from environment variables
///
/// # Errors
/// Returns [`SettingsError::NoEnvironment`] if no variable is set, or
/// [`SettingsError::InvalidEnv`] if one cannot be parsed.
pub fn load_from_env() -> SettingsResult<ResilienceSettings> {
    settings_from_lookup(|key| std::env::var(key).ok())
}

/// Build settings from an arbitrary variable lookup
pub(crate) fn settings_from_lookup<F>(lookup: F) -> SettingsResult<ResilienceSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = ResilienceSettings::default();
    let mut found = false;

    {
        let breaker = &mut settings.default_circuit_breaker;
        if let Some(value) = parsed(&lookup, "BULWARK_CB_FAILURE_THRESHOLD")? {
            breaker.failure_threshold = value;
            found = true;
        }
        if let Some(value) = parsed(&lookup, "BULWARK_CB_SUCCESS_THRESHOLD")? {
            breaker.success_threshold = value;
            found = true;
        }
        if let Some(millis) = parsed::<u64, _>(&lookup, "BULWARK_CB_TIMEOUT_MS")? {
            breaker.timeout = Duration::from_millis(millis);
            found = true;
        }
        if let Some(value) = parsed(&lookup, "BULWARK_CB_FAILURE_RATE_THRESHOLD")? {
            breaker.failure_rate_threshold = value;
            found = true;
        }
        if let Some(value) = parsed(&lookup, "BULWARK_CB_MIN_REQUESTS")? {
            breaker.min_requests = value;
            found = true;
        }
    }

    {
        let retry = &mut settings.default_retry;
        if let Some(value) = parsed(&lookup, "BULWARK_RETRY_MAX_ATTEMPTS")? {
            retry.max_attempts = value;
            found = true;
        }
        if let Some(millis) = parsed::<u64, _>(&lookup, "BULWARK_RETRY_BASE_DELAY_MS")? {
            retry.base_delay = Duration::from_millis(millis);
            found = true;
        }
        if let Some(millis) = parsed::<u64, _>(&lookup, "BULWARK_RETRY_MAX_DELAY_MS")? {
            retry.max_delay = Duration::from_millis(millis);
            found = true;
        }
        if let Some(value) = parsed(&lookup, "BULWARK_RETRY_BACKOFF_FACTOR")? {
            retry.backoff_factor = value;
            found = true;
        }
        if let Some(raw) = lookup("BULWARK_RETRY_JITTER") {
            retry.jitter = parse_bool("BULWARK_RETRY_JITTER", &raw)?;
            found = true;
        }
    }

    if !found {
        return Err(SettingsError::NoEnvironment);
    }

    settings.validate()?;
    Ok(settings)
}

/// Load settings from a file
///
/// If `path` is `None`, searches the standard locations. Format is detected
/// by file extension.
///
/// # Errors
/// Returns [`SettingsError`] if the file is missing, unreadable, malformed
/// or holds invalid values.
pub fn load_from_file(path: Option<PathBuf>) -> SettingsResult<ResilienceSettings> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SettingsError::FileNotFound(p));
            }
            p
        }
        None => search_config_paths().ok_or(SettingsError::NoConfigFile)?,
    };

    tracing::info!(path = %config_path.display(), "Loading resilience settings from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|source| SettingsError::Read { path: config_path.clone(), source })?;

    parse_settings(&contents, &config_path)
}

/// Parse and validate settings from string content
///
/// Format is detected by the extension of `path` (`.toml` or `.json`,
/// defaulting to JSON when there is none).
///
/// # Errors
/// Returns [`SettingsError`] if the format is unsupported, parsing fails or
/// validation fails.
pub fn parse_settings(contents: &str, path: &Path) -> SettingsResult<ResilienceSettings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    let settings: ResilienceSettings = match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SettingsError::Parse { format: "TOML", message: e.to_string() })?,
        "json" => serde_json::from_str(contents)
            .map_err(|e| SettingsError::Parse { format: "JSON", message: e.to_string() })?,
        _ => return Err(SettingsError::UnsupportedFormat(extension.to_string())),
    };

    settings.validate()?;
    Ok(settings)
}

/// Search standard locations for a settings file
///
/// Returns the first existing candidate, or `None`.
#[must_use]
pub fn search_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidate_files(&cwd));
        candidates.extend(candidate_files(&cwd.join("..")));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidate_files(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidate_files(dir: &Path) -> [PathBuf; 2] {
    [dir.join("bulwark.toml"), dir.join("bulwark.json")]
}

fn parsed<T, F>(lookup: &F, key: &str) -> SettingsResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| SettingsError::InvalidEnv {
                name: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn parse_bool(key: &str, raw: &str) -> SettingsResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SettingsError::InvalidEnv {
            name: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
