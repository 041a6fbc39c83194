//! Configuration schema and loader.
//!
//! Configuration is layered with figment, later sources overriding earlier
//! ones:
//!
//! 1. Built-in defaults
//! 2. `filament.toml` / `config.toml` from the search paths (current
//!    directory, then the user config directory)
//! 3. Environment variables prefixed `FILAMENT_`, with `__` as the section
//!    separator: `FILAMENT_TOKEN=...`, `FILAMENT_LOGGING__LEVEL=debug`,
//!    `FILAMENT_WEBHOOK__PORT=8443`
//!
//! The loading mechanism is deliberately dumb: the engine consumes the
//! resulting [`FilamentConfig`] and never reads the environment itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use filament_core::RetryPolicy;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The merged configuration did not deserialize.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Schema
// =============================================================================

/// How updates are ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Long-polling against the platform (the default).
    #[default]
    Polling,
    /// Push delivery through the webhook listener.
    Webhook,
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilamentConfig {
    /// Platform API credential.
    #[serde(default)]
    pub token: String,

    /// Base URL override for self-hosted platform API servers.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Update ingestion mode.
    #[serde(default)]
    pub mode: IngestMode,

    /// Server-side long-poll wait, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Bound on concurrently running handler tasks.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Retry/backoff settings for outbound calls.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Webhook listener settings (used in webhook mode).
    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for FilamentConfig {
    fn default() -> Self {
        Self {
            token: String::default(),
            api_url: None,
            mode: IngestMode::default(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            retry: RetrySettings::default(),
            webhook: WebhookSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_max_concurrency() -> usize {
    filament_core::DEFAULT_MAX_CONCURRENCY
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum retry attempts for bounded calls.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between transient retries, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Ceiling for the exponential backoff, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Wait applied to rate limits that carry no hint, in seconds.
    #[serde(default = "default_rate_limit_fallback_secs")]
    pub rate_limit_fallback_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            rate_limit_fallback_secs: default_rate_limit_fallback_secs(),
        }
    }
}

impl RetrySettings {
    /// Converts to the core retry policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: Some(self.max_attempts),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            rate_limit_fallback: Duration::from_secs(self.rate_limit_fallback_secs),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_rate_limit_fallback_secs() -> u64 {
    30
}

/// Webhook listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the push endpoint.
    #[serde(default = "default_path")]
    pub path: String,

    /// Public URL registered with the platform via `setWebhook`; when
    /// absent, registration is assumed to have happened out of band.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Secret echoed back by the platform on every push request.
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            public_url: None,
            secret: None,
        }
    }
}

impl WebhookSettings {
    /// The socket address to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/webhook".to_string()
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive form of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated.
    #[default]
    Compact,
    /// Default tracing layout.
    Full,
    /// Multi-line, human-oriented.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingSettings {
    /// Base verbosity; `RUST_LOG` overrides it when set.
    #[serde(default)]
    pub level: LogLevel,

    /// Line layout.
    #[serde(default)]
    pub format: LogFormat,
}

// =============================================================================
// Loader
// =============================================================================

/// Configuration loader with figment-based multi-source support.
///
/// # Example
///
/// ```rust,ignore
/// let config = ConfigLoader::new().with_current_dir().load()?;
/// ```
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
    config_file: Option<PathBuf>,
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader with defaults (env enabled, no search paths).
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
            config_file: None,
            load_env: true,
        }
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds the user config directory (`~/.config/filament`) to the search
    /// paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("filament")),
            None => self,
        }
    }

    /// Loads a specific file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Disables the environment variable layer.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<FilamentConfig> {
        let mut figment = Figment::from(Serialized::defaults(FilamentConfig::default()));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "loading configuration file");
            figment = figment.merge(Toml::file(path));
        } else {
            figment = self.search_config_files(figment);
        }

        if self.load_env {
            figment = figment.merge(Env::prefixed("FILAMENT_").split("__"));
        }

        let config: FilamentConfig = figment
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        debug!(
            mode = ?config.mode,
            logging_level = %config.logging.level,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Searches the configured paths for the first known file name.
    fn search_config_files(&self, mut figment: Figment) -> Figment {
        for search_path in &self.search_paths {
            for name in ["filament.toml", "config.toml"] {
                let candidate = search_path.join(name);
                if candidate.exists() {
                    info!(path = %candidate.display(), "loading configuration file");
                    figment = figment.merge(Toml::file(candidate));
                    return figment;
                }
            }
        }
        if !self.search_paths.is_empty() {
            warn!("no configuration file found, using defaults");
        }
        figment
    }
}

// =============================================================================
// Tests
// =============================================================================
