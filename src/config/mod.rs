//! Configuration module for Kanshi Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every section has defaults,
//! so an empty document (or no file at all) yields a working configuration
//! pointed at a local backend.

use crate::models::ContentKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Backend base URL used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

/// Request-body limit of the relay deployment (4.5 MiB)
pub const RELAY_HARD_LIMIT_BYTES: u64 = 4_718_592;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Load from `path` when given, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.backend.base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid backend base_url '{}': must start with http:// or https://",
                self.backend.base_url
            )));
        }

        if self.backend.timeout_seconds == 0 || self.backend.upload_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "backend timeouts must be greater than zero".into(),
            ));
        }

        if self.storage.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "storage.timeout_seconds must be greater than zero".into(),
            ));
        }

        if !is_valid_http_url(&self.storage.upload_base_url) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid storage upload_base_url '{}': must start with http:// or https://",
                self.storage.upload_base_url
            )));
        }

        let upload = &self.upload;

        if upload.relay_max_bytes == 0 || upload.relay_max_bytes > RELAY_HARD_LIMIT_BYTES {
            return Err(ConfigError::ValidationError(format!(
                "relay_max_bytes must be between 1 and {} (relay request-size limit)",
                RELAY_HARD_LIMIT_BYTES
            )));
        }

        if upload.direct_video_max_bytes == 0 || upload.direct_photo_max_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "Direct upload ceilings must be greater than zero".into(),
            ));
        }

        if upload.relay_file_field.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "relay_file_field cannot be empty".into(),
            ));
        }

        for (name, value) in [
            ("poll_interval_millis", upload.poll_interval_millis),
            ("reconcile_tick_millis", upload.reconcile_tick_millis),
            (
                "duration_probe_timeout_seconds",
                upload.duration_probe_timeout_seconds,
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "upload.{} must be greater than zero",
                    name
                )));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level '{}': must be trace, debug, info, warn or error",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL including the API prefix, e.g. `https://host/api`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token attached to every backend call
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout in seconds for JSON and status calls. Default: 60
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Timeout in seconds for requests that carry a file body. Default: 600
    #[serde(default = "default_upload_timeout_seconds")]
    pub upload_timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_seconds: default_timeout_seconds(),
            upload_timeout_seconds: default_upload_timeout_seconds(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_seconds)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_upload_timeout_seconds() -> u64 {
    600
}

/// Which transfer path an upload takes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Signed upload straight to object storage, then a metadata save call
    #[default]
    Direct,
    /// Multipart body sent to the backend, which stores it
    Relay,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::Relay => "relay",
        }
    }
}

/// Upload lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default = "default_relay_max_bytes")]
    pub relay_max_bytes: u64,
    #[serde(default = "default_direct_video_max_bytes")]
    pub direct_video_max_bytes: u64,
    #[serde(default = "default_direct_photo_max_bytes")]
    pub direct_photo_max_bytes: u64,
    /// Multipart field carrying the file on the relay path
    #[serde(default = "default_relay_file_field")]
    pub relay_file_field: String,
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
    #[serde(default = "default_reconcile_tick_millis")]
    pub reconcile_tick_millis: u64,
    #[serde(default = "default_completion_delay_millis")]
    pub completion_delay_millis: u64,
    #[serde(default = "default_duration_probe_timeout_seconds")]
    pub duration_probe_timeout_seconds: u64,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            relay_max_bytes: default_relay_max_bytes(),
            direct_video_max_bytes: default_direct_video_max_bytes(),
            direct_photo_max_bytes: default_direct_photo_max_bytes(),
            relay_file_field: default_relay_file_field(),
            poll_interval_millis: default_poll_interval_millis(),
            reconcile_tick_millis: default_reconcile_tick_millis(),
            completion_delay_millis: default_completion_delay_millis(),
            duration_probe_timeout_seconds: default_duration_probe_timeout_seconds(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

impl UploadConfig {
    /// Largest accepted file for the given path and content kind
    pub fn ceiling(&self, strategy: StrategyKind, kind: ContentKind) -> u64 {
        match (strategy, kind) {
            (StrategyKind::Relay, _) => self.relay_max_bytes,
            (StrategyKind::Direct, ContentKind::Video) => self.direct_video_max_bytes,
            (StrategyKind::Direct, ContentKind::Photo) => self.direct_photo_max_bytes,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn reconcile_tick(&self) -> Duration {
        Duration::from_millis(self.reconcile_tick_millis)
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_millis)
    }

    pub fn duration_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.duration_probe_timeout_seconds)
    }
}

fn default_relay_max_bytes() -> u64 {
    RELAY_HARD_LIMIT_BYTES
}

fn default_direct_video_max_bytes() -> u64 {
    524_288_000 // 500MB
}

fn default_direct_photo_max_bytes() -> u64 {
    52_428_800 // 50MB
}

fn default_relay_file_field() -> String {
    "file".to_string()
}

fn default_poll_interval_millis() -> u64 {
    2000
}

fn default_reconcile_tick_millis() -> u64 {
    50
}

fn default_completion_delay_millis() -> u64 {
    1000
}

fn default_duration_probe_timeout_seconds() -> u64 {
    10
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

/// Object-storage endpoint used by the direct strategy.
///
/// The upload URL is `{upload_base_url}/{cloudName}/{resourceType}/upload`,
/// with `cloudName` and `resourceType` coming from the signed credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_upload_base_url")]
    pub upload_base_url: String,

    /// Whole-request timeout for one file upload. Default: 600
    #[serde(default = "default_upload_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_base_url: default_storage_upload_base_url(),
            timeout_seconds: default_upload_timeout_seconds(),
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_storage_upload_base_url() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

/// Console logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
