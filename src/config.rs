//! Client configuration
//!
//! Loaded from a TOML file, then overlaid with `APARAVI_*` environment
//! variables, then validated before a session is built.

use crate::error::{DtcError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://eaas.aparavi.com";

/// Settings for the DTC client and CLI
#[derive(Clone, Serialize, Deserialize)]
pub struct DtcConfig {
    /// API key, sent verbatim in the `Authorization` header
    #[serde(default)]
    pub api_key: String,

    /// Service base URL (default: https://eaas.aparavi.com)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Delay between status checks while waiting for Running
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overall limit for reaching Running, in minutes (fractions allowed)
    #[serde(default = "default_start_timeout_minutes")]
    pub start_timeout_minutes: f64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Custom pipeline definition; the embedded one is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_file: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_start_timeout_minutes() -> f64 {
    10.0
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for DtcConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            start_timeout_minutes: default_start_timeout_minutes(),
            request_timeout_secs: default_request_timeout_secs(),
            pipeline_file: None,
        }
    }
}

impl fmt::Debug for DtcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtcConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("start_timeout_minutes", &self.start_timeout_minutes)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("pipeline_file", &self.pipeline_file)
            .finish()
    }
}

impl DtcConfig {
    /// Config with the given key and all other settings at their defaults
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file. Returns defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            DtcError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: DtcConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Overlay `APARAVI_*` environment variables
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(key) = var("APARAVI_API_KEY") {
            self.api_key = key;
        }
        if let Some(url) = var("APARAVI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(ms) = var("APARAVI_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_var("APARAVI_POLL_INTERVAL_MS", &ms)?;
        }
        if let Some(minutes) = var("APARAVI_START_TIMEOUT_MINUTES") {
            self.start_timeout_minutes = parse_var("APARAVI_START_TIMEOUT_MINUTES", &minutes)?;
        }
        if let Some(secs) = var("APARAVI_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("APARAVI_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(file) = var("APARAVI_PIPELINE_FILE") {
            self.pipeline_file = Some(PathBuf::from(file));
        }
        Ok(self)
    }

    /// Check that the config can drive a session
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(DtcError::Config(
                "api_key is required (set APARAVI_API_KEY or pass --api-key)".to_string(),
            ));
        }

        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            DtcError::Config(format!("invalid base_url '{}': {}", self.base_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(DtcError::Config(format!(
                "base_url must be http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.poll_interval_ms == 0 {
            return Err(DtcError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        if !self.start_timeout_minutes.is_finite() || self.start_timeout_minutes < 0.0 {
            return Err(DtcError::Config(format!(
                "start_timeout_minutes must be a non-negative number, got {}",
                self.start_timeout_minutes
            )));
        }
        Duration::try_from_secs_f64(self.start_timeout_minutes * 60.0).map_err(|e| {
            DtcError::Config(format!(
                "start_timeout_minutes {} is out of range: {}",
                self.start_timeout_minutes, e
            ))
        })?;

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Start timeout as a `Duration`; out-of-range values saturate
    pub fn start_timeout(&self) -> Duration {
        let secs = self.start_timeout_minutes * 60.0;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DtcError::Config(format!("{}='{}': {}", name, value, e)))
}

/// Mask a secret for logs, keeping the last four characters
pub(crate) fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
