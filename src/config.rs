use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::RiskDashError;

/// Defaults embedded in the binary at compile time.
const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Environment variable overriding `api_base_url`.
pub const API_URL_ENV: &str = "RISKDASH_API_URL";

/// Runtime settings for the dashboard core.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub debounce_ms: u64,
    pub poll_interval_secs: u64,
    pub history_limit: usize,
    pub explanation_display_limit: usize,
}

/// User overrides; every key is optional and falls back to the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverrides {
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    debounce_ms: Option<u64>,
    poll_interval_secs: Option<u64>,
    history_limit: Option<usize>,
    explanation_display_limit: Option<usize>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded config/default.toml must be valid TOML")
    }
}

impl DashboardConfig {
    /// Load defaults, then `<config_dir>/riskdash/config.toml` if it exists,
    /// then the environment override.
    pub fn load() -> Result<Self, RiskDashError> {
        let mut config = match Self::user_config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            Some(path) => {
                debug!("No user config at {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                info!("Using API base URL from {}: {}", API_URL_ENV, url);
                config.api_base_url = url.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file layered over the embedded defaults.
    pub fn load_from(path: &Path) -> Result<Self, RiskDashError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RiskDashError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded dashboard config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, RiskDashError> {
        let overrides: ConfigOverrides = toml::from_str(content)
            .map_err(|e| RiskDashError::Config(format!("Invalid config TOML: {}", e)))?;

        let defaults = Self::default();
        let config = Self {
            api_base_url: overrides.api_base_url.unwrap_or(defaults.api_base_url),
            request_timeout_secs: overrides
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            debounce_ms: overrides.debounce_ms.unwrap_or(defaults.debounce_ms),
            poll_interval_secs: overrides
                .poll_interval_secs
                .unwrap_or(defaults.poll_interval_secs),
            history_limit: overrides.history_limit.unwrap_or(defaults.history_limit),
            explanation_display_limit: overrides
                .explanation_display_limit
                .unwrap_or(defaults.explanation_display_limit),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("riskdash").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), RiskDashError> {
        let url = Url::parse(&self.api_base_url).map_err(|e| {
            RiskDashError::Config(format!("api_base_url '{}' is not a URL: {}", self.api_base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RiskDashError::Config(format!(
                "api_base_url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(RiskDashError::Config("request_timeout_secs must be > 0".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(RiskDashError::Config("poll_interval_secs must be > 0".to_string()));
        }
        if self.history_limit == 0 {
            return Err(RiskDashError::Config("history_limit must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
