//! Gateway configuration.
//!
//! Loaded from JSON. Every field except the primary API key has a default,
//! so a minimal file is just `{"api_key": "..."}`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::challenges::admission::AdmissionConfig;
use crate::challenges::core::{
    ChallengeConfig, DEFAULT_ACTION, DEFAULT_PROJECT_BASE_URL, DEFAULT_SCRIPT_ENDPOINT,
    DEFAULT_SITE_KEY,
};
use crate::external_deps::browser::LaunchOptions;
use crate::modules::proxy::{ProxyValidationError, validate_proxy_url};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("api_key must not be empty")]
    MissingApiKey,
    #[error("admission.max_concurrent must be at least 1")]
    ZeroConcurrency,
    #[error("browser proxy rejected: {0}")]
    Proxy(#[from] ProxyValidationError),
}

/// Browser proxy settings as stored by the admin layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaSettings {
    pub browser_proxy_enabled: bool,
    pub browser_proxy_url: Option<String>,
}

impl CaptchaSettings {
    /// Check the proxy URL when the proxy is enabled.
    pub fn validate(&self) -> Result<(), ProxyValidationError> {
        if !self.browser_proxy_enabled {
            return Ok(());
        }
        validate_proxy_url(self.browser_proxy_url.as_deref().unwrap_or_default()).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_data_dir: PathBuf,
    pub executable: Option<PathBuf>,
    pub launch_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub execute_timeout_ms: u64,
    pub site_key: String,
    pub action: String,
    pub script_endpoint: String,
    pub project_base_url: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            user_data_dir: PathBuf::from("./browser_data"),
            executable: None,
            launch_timeout_ms: 60_000,
            navigation_timeout_ms: 30_000,
            execute_timeout_ms: 30_000,
            site_key: DEFAULT_SITE_KEY.to_string(),
            action: DEFAULT_ACTION.to_string(),
            script_endpoint: DEFAULT_SCRIPT_ENDPOINT.to_string(),
            project_base_url: DEFAULT_PROJECT_BASE_URL.to_string(),
        }
    }
}

impl BrowserSettings {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions::stealth(&self.user_data_dir)
            .with_headless(self.headless)
            .with_executable(self.executable.clone())
    }

    pub fn challenge_config(&self) -> ChallengeConfig {
        ChallengeConfig {
            site_key: self.site_key.clone(),
            action: self.action.clone(),
            script_endpoint: self.script_endpoint.clone(),
            project_base_url: self.project_base_url.clone(),
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            execute_timeout: Duration::from_millis(self.execute_timeout_ms),
            ..ChallengeConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionSettings {
    pub max_concurrent: usize,
    pub min_interval_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_interval_ms: 1_000,
            jitter_min_ms: 100,
            jitter_max_ms: 500,
        }
    }
}

impl AdmissionSettings {
    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            max_concurrent: self.max_concurrent,
            min_interval: Duration::from_millis(self.min_interval_ms),
            jitter_min: Duration::from_millis(self.jitter_min_ms),
            jitter_max: Duration::from_millis(self.jitter_max_ms),
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub api_key: String,
    #[serde(default)]
    pub premium_api_key: Option<String>,
    #[serde(default)]
    pub captcha: CaptchaSettings,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub admission: AdmissionSettings,
}

impl GatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            premium_api_key: None,
            captcha: CaptchaSettings::default(),
            browser: BrowserSettings::default(),
            admission: AdmissionSettings::default(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.admission.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        self.captcha.validate()?;
        Ok(())
    }
}
