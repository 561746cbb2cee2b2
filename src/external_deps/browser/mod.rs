//! Browser automation binding.
//!
//! The challenge session talks to the browser only through these traits, so
//! the DevTools client can be swapped (or faked in tests) without touching
//! the acquisition flow.

#[cfg(feature = "chromium")]
mod chromium;

#[cfg(feature = "chromium")]
pub use chromium::ChromiumEngine;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::modules::proxy::ProxyConfig;

/// Chromium switches applied to every launch. `--enable-automation` is
/// removed separately through [`LaunchOptions::ignore_default_args`].
pub const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-infobars",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-features=IsolateOrigins,site-per-process,TranslateUI",
    "--disable-web-security",
];

/// Result alias for browser operations.
pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("browser connection already closed")]
    Disconnected,
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error("devtools protocol error: {0}")]
    Protocol(String),
    #[error("browser operation timed out after {0:?}")]
    Timeout(Duration),
}

impl BrowserError {
    /// Classify a driver error message, folding "connection closed" style
    /// failures into [`BrowserError::Disconnected`].
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("connection closed")
            || lowered.contains("channel closed")
            || lowered.contains("disconnected")
        {
            BrowserError::Disconnected
        } else {
            BrowserError::Protocol(message)
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, BrowserError::Disconnected)
    }
}

/// Run a browser operation under `limit`, folding the elapsed case into
/// [`BrowserError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, operation: F) -> BrowserResult<T>
where
    F: Future<Output = BrowserResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Timeout(limit)),
    }
}

/// Result of a liveness probe against a running profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Alive,
    Dead(String),
}

impl ProbeOutcome {
    pub fn is_alive(&self) -> bool {
        matches!(self, ProbeOutcome::Alive)
    }
}

/// Everything the engine needs to start a persistent profile.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub user_data_dir: PathBuf,
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
    pub ignore_default_args: Vec<String>,
    pub locale: String,
    pub proxy: Option<ProxyConfig>,
}

impl LaunchOptions {
    /// Headful launch with the evasion argument set and an `en-US` locale.
    pub fn stealth(user_data_dir: impl AsRef<Path>) -> Self {
        let locale = "en-US".to_string();
        let mut args: Vec<String> = STEALTH_ARGS.iter().map(|arg| arg.to_string()).collect();
        args.push(format!("--lang={locale}"));
        Self {
            user_data_dir: user_data_dir.as_ref().to_path_buf(),
            headless: false,
            executable: None,
            args,
            ignore_default_args: vec!["--enable-automation".to_string()],
            locale,
            proxy: None,
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Launch arguments including `--proxy-server` when a proxy is set.
    pub fn effective_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(proxy) = &self.proxy {
            args.push(format!("--proxy-server={}", proxy.server()));
        }
        args
    }
}

/// Starts browser profiles.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Launch a browser bound to the persistent profile in
    /// `options.user_data_dir`.
    async fn launch(&self, options: &LaunchOptions) -> BrowserResult<Arc<dyn BrowserProfile>>;
}

/// A running, persistent browser profile.
#[async_trait]
pub trait BrowserProfile: Send + Sync {
    async fn new_page(&self) -> BrowserResult<Arc<dyn BrowserPage>>;

    /// Cheap liveness check, e.g. enumerating open pages.
    async fn probe(&self) -> ProbeOutcome;

    /// Close the profile and stop the underlying engine process.
    async fn close(&self) -> BrowserResult<()>;
}

/// A single tab owned by one challenge attempt.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Register `source` to run before any page script on every navigation.
    async fn add_init_script(&self, source: &str) -> BrowserResult<()>;

    async fn goto(&self, url: &Url) -> BrowserResult<()>;

    /// Evaluate an expression, awaiting it if it yields a promise, and return
    /// the JSON value (`Null` for `undefined`).
    async fn evaluate(&self, expression: &str) -> BrowserResult<Value>;

    async fn close(&self) -> BrowserResult<()>;
}
