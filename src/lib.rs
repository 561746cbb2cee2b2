//! # flowgate-rs
//!
//! A gateway core for a pool of third-party generation accounts whose
//! service requires a reCAPTCHA v3 proof before each privileged call.
//!
//! The crate covers two things: choosing which pooled account serves a
//! request, and minting challenge tokens from a single persistent browser
//! profile under bounded concurrency, start spacing and crash recovery.
//!
//! ## Features
//!
//! - API key classification into unrestricted and premium-only scopes
//! - Random account selection under capability, tier and slot constraints
//! - Proxy URL validation for the automation browser
//! - Process-wide admission gate with liveness probing and relaunch
//! - Fingerprint evasion patches injected before any page script runs
//! - Chromium binding behind the `chromium` feature
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "chromium")]
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use flowgate_rs::{
//!     Account, Gateway, GatewayConfig, MemoryAccountPool, ProjectContext, RouteRequest,
//! };
//!
//! let config = GatewayConfig::from_path("gateway.json")?;
//! let pool = Arc::new(MemoryAccountPool::from_accounts([
//!     Account::new(1, "someone@example.com").with_access_token("ya29...", None),
//! ]));
//! let gateway = Gateway::builder(config, pool).with_chromium().build()?;
//!
//! let routed = gateway
//!     .route_bearer(
//!         "Bearer han1234",
//!         RouteRequest::image().with_project(ProjectContext::new("my-project")),
//!     )
//!     .await?;
//! println!("account {} token {:?}", routed.account.email, routed.token);
//! # Ok(())
//! # }
//! ```

mod gateway;

pub mod challenges;
pub mod config;
pub mod dispatch;
pub mod external_deps;
pub mod modules;

pub use crate::gateway::{
    Gateway,
    GatewayBuilder,
    GatewayError,
    GatewayResult,
    RouteRequest,
    RoutedRequest,
};

pub use crate::challenges::{
    AdmissionConfig,
    AdmissionError,
    AdmissionGate,
    AttemptFailure,
    CaptchaConfigSource,
    ChallengeSession,
    SessionError,
    SessionState,
    TokenSource,
};

pub use crate::challenges::core::{
    ChallengeConfig,
    ChallengeToken,
    ProjectContext,
    RateLimiterState,
};

pub use crate::challenges::scripts::{ChallengeProtocol, EvasionPatch};

pub use crate::config::{
    AdmissionSettings,
    BrowserSettings,
    CaptchaSettings,
    ConfigError,
    GatewayConfig,
};

pub use crate::dispatch::{
    AccessScope,
    Account,
    AccountDispatcher,
    AccountPool,
    ApiKeyClassifier,
    AuthError,
    ConcurrencyLedger,
    DropReason,
    GenerationKind,
    MemoryAccountPool,
    MemoryConcurrencyLedger,
    Selection,
    SelectionReport,
    SelectionRequest,
    SlotGuard,
};

pub use crate::external_deps::{
    BrowserEngine,
    BrowserError,
    BrowserPage,
    BrowserProfile,
    BrowserResult,
    LaunchOptions,
    ProbeOutcome,
};

#[cfg(feature = "chromium")]
pub use crate::external_deps::ChromiumEngine;

pub use crate::modules::{
    EventDispatcher,
    EventHandler,
    FingerprintGenerator,
    GatewayEvent,
    LoggingHandler,
    MetricsCollector,
    MetricsHandler,
    MetricsSnapshot,
    ProxyConfig,
    ProxyValidationError,
    parse_proxy_url,
    validate_proxy_url,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
