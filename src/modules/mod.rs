//! Cross-cutting services module
//!
//! Proxy parsing, fingerprint noise, gateway events and metrics.

pub mod events;
pub mod metrics;
pub mod proxy;
pub mod spoofing;

// Re-export commonly used types
pub use events::{
    AdmissionEvent, ChallengeEvent, EventDispatcher, EventHandler, GatewayEvent, LoggingHandler,
    MetricsHandler, SelectionEvent, SessionEvent, SessionEventKind,
};
pub use metrics::{ChallengeStats, DispatchStats, MetricsCollector, MetricsSnapshot, SessionStats};
pub use proxy::{
    ProxyConfig, ProxyCredentials, ProxyScheme, ProxyValidationError, parse_proxy_url,
    validate_proxy_url,
};
pub use spoofing::{FingerprintGenerator, FingerprintNoise};
