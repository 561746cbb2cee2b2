//! Event system for the gateway.
//!
//! Selection, admission and challenge activity is published as
//! [`GatewayEvent`]s so logging and metrics stay out of the control flow.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::metrics::MetricsCollector;
use crate::dispatch::{AccessScope, DropReason};

/// Outcome of one dispatcher run.
#[derive(Debug, Clone)]
pub struct SelectionEvent {
    pub scope: AccessScope,
    pub require_image: bool,
    pub require_video: bool,
    pub model: Option<String>,
    pub considered: usize,
    pub dropped: Vec<(String, DropReason)>,
    pub selected: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Emitted once an attempt holds an admission slot and passed spacing.
#[derive(Debug, Clone)]
pub struct AdmissionEvent {
    pub project_id: String,
    pub spacing_wait: Duration,
    pub in_flight: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChallengeEvent {
    pub project_id: String,
    pub success: bool,
    /// Short failure label (`execution_timeout`, `empty_token`, …).
    pub failure: Option<String>,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    Initialized,
    InitializationFailed(String),
    CrashDetected(String),
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Selection(SelectionEvent),
    Admission(AdmissionEvent),
    Challenge(ChallengeEvent),
    Session(SessionEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &GatewayEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Dispatcher with a [`LoggingHandler`] and, if given, a
    /// [`MetricsHandler`] feeding `metrics`.
    pub fn with_defaults(metrics: Option<MetricsCollector>) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register_handler(Arc::new(LoggingHandler));
        if let Some(metrics) = metrics {
            dispatcher.register_handler(Arc::new(MetricsHandler::new(metrics)));
        }
        dispatcher
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: GatewayEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::Selection(selection) => {
                for (account, reason) in &selection.dropped {
                    log::debug!("dispatch skipped account {account}: {reason}");
                }
                match &selection.selected {
                    Some(account) => log::info!(
                        "dispatch selected account {account} from {} eligible (scope={:?}, image={}, video={}, model={})",
                        selection.considered.saturating_sub(selection.dropped.len()),
                        selection.scope,
                        selection.require_image,
                        selection.require_video,
                        selection.model.as_deref().unwrap_or("-")
                    ),
                    None => log::info!(
                        "dispatch found no eligible account among {} (scope={:?}, image={}, video={})",
                        selection.considered,
                        selection.scope,
                        selection.require_image,
                        selection.require_video
                    ),
                }
            }
            GatewayEvent::Admission(admission) => {
                log::debug!(
                    "challenge slot granted for project {} after {:.2}s spacing ({} in flight)",
                    admission.project_id,
                    admission.spacing_wait.as_secs_f64(),
                    admission.in_flight
                );
            }
            GatewayEvent::Challenge(challenge) => {
                if challenge.success {
                    log::info!(
                        "challenge token acquired for project {} in {}ms",
                        challenge.project_id,
                        challenge.latency.as_millis()
                    );
                } else {
                    log::error!(
                        "challenge token acquisition failed for project {}: {}",
                        challenge.project_id,
                        challenge.failure.as_deref().unwrap_or("unknown")
                    );
                }
            }
            GatewayEvent::Session(session) => match &session.kind {
                SessionEventKind::Initialized => log::info!("browser profile ready"),
                SessionEventKind::InitializationFailed(reason) => {
                    log::error!("browser profile failed to start: {reason}")
                }
                SessionEventKind::CrashDetected(reason) => {
                    log::warn!("browser profile unresponsive, restarting: {reason}")
                }
                SessionEventKind::Closed => log::info!("browser profile closed"),
            },
        }
    }
}

/// Metrics handler that feeds the metrics collector.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &GatewayEvent) {
        match event {
            GatewayEvent::Selection(selection) => {
                let reasons: Vec<DropReason> =
                    selection.dropped.iter().map(|(_, reason)| *reason).collect();
                self.metrics
                    .record_selection(selection.selected.is_some(), &reasons);
            }
            GatewayEvent::Admission(admission) => {
                self.metrics.record_admission(admission.spacing_wait);
            }
            GatewayEvent::Challenge(challenge) => {
                self.metrics.record_attempt(
                    challenge.success,
                    challenge.failure.as_deref(),
                    challenge.latency,
                );
            }
            GatewayEvent::Session(session) => {
                self.metrics.record_session(&session.kind);
            }
        }
    }
}
