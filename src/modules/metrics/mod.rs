//! Metrics collection utilities.
//!
//! Aggregates challenge attempt outcomes with latency percentiles, browser
//! session restarts and dispatcher results for observability.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::events::SessionEventKind;
use crate::dispatch::DropReason;

/// Challenge attempt statistics.
#[derive(Debug, Clone, Default)]
pub struct ChallengeStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub failure_reasons: HashMap<String, u64>,
    pub average_latency: Option<Duration>,
    pub p95_latency: Option<Duration>,
}

/// Browser profile lifecycle statistics.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub initializations: u64,
    pub initialization_failures: u64,
    pub crash_restarts: u64,
    pub closes: u64,
}

/// Dispatcher statistics.
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    pub selections: u64,
    pub exhausted: u64,
    pub drops: HashMap<DropReason, u64>,
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub challenges: ChallengeStats,
    pub sessions: SessionStats,
    pub dispatch: DispatchStats,
    pub admissions: u64,
    pub total_spacing_wait: Duration,
}

#[derive(Debug)]
struct MetricsState {
    started_at: DateTime<Utc>,
    challenges: ChallengeStats,
    latencies: VecDeque<Duration>,
    max_window: usize,
    sessions: SessionStats,
    dispatch: DispatchStats,
    admissions: u64,
    total_spacing_wait: Duration,
}

impl MetricsState {
    fn new(max_window: usize) -> Self {
        Self {
            started_at: Utc::now(),
            challenges: ChallengeStats::default(),
            latencies: VecDeque::with_capacity(max_window),
            max_window,
            sessions: SessionStats::default(),
            dispatch: DispatchStats::default(),
            admissions: 0,
            total_spacing_wait: Duration::ZERO,
        }
    }

    fn push_latency(&mut self, latency: Duration) {
        if self.latencies.len() == self.max_window {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);

        let mut samples: Vec<_> = self.latencies.iter().cloned().collect();
        samples.sort_unstable();
        let avg = samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / samples.len() as f64;
        let p95_index = ((samples.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
        self.challenges.average_latency = Some(Duration::from_secs_f64(avg));
        self.challenges.p95_latency = Some(samples[p95_index]);
    }
}

/// Thread-safe metrics collector shared by the gateway components.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(128))),
        }
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(window.max(16)))),
        }
    }

    pub fn record_attempt(&self, success: bool, failure: Option<&str>, latency: Duration) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        guard.challenges.attempts += 1;
        if success {
            guard.challenges.successes += 1;
            guard.push_latency(latency);
        } else {
            guard.challenges.failures += 1;
            let label = failure.unwrap_or("unknown").to_string();
            *guard.challenges.failure_reasons.entry(label).or_default() += 1;
        }
    }

    pub fn record_session(&self, kind: &SessionEventKind) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        match kind {
            SessionEventKind::Initialized => guard.sessions.initializations += 1,
            SessionEventKind::InitializationFailed(_) => {
                guard.sessions.initialization_failures += 1
            }
            SessionEventKind::CrashDetected(_) => guard.sessions.crash_restarts += 1,
            SessionEventKind::Closed => guard.sessions.closes += 1,
        }
    }

    pub fn record_selection(&self, selected: bool, drops: &[DropReason]) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        if selected {
            guard.dispatch.selections += 1;
        } else {
            guard.dispatch.exhausted += 1;
        }
        for reason in drops {
            *guard.dispatch.drops.entry(*reason).or_default() += 1;
        }
    }

    pub fn record_admission(&self, spacing_wait: Duration) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        guard.admissions += 1;
        guard.total_spacing_wait += spacing_wait;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.inner.lock().expect("metrics lock poisoned");
        MetricsSnapshot {
            started_at: guard.started_at,
            challenges: guard.challenges.clone(),
            sessions: guard.sessions.clone(),
            dispatch: guard.dispatch.clone(),
            admissions: guard.admissions,
            total_spacing_wait: guard.total_spacing_wait,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
