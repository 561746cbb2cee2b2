//! Process-wide admission control for challenge attempts.
//!
//! One gate exists per process, built on first use by
//! [`AdmissionGate::global_or_init`]. Every attempt goes through
//! [`AdmissionGate::acquire`]: make sure the profile is alive, take one of
//! `max_concurrent` permits, respect the start spacing, then run the attempt.
//! Permits are released when the call returns or is cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Instant, sleep};

use super::core::{ChallengeToken, ProjectContext, RateLimiterState};
use super::session::{ChallengeSession, SessionError, SessionState};
use crate::modules::events::{AdmissionEvent, EventDispatcher, GatewayEvent};

pub(crate) type GateCell = OnceCell<Arc<AdmissionGate>>;

pub(crate) static GLOBAL_GATE: GateCell = OnceCell::new();

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("admission gate is shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    pub max_concurrent: usize,
    pub min_interval: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            min_interval: Duration::from_secs(1),
            jitter_min: Duration::from_millis(100),
            jitter_max: Duration::from_millis(500),
        }
    }
}

/// Anything that can hand out challenge tokens for a project.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token_for(
        &self,
        project: &ProjectContext,
    ) -> Result<Option<ChallengeToken>, AdmissionError>;
}

pub struct AdmissionGate {
    session: ChallengeSession,
    slots: Semaphore,
    spacing: Mutex<RateLimiterState>,
    in_flight: AtomicUsize,
    max_concurrent: usize,
    events: Option<Arc<EventDispatcher>>,
}

impl AdmissionGate {
    pub(crate) fn new(session: ChallengeSession, config: AdmissionConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        let spacing = RateLimiterState::new(config.min_interval)
            .with_jitter(config.jitter_min, config.jitter_max);
        Self {
            session,
            slots: Semaphore::new(max_concurrent),
            spacing: Mutex::new(spacing),
            in_flight: AtomicUsize::new(0),
            max_concurrent,
            events: None,
        }
    }

    pub(crate) fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    /// The process-wide gate.
    ///
    /// The first caller builds it from `session` and `config`; every later
    /// caller gets the same gate and its arguments are ignored. A failed
    /// build leaves the slot empty for the next caller.
    pub fn global_or_init<F>(
        session: F,
        config: AdmissionConfig,
        events: Option<Arc<EventDispatcher>>,
    ) -> Result<Arc<AdmissionGate>, AdmissionError>
    where
        F: FnOnce() -> Result<ChallengeSession, SessionError>,
    {
        Self::get_or_init_in(&GLOBAL_GATE, session, config, events)
    }

    pub(crate) fn get_or_init_in<F>(
        cell: &GateCell,
        session: F,
        config: AdmissionConfig,
        events: Option<Arc<EventDispatcher>>,
    ) -> Result<Arc<AdmissionGate>, AdmissionError>
    where
        F: FnOnce() -> Result<ChallengeSession, SessionError>,
    {
        let mut built = false;
        let gate = cell.get_or_try_init(|| -> Result<_, AdmissionError> {
            built = true;
            let mut gate = AdmissionGate::new(session()?, config);
            gate.events = events;
            Ok(Arc::new(gate))
        })?;
        if built {
            log::info!(
                "admission gate created (max_concurrent={})",
                gate.max_concurrent
            );
        } else {
            log::debug!("reusing the existing admission gate");
        }
        Ok(Arc::clone(gate))
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Mint one token for `project`.
    ///
    /// `Err` only when the profile cannot be brought up (or the gate is shut
    /// down); a failed attempt is `Ok(None)`.
    pub async fn acquire(
        &self,
        project: &ProjectContext,
    ) -> Result<Option<ChallengeToken>, AdmissionError> {
        let profile = self.session.ensure_ready().await?;

        let _permit = self.slots.acquire().await.map_err(|_| AdmissionError::Closed)?;
        let _in_flight = InFlight::enter(&self.in_flight);

        let spacing_wait = self.space_start().await;
        if let Some(events) = &self.events {
            events.dispatch(GatewayEvent::Admission(AdmissionEvent {
                project_id: project.project_id().to_string(),
                spacing_wait,
                in_flight: self.in_flight(),
                timestamp: Utc::now(),
            }));
        }

        Ok(self.session.acquire_token(&profile, project).await)
    }

    async fn space_start(&self) -> Duration {
        let mut spacing = self.spacing.lock().await;
        let wait = spacing
            .wait_before_start(Instant::now())
            .unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            log::debug!("spacing challenge start by {}ms", wait.as_millis());
            sleep(wait).await;
        }
        spacing.record_start(Instant::now());
        wait
    }

    /// Stop admitting attempts and close the browser profile.
    pub async fn shutdown(&self) {
        self.slots.close();
        self.session.shutdown().await;
    }
}

#[async_trait]
impl TokenSource for AdmissionGate {
    async fn token_for(
        &self,
        project: &ProjectContext,
    ) -> Result<Option<ChallengeToken>, AdmissionError> {
        self.acquire(project).await
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::ChallengeConfig;
    use crate::challenges::testing::{FakeEngine, ScriptBehavior};
    use crate::external_deps::browser::LaunchOptions;
    use crate::modules::metrics::MetricsCollector;

    fn gate(engine: &Arc<FakeEngine>, config: AdmissionConfig) -> Arc<AdmissionGate> {
        let session = ChallengeSession::new(
            engine.clone(),
            LaunchOptions::stealth("./browser_data"),
            ChallengeConfig::default(),
        )
        .unwrap();
        Arc::new(AdmissionGate::new(session, config))
    }

    async fn run_concurrently(gate: &Arc<AdmissionGate>, count: usize) -> Vec<Option<ChallengeToken>> {
        let handles: Vec<_> = (0..count)
            .map(|i| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.acquire(&ProjectContext::new(format!("p{i}"))).await })
            })
            .collect();
        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }
        tokens
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_two_attempts_in_flight() {
        let mut behavior = ScriptBehavior::ready_with_token("tok");
        behavior.execute_delay = Duration::from_secs(3);
        let engine = Arc::new(FakeEngine::new(behavior));
        let gate = gate(&engine, AdmissionConfig::default());

        let tokens = run_concurrently(&gate, 5).await;

        assert!(tokens.iter().all(Option::is_some));
        assert_eq!(engine.max_open_pages.load(Ordering::SeqCst), 2);
        assert_eq!(engine.pages_opened.load(Ordering::SeqCst), 5);
        assert_eq!(engine.launches.load(Ordering::SeqCst), 1);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn starts_are_spaced_by_min_interval() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("tok")));
        let gate = gate(
            &engine,
            AdmissionConfig {
                max_concurrent: 4,
                ..AdmissionConfig::default()
            },
        );

        run_concurrently(&gate, 4).await;

        let mut starts = engine.page_starts();
        starts.sort();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap > Duration::from_secs(1), "gap {gap:?} below interval");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_profile_is_relaunched_before_attempt() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("tok")));
        let gate = gate(&engine, AdmissionConfig::default());

        assert!(gate.acquire(&ProjectContext::new("p")).await.unwrap().is_some());
        engine.kill_current_profile();

        let token = gate.acquire(&ProjectContext::new("p")).await.unwrap();
        assert!(token.is_some());
        assert_eq!(engine.launches.load(Ordering::SeqCst), 2);
        assert_eq!(gate.session_state(), SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_first_callers_share_one_launch() {
        let engine = Arc::new(
            FakeEngine::new(ScriptBehavior::ready_with_token("tok"))
                .with_launch_delay(Duration::from_secs(2)),
        );
        let gate = gate(&engine, AdmissionConfig::default());

        let tokens = run_concurrently(&gate, 3).await;
        assert!(tokens.iter().all(Option::is_some));
        assert_eq!(engine.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unsolved_challenge_is_none_not_error() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::never_ready()));
        let gate = gate(&engine, AdmissionConfig::default());

        let result = gate.acquire(&ProjectContext::new("p")).await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(engine.executes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn init_failure_reaches_only_that_caller() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("tok")));
        engine.fail_launches.store(1, Ordering::SeqCst);
        let gate = gate(&engine, AdmissionConfig::default());

        assert!(matches!(
            gate.acquire(&ProjectContext::new("p")).await,
            Err(AdmissionError::Session(SessionError::Initialization(_)))
        ));
        assert!(gate.acquire(&ProjectContext::new("p")).await.unwrap().is_some());
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rejects_new_attempts() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("tok")));
        let gate = gate(&engine, AdmissionConfig::default());
        gate.acquire(&ProjectContext::new("p")).await.unwrap();

        gate.shutdown().await;
        assert!(gate.acquire(&ProjectContext::new("p")).await.is_err());
        assert_eq!(engine.profiles_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn admissions_feed_metrics() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("tok")));
        let metrics = MetricsCollector::new();
        let events = Arc::new(EventDispatcher::with_defaults(Some(metrics.clone())));
        let session = ChallengeSession::new(
            engine.clone(),
            LaunchOptions::stealth("./browser_data"),
            ChallengeConfig::default(),
        )
        .unwrap()
        .with_events(events.clone());
        let gate = AdmissionGate::new(session, AdmissionConfig::default()).with_events(events);

        gate.acquire(&ProjectContext::new("a")).await.unwrap();
        gate.acquire(&ProjectContext::new("b")).await.unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.admissions, 2);
        assert_eq!(snapshot.challenges.successes, 2);
        assert_eq!(snapshot.sessions.initializations, 1);
    }

    fn session(engine: &Arc<FakeEngine>) -> Result<ChallengeSession, SessionError> {
        ChallengeSession::new(
            engine.clone(),
            LaunchOptions::stealth("./browser_data"),
            ChallengeConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn first_initializer_wins() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("tok")));
        let cell = GateCell::new();

        let first =
            AdmissionGate::get_or_init_in(&cell, || session(&engine), AdmissionConfig::default(), None)
                .unwrap();
        let second = AdmissionGate::get_or_init_in(
            &cell,
            || -> Result<ChallengeSession, SessionError> { panic!("gate built twice") },
            AdmissionConfig {
                max_concurrent: 8,
                ..AdmissionConfig::default()
            },
            None,
        )
        .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.max_concurrent(), 2);
        first.acquire(&ProjectContext::new("a")).await.unwrap();
        second.acquire(&ProjectContext::new("b")).await.unwrap();
        assert_eq!(engine.launches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_build_leaves_the_slot_empty() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("tok")));
        let cell = GateCell::new();

        let failed = AdmissionGate::get_or_init_in(
            &cell,
            || Err(SessionError::Closed),
            AdmissionConfig::default(),
            None,
        );
        assert!(matches!(failed, Err(AdmissionError::Session(SessionError::Closed))));
        assert!(cell.get().is_none());

        assert!(
            AdmissionGate::get_or_init_in(&cell, || session(&engine), AdmissionConfig::default(), None)
                .is_ok()
        );
        assert!(cell.get().is_some());
    }
}
