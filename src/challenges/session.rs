//! Persistent browser session that mints challenge tokens.
//!
//! One profile is launched per process and reused across attempts so the
//! on-disk identity (cookies, local storage, login state) survives. Each
//! attempt runs in its own page which is always closed afterwards.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use url::Url;

use super::core::{ChallengeConfig, ChallengeToken, ProjectContext};
use super::scripts::{ChallengeProtocol, EvasionPatch, ExecuteOutcome, compose_evasion_script};
use crate::config::CaptchaSettings;
use crate::external_deps::browser::{
    BrowserEngine, BrowserError, BrowserPage, BrowserProfile, LaunchOptions, ProbeOutcome,
    bounded,
};
use crate::modules::events::{
    ChallengeEvent, EventDispatcher, GatewayEvent, SessionEvent, SessionEventKind,
};
use crate::modules::proxy::{ProxyConfig, validate_proxy_url};
use crate::modules::spoofing::FingerprintGenerator;

/// Supplies the current browser proxy settings.
#[async_trait]
pub trait CaptchaConfigSource: Send + Sync {
    async fn captcha_config(&self) -> CaptchaSettings;
}

#[async_trait]
impl CaptchaConfigSource for CaptchaSettings {
    async fn captcha_config(&self) -> CaptchaSettings {
        self.clone()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser profile initialization failed: {0}")]
    Initialization(#[source] BrowserError),
    #[error("challenge session has been shut down")]
    Closed,
    #[error("invalid challenge endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Hard failure of a single attempt. Soft failures are logged and the
/// attempt carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    InvalidProjectUrl(String),
    PageOpen(String),
    InitScript(String),
    Evaluation(String),
    ExecutionTimeout,
    Rejected(String),
    EmptyToken,
}

impl AttemptFailure {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptFailure::InvalidProjectUrl(_) => "invalid_project_url",
            AttemptFailure::PageOpen(_) => "page_open",
            AttemptFailure::InitScript(_) => "init_script",
            AttemptFailure::Evaluation(_) => "evaluation_error",
            AttemptFailure::ExecutionTimeout => "execution_timeout",
            AttemptFailure::Rejected(_) => "execution_rejected",
            AttemptFailure::EmptyToken => "empty_token",
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::InvalidProjectUrl(err) => write!(f, "invalid project url: {err}"),
            AttemptFailure::PageOpen(err) => write!(f, "could not open page: {err}"),
            AttemptFailure::InitScript(err) => write!(f, "could not register evasion patches: {err}"),
            AttemptFailure::Evaluation(err) => write!(f, "execute evaluation failed: {err}"),
            AttemptFailure::ExecutionTimeout => f.write_str("execute did not settle in time"),
            AttemptFailure::Rejected(err) => write!(f, "provider rejected execute: {err}"),
            AttemptFailure::EmptyToken => f.write_str("provider returned an empty token"),
        }
    }
}

/// Owns the browser profile and drives the challenge protocol.
pub struct ChallengeSession {
    engine: Arc<dyn BrowserEngine>,
    captcha: Option<Arc<dyn CaptchaConfigSource>>,
    launch: LaunchOptions,
    launch_timeout: Duration,
    config: ChallengeConfig,
    protocol: ChallengeProtocol,
    fingerprints: FingerprintGenerator,
    patches: Vec<EvasionPatch>,
    /// Held across launch, so it also serialises first construction.
    profile: Mutex<Option<Arc<dyn BrowserProfile>>>,
    state: RwLock<SessionState>,
    events: Option<Arc<EventDispatcher>>,
}

impl ChallengeSession {
    pub fn new(
        engine: Arc<dyn BrowserEngine>,
        launch: LaunchOptions,
        config: ChallengeConfig,
    ) -> Result<Self, SessionError> {
        let protocol = ChallengeProtocol::new(&config)?;
        Ok(Self {
            engine,
            captcha: None,
            launch,
            launch_timeout: Duration::from_secs(60),
            config,
            protocol,
            fingerprints: FingerprintGenerator::with_random_gpu(),
            patches: EvasionPatch::ALL.to_vec(),
            profile: Mutex::new(None),
            state: RwLock::new(SessionState::Uninitialized),
            events: None,
        })
    }

    pub fn with_captcha_source(mut self, source: Arc<dyn CaptchaConfigSource>) -> Self {
        self.captcha = Some(source);
        self
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_fingerprints(mut self, generator: FingerprintGenerator) -> Self {
        self.fingerprints = generator;
        self
    }

    pub fn with_patches(mut self, patches: Vec<EvasionPatch>) -> Self {
        self.patches = patches;
        self
    }

    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().expect("session state lock poisoned")
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write().expect("session state lock poisoned") = state;
    }

    /// Return a live profile, launching one if needed.
    ///
    /// A profile that fails its liveness probe is discarded and relaunched
    /// once. Launch failures are returned to this caller only; the next call
    /// tries again.
    pub(crate) async fn ensure_ready(&self) -> Result<Arc<dyn BrowserProfile>, SessionError> {
        let mut slot = self.profile.lock().await;
        if self.state() == SessionState::Closed {
            return Err(SessionError::Closed);
        }

        if let Some(profile) = slot.as_ref() {
            match self.probe(profile.as_ref()).await {
                ProbeOutcome::Alive => return Ok(Arc::clone(profile)),
                ProbeOutcome::Dead(reason) => {
                    self.emit_session(SessionEventKind::CrashDetected(reason));
                    if let Some(stale) = slot.take() {
                        self.set_state(SessionState::Uninitialized);
                        if let Err(err) = bounded(self.config.step_timeout, stale.close()).await {
                            log::debug!("releasing dead browser profile failed: {err}");
                        }
                    }
                }
            }
        }

        self.initialize(&mut slot).await
    }

    async fn probe(&self, profile: &dyn BrowserProfile) -> ProbeOutcome {
        match tokio::time::timeout(self.config.step_timeout, profile.probe()).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::Dead("liveness probe timed out".into()),
        }
    }

    async fn initialize(
        &self,
        slot: &mut Option<Arc<dyn BrowserProfile>>,
    ) -> Result<Arc<dyn BrowserProfile>, SessionError> {
        self.set_state(SessionState::Initializing);

        let proxy = self.resolve_proxy().await;
        log::info!(
            "launching {} profile at {} (proxy={}, headless={})",
            self.engine.name(),
            self.launch.user_data_dir.display(),
            proxy
                .as_ref()
                .map(|p| format!("{} auth={}", p.server(), p.has_auth()))
                .unwrap_or_else(|| "none".into()),
            self.launch.headless
        );
        let options = self.launch.clone().with_proxy(proxy);

        match bounded(self.launch_timeout, self.engine.launch(&options)).await {
            Ok(profile) => {
                *slot = Some(Arc::clone(&profile));
                self.set_state(SessionState::Ready);
                self.emit_session(SessionEventKind::Initialized);
                Ok(profile)
            }
            Err(err) => {
                self.set_state(SessionState::Uninitialized);
                self.emit_session(SessionEventKind::InitializationFailed(err.to_string()));
                Err(SessionError::Initialization(err))
            }
        }
    }

    /// Proxy for the next launch. An invalid URL is logged and ignored.
    async fn resolve_proxy(&self) -> Option<ProxyConfig> {
        let settings = self.captcha.as_ref()?.captcha_config().await;
        if !settings.browser_proxy_enabled {
            return None;
        }
        let url = settings.browser_proxy_url.as_deref()?;
        match validate_proxy_url(url) {
            Ok(proxy) => proxy,
            Err(err) => {
                log::warn!("ignoring browser proxy {url:?}: {err}");
                None
            }
        }
    }

    /// Run one challenge attempt against `profile`.
    ///
    /// Returns `None` on any hard failure; the reason is logged and
    /// published as a [`ChallengeEvent`].
    pub(crate) async fn acquire_token(
        &self,
        profile: &Arc<dyn BrowserProfile>,
        project: &ProjectContext,
    ) -> Option<ChallengeToken> {
        let started = Instant::now();
        let outcome = self.attempt(profile.as_ref(), project).await;
        let latency = started.elapsed();

        let (token, failure) = match outcome {
            Ok(value) => (Some(ChallengeToken::new(value, latency)), None),
            Err(failure) => {
                log::error!(
                    "challenge attempt for project {project} failed ({}): {failure}",
                    failure.label()
                );
                (None, Some(failure.label().to_string()))
            }
        };

        self.emit(GatewayEvent::Challenge(ChallengeEvent {
            project_id: project.project_id().to_string(),
            success: token.is_some(),
            failure,
            latency,
            timestamp: Utc::now(),
        }));
        token
    }

    async fn attempt(
        &self,
        profile: &dyn BrowserProfile,
        project: &ProjectContext,
    ) -> Result<String, AttemptFailure> {
        let url = project
            .page_url(&self.config.project_base_url)
            .map_err(|err| AttemptFailure::InvalidProjectUrl(err.to_string()))?;

        let page = bounded(self.config.step_timeout, profile.new_page())
            .await
            .map_err(|err| AttemptFailure::PageOpen(err.to_string()))?;
        let guard = PageGuard::new(Arc::clone(&page), self.config.step_timeout);

        let result = self.drive(page.as_ref(), &url).await;
        guard.close().await;
        result
    }

    async fn drive(&self, page: &dyn BrowserPage, url: &Url) -> Result<String, AttemptFailure> {
        let step = self.config.step_timeout;

        let noise = self.fingerprints.generate();
        let patches = compose_evasion_script(&self.patches, &noise);
        bounded(step, page.add_init_script(&patches))
            .await
            .map_err(|err| AttemptFailure::InitScript(err.to_string()))?;

        log::debug!("navigating to {url}");
        if let Err(err) = bounded(self.config.navigation_timeout, page.goto(url)).await {
            log::warn!("navigation to {url} did not complete, continuing: {err}");
        }

        if !self.script_ready(page).await {
            log::debug!("challenge script absent, injecting it");
            match bounded(
                self.config.script_load_timeout + step,
                page.evaluate(&self.protocol.inject_script()),
            )
            .await
            {
                Ok(loaded) if loaded.as_bool() == Some(true) => {}
                Ok(_) => log::warn!("challenge script failed to load, continuing"),
                Err(err) => log::warn!("challenge script injection failed, continuing: {err}"),
            }
        }

        match self.wait_until_ready(page).await {
            Some(waited) => log::debug!(
                "challenge script ready after {:.1}s",
                waited.as_secs_f64()
            ),
            None => log::warn!(
                "challenge script not ready after {} polls, executing anyway",
                self.config.poll_attempts
            ),
        }

        sleep(self.config.settle_delay).await;

        let raw = match tokio::time::timeout(
            self.config.execute_timeout,
            page.evaluate(&self.protocol.execute_script()),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return Err(AttemptFailure::Evaluation(err.to_string())),
            Err(_) => return Err(AttemptFailure::ExecutionTimeout),
        };

        let outcome: ExecuteOutcome = serde_json::from_value(raw)
            .map_err(|err| AttemptFailure::Evaluation(format!("unexpected execute result: {err}")))?;
        match (outcome.token, outcome.error) {
            (Some(token), _) if !token.is_empty() => Ok(token),
            (_, Some(error)) if error.contains("timed out") => Err(AttemptFailure::ExecutionTimeout),
            (_, Some(error)) if error != "empty token" => Err(AttemptFailure::Rejected(error)),
            _ => Err(AttemptFailure::EmptyToken),
        }
    }

    /// Evaluation errors count as "not ready".
    async fn script_ready(&self, page: &dyn BrowserPage) -> bool {
        match bounded(self.config.step_timeout, page.evaluate(self.protocol.ready_probe())).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(err) => {
                log::debug!("readiness probe failed: {err}");
                false
            }
        }
    }

    /// Poll readiness until the attempt budget or deadline runs out.
    async fn wait_until_ready(&self, page: &dyn BrowserPage) -> Option<Duration> {
        let started = Instant::now();
        let deadline = started + self.config.poll_interval * self.config.poll_attempts;
        for _ in 0..self.config.poll_attempts {
            if self.script_ready(page).await {
                return Some(started.elapsed());
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(self.config.poll_interval).await;
        }
        None
    }

    /// Close the profile. Further use fails with [`SessionError::Closed`].
    pub async fn shutdown(&self) {
        let mut slot = self.profile.lock().await;
        if let Some(profile) = slot.take() {
            match bounded(self.config.step_timeout, profile.close()).await {
                Ok(()) => {}
                Err(err) if err.is_disconnected() => {
                    log::debug!("browser already disconnected during shutdown: {err}")
                }
                Err(err) => log::warn!("closing browser profile failed: {err}"),
            }
        }
        self.set_state(SessionState::Closed);
        self.emit_session(SessionEventKind::Closed);
    }

    fn emit_session(&self, kind: SessionEventKind) {
        self.emit(GatewayEvent::Session(SessionEvent {
            kind,
            timestamp: Utc::now(),
        }));
    }

    fn emit(&self, event: GatewayEvent) {
        if let Some(events) = &self.events {
            events.dispatch(event);
        }
    }
}

/// Closes the attempt's page. If the attempt future is dropped before
/// [`PageGuard::close`] runs, the close is spawned instead.
struct PageGuard {
    page: Option<Arc<dyn BrowserPage>>,
    limit: Duration,
}

impl PageGuard {
    fn new(page: Arc<dyn BrowserPage>, limit: Duration) -> Self {
        Self {
            page: Some(page),
            limit,
        }
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            close_page(page, self.limit).await;
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let limit = self.limit;
            handle.spawn(async move { close_page(page, limit).await });
        }
    }
}

async fn close_page(page: Arc<dyn BrowserPage>, limit: Duration) {
    if let Err(err) = bounded(limit, page.close()).await {
        log::debug!("closing challenge page failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::testing::{FakeEngine, ScriptBehavior};
    use crate::modules::metrics::MetricsCollector;
    use std::sync::atomic::Ordering;

    fn session(engine: &Arc<FakeEngine>) -> ChallengeSession {
        ChallengeSession::new(
            engine.clone(),
            LaunchOptions::stealth("./browser_data"),
            ChallengeConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_returns_token_and_closes_page() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("tok-1")));
        let session = session(&engine);
        assert_eq!(session.state(), SessionState::Uninitialized);

        let profile = session.ensure_ready().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        let token = session
            .acquire_token(&profile, &ProjectContext::new("p1"))
            .await
            .unwrap();
        assert_eq!(token.as_str(), "tok-1");
        assert_eq!(engine.pages_opened.load(Ordering::SeqCst), 1);
        assert_eq!(engine.pages_closed.load(Ordering::SeqCst), 1);
        assert!(engine.init_scripts_before_goto());
        assert_eq!(
            engine.visited(),
            vec!["https://labs.google/fx/tools/flow/project/p1".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_failure_is_soft() {
        let mut behavior = ScriptBehavior::ready_with_token("tok-nav");
        behavior.goto_fails = true;
        let engine = Arc::new(FakeEngine::new(behavior));
        let session = session(&engine);
        let profile = session.ensure_ready().await.unwrap();

        let token = session.acquire_token(&profile, &ProjectContext::new("p")).await;
        assert_eq!(token.unwrap().as_str(), "tok-nav");
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_still_executes_and_returns_none() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::never_ready()));
        let session = session(&engine);
        let profile = session.ensure_ready().await.unwrap();

        let token = session.acquire_token(&profile, &ProjectContext::new("p")).await;
        assert!(token.is_none());
        assert_eq!(engine.executes.load(Ordering::SeqCst), 1);
        assert_eq!(engine.injections.load(Ordering::SeqCst), 1);
        // One probe before injection, then the full polling budget.
        assert_eq!(engine.ready_probes.load(Ordering::SeqCst), 21);
        assert_eq!(engine.pages_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_rejection_is_a_hard_failure() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::rejected("invalid site key")));
        let metrics = MetricsCollector::new();
        let session = session(&engine)
            .with_events(Arc::new(EventDispatcher::with_defaults(Some(metrics.clone()))));
        let profile = session.ensure_ready().await.unwrap();

        let token = session.acquire_token(&profile, &ProjectContext::new("p")).await;
        assert!(token.is_none());
        assert_eq!(engine.executes.load(Ordering::SeqCst), 1);
        assert_eq!(engine.pages_closed.load(Ordering::SeqCst), 1);

        let reasons = metrics.snapshot().challenges.failure_reasons;
        assert_eq!(reasons.get("execution_rejected"), Some(&1));
        assert_eq!(reasons.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn webgl_identity_is_stable_across_attempts() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("tok")));
        let session = session(&engine);
        let renderer = session.fingerprints.generate().webgl_renderer;

        for project in ["a", "b", "c"] {
            let profile = session.ensure_ready().await.unwrap();
            session.acquire_token(&profile, &ProjectContext::new(project)).await;
        }

        let sources = engine.init_sources();
        assert_eq!(sources.len(), 3);
        let pinned = serde_json::to_string(&renderer).unwrap();
        assert!(sources.iter().all(|source| source.contains(&pinned)));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_execute_hits_outer_timeout() {
        let mut behavior = ScriptBehavior::ready_with_token("late");
        behavior.execute_delay = Duration::from_secs(120);
        let engine = Arc::new(FakeEngine::new(behavior));
        let session = session(&engine);
        let profile = session.ensure_ready().await.unwrap();

        let started = Instant::now();
        let token = session.acquire_token(&profile, &ProjectContext::new("p")).await;
        assert!(token.is_none());
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(engine.pages_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn page_close_error_does_not_mask_token() {
        let mut behavior = ScriptBehavior::ready_with_token("tok-close");
        behavior.close_fails = true;
        let engine = Arc::new(FakeEngine::new(behavior));
        let session = session(&engine);
        let profile = session.ensure_ready().await.unwrap();

        let token = session.acquire_token(&profile, &ProjectContext::new("p")).await;
        assert_eq!(token.unwrap().as_str(), "tok-close");
        assert_eq!(engine.pages_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_attempt_still_closes_page() {
        let mut behavior = ScriptBehavior::ready_with_token("never");
        behavior.execute_delay = Duration::from_secs(20);
        let engine = Arc::new(FakeEngine::new(behavior));
        let session = Arc::new(session(&engine));
        let profile = session.ensure_ready().await.unwrap();

        let attempt = {
            let session = session.clone();
            let profile = profile.clone();
            tokio::spawn(async move {
                session.acquire_token(&profile, &ProjectContext::new("p")).await
            })
        };
        sleep(Duration::from_secs(5)).await;
        attempt.abort();
        let _ = attempt.await;
        sleep(Duration::from_millis(10)).await;

        assert_eq!(engine.pages_opened.load(Ordering::SeqCst), 1);
        assert_eq!(engine.pages_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_propagates_and_is_retried_later() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("t")));
        engine.fail_launches.store(1, Ordering::SeqCst);
        let session = session(&engine);

        assert!(matches!(
            session.ensure_ready().await,
            Err(SessionError::Initialization(_))
        ));
        assert_eq!(session.state(), SessionState::Uninitialized);

        assert!(session.ensure_ready().await.is_ok());
        assert_eq!(engine.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_probe_relaunches_once() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("t")));
        let session = session(&engine);
        session.ensure_ready().await.unwrap();

        engine.kill_current_profile();
        session.ensure_ready().await.unwrap();
        session.ensure_ready().await.unwrap();

        assert_eq!(engine.launches.load(Ordering::SeqCst), 2);
        assert_eq!(engine.profiles_closed.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_terminal_and_swallows_disconnects() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("t")));
        engine.disconnect_on_close.store(true, Ordering::SeqCst);
        let session = session(&engine);
        session.ensure_ready().await.unwrap();

        session.shutdown().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(session.ensure_ready().await, Err(SessionError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn proxy_comes_from_captcha_settings() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("t")));
        let settings = CaptchaSettings {
            browser_proxy_enabled: true,
            browser_proxy_url: Some("http://u:p@10.0.0.9:3128".into()),
        };
        let session = session(&engine).with_captcha_source(Arc::new(settings));
        session.ensure_ready().await.unwrap();

        let launched = engine.last_launch().unwrap();
        let proxy = launched.proxy.unwrap();
        assert_eq!(proxy.server(), "http://10.0.0.9:3128");
        assert!(proxy.has_auth());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_proxy_launches_without_one() {
        let engine = Arc::new(FakeEngine::new(ScriptBehavior::ready_with_token("t")));
        let settings = CaptchaSettings {
            browser_proxy_enabled: true,
            browser_proxy_url: Some("socks5://u:p@10.0.0.9:1080".into()),
        };
        let session = session(&engine).with_captcha_source(Arc::new(settings));
        session.ensure_ready().await.unwrap();
        assert!(engine.last_launch().unwrap().proxy.is_none());
    }

    #[test]
    fn failure_labels_are_distinct() {
        let labels = [
            AttemptFailure::InvalidProjectUrl(String::new()).label(),
            AttemptFailure::PageOpen(String::new()).label(),
            AttemptFailure::InitScript(String::new()).label(),
            AttemptFailure::Evaluation(String::new()).label(),
            AttemptFailure::ExecutionTimeout.label(),
            AttemptFailure::Rejected(String::new()).label(),
            AttemptFailure::EmptyToken.label(),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
