//! Scriptable in-process browser used by the challenge tests.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use url::Url;

use super::scripts::READY_PROBE;
use crate::external_deps::browser::{
    BrowserEngine, BrowserError, BrowserPage, BrowserProfile, BrowserResult, LaunchOptions,
    ProbeOutcome,
};

#[derive(Debug, Clone)]
pub struct ScriptBehavior {
    pub ready: bool,
    pub inject_loads: bool,
    pub token: Option<String>,
    pub execute_error: Option<String>,
    pub execute_delay: Duration,
    pub goto_fails: bool,
    pub close_fails: bool,
}

impl ScriptBehavior {
    pub fn ready_with_token(token: &str) -> Self {
        Self {
            ready: true,
            inject_loads: true,
            token: Some(token.to_string()),
            execute_error: None,
            execute_delay: Duration::ZERO,
            goto_fails: false,
            close_fails: false,
        }
    }

    pub fn rejected(error: &str) -> Self {
        Self {
            token: None,
            execute_error: Some(error.to_string()),
            ..Self::ready_with_token("")
        }
    }

    pub fn never_ready() -> Self {
        Self {
            ready: false,
            inject_loads: false,
            token: None,
            execute_error: Some("grecaptcha missing".to_string()),
            execute_delay: Duration::ZERO,
            goto_fails: false,
            close_fails: false,
        }
    }
}

#[derive(Default)]
pub struct Shared {
    pub launches: AtomicUsize,
    pub fail_launches: AtomicUsize,
    pub profiles_closed: AtomicUsize,
    pub disconnect_on_close: AtomicBool,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub open_pages: AtomicUsize,
    pub max_open_pages: AtomicUsize,
    pub ready_probes: AtomicUsize,
    pub injections: AtomicUsize,
    pub executes: AtomicUsize,
    page_starts: Mutex<Vec<Instant>>,
    calls: Mutex<Vec<String>>,
    init_sources: Mutex<Vec<String>>,
    launched_with: Mutex<Vec<LaunchOptions>>,
    current_alive: Mutex<Option<Arc<AtomicBool>>>,
}

pub struct FakeEngine {
    shared: Arc<Shared>,
    behavior: ScriptBehavior,
    launch_delay: Duration,
}

impl FakeEngine {
    pub fn new(behavior: ScriptBehavior) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            behavior,
            launch_delay: Duration::ZERO,
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn kill_current_profile(&self) {
        if let Some(alive) = self.shared.current_alive.lock().unwrap().as_ref() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    pub fn last_launch(&self) -> Option<LaunchOptions> {
        self.shared.launched_with.lock().unwrap().last().cloned()
    }

    pub fn visited(&self) -> Vec<String> {
        self.shared
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| call.strip_prefix("goto:").map(str::to_string))
            .collect()
    }

    pub fn init_scripts_before_goto(&self) -> bool {
        let calls = self.shared.calls.lock().unwrap();
        let init = calls.iter().position(|call| call == "init_script");
        let goto = calls.iter().position(|call| call.starts_with("goto:"));
        matches!((init, goto), (Some(i), Some(g)) if i < g)
    }

    pub fn init_sources(&self) -> Vec<String> {
        self.shared.init_sources.lock().unwrap().clone()
    }

    pub fn page_starts(&self) -> Vec<Instant> {
        self.shared.page_starts.lock().unwrap().clone()
    }
}

impl Deref for FakeEngine {
    type Target = Shared;

    fn deref(&self) -> &Shared {
        &self.shared
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn launch(&self, options: &LaunchOptions) -> BrowserResult<Arc<dyn BrowserProfile>> {
        sleep(self.launch_delay).await;
        self.shared.launches.fetch_add(1, Ordering::SeqCst);
        self.shared.launched_with.lock().unwrap().push(options.clone());

        let remaining_failures = self.shared.fail_launches.load(Ordering::SeqCst);
        if remaining_failures > 0 {
            self.shared
                .fail_launches
                .store(remaining_failures - 1, Ordering::SeqCst);
            return Err(BrowserError::Launch("chrome not found".into()));
        }

        let alive = Arc::new(AtomicBool::new(true));
        *self.shared.current_alive.lock().unwrap() = Some(alive.clone());
        Ok(Arc::new(FakeProfile {
            shared: self.shared.clone(),
            behavior: self.behavior.clone(),
            alive,
        }))
    }
}

struct FakeProfile {
    shared: Arc<Shared>,
    behavior: ScriptBehavior,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl BrowserProfile for FakeProfile {
    async fn new_page(&self) -> BrowserResult<Arc<dyn BrowserPage>> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(BrowserError::Disconnected);
        }
        self.shared.pages_opened.fetch_add(1, Ordering::SeqCst);
        self.shared.page_starts.lock().unwrap().push(Instant::now());
        let open = self.shared.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_open_pages.fetch_max(open, Ordering::SeqCst);
        Ok(Arc::new(FakePage {
            shared: self.shared.clone(),
            behavior: self.behavior.clone(),
        }))
    }

    async fn probe(&self) -> ProbeOutcome {
        if self.alive.load(Ordering::SeqCst) {
            ProbeOutcome::Alive
        } else {
            ProbeOutcome::Dead("target closed".into())
        }
    }

    async fn close(&self) -> BrowserResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        self.shared.profiles_closed.fetch_add(1, Ordering::SeqCst);
        if self.shared.disconnect_on_close.load(Ordering::SeqCst) {
            return Err(BrowserError::Disconnected);
        }
        Ok(())
    }
}

struct FakePage {
    shared: Arc<Shared>,
    behavior: ScriptBehavior,
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn add_init_script(&self, source: &str) -> BrowserResult<()> {
        self.shared.calls.lock().unwrap().push("init_script".into());
        self.shared.init_sources.lock().unwrap().push(source.to_string());
        Ok(())
    }

    async fn goto(&self, url: &Url) -> BrowserResult<()> {
        self.shared.calls.lock().unwrap().push(format!("goto:{url}"));
        if self.behavior.goto_fails {
            return Err(BrowserError::Navigation("net::ERR_TIMED_OUT".into()));
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> BrowserResult<Value> {
        if expression == READY_PROBE {
            self.shared.ready_probes.fetch_add(1, Ordering::SeqCst);
            return Ok(Value::Bool(self.behavior.ready));
        }
        if expression.contains("createElement('script')") {
            self.shared.injections.fetch_add(1, Ordering::SeqCst);
            return Ok(Value::Bool(self.behavior.inject_loads));
        }
        if expression.contains("grecaptcha.execute(") {
            self.shared.executes.fetch_add(1, Ordering::SeqCst);
            sleep(self.behavior.execute_delay).await;
            return Ok(json!({
                "token": self.behavior.token,
                "error": self.behavior.execute_error,
            }));
        }
        Err(BrowserError::Evaluation(format!("unexpected expression: {expression}")))
    }

    async fn close(&self) -> BrowserResult<()> {
        self.shared.pages_closed.fetch_add(1, Ordering::SeqCst);
        self.shared.open_pages.fetch_sub(1, Ordering::SeqCst);
        if self.behavior.close_fails {
            return Err(BrowserError::Protocol("Target.closeTarget failed".into()));
        }
        Ok(())
    }
}
