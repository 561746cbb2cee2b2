//! Chromium binding built on `chromiumoxide`.
//!
//! Proxy credentials cannot be passed through `--proxy-server`, so pages that
//! run behind an authenticated HTTP(S) proxy answer `Fetch.authRequired`
//! themselves.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams,
    ContinueWithAuthParams, EnableParams, EventAuthRequired, EventRequestPaused,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use url::Url;

use super::{
    BrowserEngine, BrowserError, BrowserPage, BrowserProfile, BrowserResult, LaunchOptions,
    ProbeOutcome,
};
use crate::modules::proxy::ProxyCredentials;

/// Switches chromiumoxide would normally add, minus anything the caller asks
/// to ignore (`--enable-automation` in practice).
const BASELINE_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--enable-features=NetworkService,NetworkServiceInProcess",
    "--disable-client-side-phishing-detection",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-hang-monitor",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-sync",
    "--enable-automation",
    "--metrics-recording-only",
    "--no-first-run",
    "--password-store=basic",
    "--use-mock-keychain",
];

/// [`BrowserEngine`] that launches a local Chrome/Chromium.
#[derive(Debug, Default, Clone)]
pub struct ChromiumEngine;

impl ChromiumEngine {
    pub fn new() -> Self {
        Self
    }

    /// Command line passed to the browser: the baseline switches minus the
    /// ignored ones, then the caller's own arguments.
    fn launch_args(options: &LaunchOptions) -> Vec<String> {
        let mut args: Vec<String> = BASELINE_ARGS
            .iter()
            .filter(|arg| !options.ignore_default_args.iter().any(|ignored| ignored == *arg))
            .map(|arg| arg.to_string())
            .collect();
        args.extend(options.effective_args());
        args
    }

    fn build_config(options: &LaunchOptions) -> BrowserResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&options.user_data_dir)
            .disable_default_args()
            .args(Self::launch_args(options));
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(BrowserError::Launch)
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn launch(&self, options: &LaunchOptions) -> BrowserResult<Arc<dyn BrowserProfile>> {
        let config = Self::build_config(options)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    log::debug!("chromium handler event error: {err}");
                }
            }
            log::debug!("chromium handler stream finished");
        });

        Ok(Arc::new(ChromiumProfile {
            browser: RwLock::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            proxy_credentials: options
                .proxy
                .as_ref()
                .and_then(|proxy| proxy.credentials.clone()),
        }))
    }
}

struct ChromiumProfile {
    browser: RwLock<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    proxy_credentials: Option<ProxyCredentials>,
}

#[async_trait]
impl BrowserProfile for ChromiumProfile {
    async fn new_page(&self) -> BrowserResult<Arc<dyn BrowserPage>> {
        let guard = self.browser.read().await;
        let browser = guard.as_ref().ok_or(BrowserError::Disconnected)?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| BrowserError::from_message(err.to_string()))?;

        let auth_tasks = match &self.proxy_credentials {
            Some(credentials) => answer_proxy_auth(&page, credentials).await?,
            None => Vec::new(),
        };

        Ok(Arc::new(ChromiumPage { page, auth_tasks }))
    }

    async fn probe(&self) -> ProbeOutcome {
        let guard = self.browser.read().await;
        let Some(browser) = guard.as_ref() else {
            return ProbeOutcome::Dead("browser handle released".into());
        };
        match browser.pages().await {
            Ok(_) => ProbeOutcome::Alive,
            Err(err) => ProbeOutcome::Dead(err.to_string()),
        }
    }

    async fn close(&self) -> BrowserResult<()> {
        let browser = self.browser.write().await.take();
        let mut result = Ok(());

        if let Some(mut browser) = browser {
            if let Err(err) = browser.close().await {
                result = Err(BrowserError::from_message(err.to_string()));
            }
            if let Err(err) = browser.wait().await {
                log::debug!("waiting for chromium process failed: {err}");
            }
        }

        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }

        result
    }
}

struct ChromiumPage {
    page: Page,
    auth_tasks: Vec<JoinHandle<()>>,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn add_init_script(&self, source: &str) -> BrowserResult<()> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .map(|_| ())
            .map_err(|err| BrowserError::from_message(err.to_string()))
    }

    async fn goto(&self, url: &Url) -> BrowserResult<()> {
        self.page
            .goto(url.as_str())
            .await
            .map(|_| ())
            .map_err(|err| BrowserError::Navigation(err.to_string()))
    }

    async fn evaluate(&self, expression: &str) -> BrowserResult<Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(BrowserError::Evaluation)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|err| BrowserError::Evaluation(err.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn close(&self) -> BrowserResult<()> {
        for task in &self.auth_tasks {
            task.abort();
        }
        self.page
            .clone()
            .close()
            .await
            .map_err(|err| BrowserError::from_message(err.to_string()))
    }
}

async fn answer_proxy_auth(
    page: &Page,
    credentials: &ProxyCredentials,
) -> BrowserResult<Vec<JoinHandle<()>>> {
    let protocol = |err: chromiumoxide::error::CdpError| BrowserError::from_message(err.to_string());

    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(protocol)?;
    let mut auth_required = page
        .event_listener::<EventAuthRequired>()
        .await
        .map_err(protocol)?;

    page.execute(EnableParams {
        patterns: None,
        handle_auth_requests: Some(true),
    })
    .await
    .map_err(protocol)?;

    let paused_page = page.clone();
    let paused_task = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let params = ContinueRequestParams::new(event.request_id.clone());
            if let Err(err) = paused_page.execute(params).await {
                log::debug!("continuing paused request failed: {err}");
            }
        }
    });

    let auth_page = page.clone();
    let username = credentials.username.clone();
    let password = credentials.password.clone();
    let auth_task = tokio::spawn(async move {
        while let Some(event) = auth_required.next().await {
            let response = AuthChallengeResponse {
                response: AuthChallengeResponseResponse::ProvideCredentials,
                username: Some(username.clone()),
                password: Some(password.clone()),
            };
            let params = ContinueWithAuthParams::new(event.request_id.clone(), response);
            if let Err(err) = auth_page.execute(params).await {
                log::warn!("answering proxy auth challenge failed: {err}");
            }
        }
    });

    Ok(vec![paused_task, auth_task])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stealth_launch_drops_the_automation_switch() {
        let args = ChromiumEngine::launch_args(&LaunchOptions::stealth("./browser_data"));
        assert!(!args.iter().any(|arg| arg == "--enable-automation"));
        assert!(args.iter().any(|arg| arg == "--no-first-run"));
        assert!(args.iter().any(|arg| arg == "--lang=en-US"));
    }

    #[test]
    fn plain_launch_keeps_baseline_switches() {
        let mut options = LaunchOptions::stealth("./browser_data");
        options.ignore_default_args.clear();
        let args = ChromiumEngine::launch_args(&options);
        assert!(args.iter().any(|arg| arg == "--enable-automation"));
        assert_eq!(&args[..BASELINE_ARGS.len()], BASELINE_ARGS);
    }
}
