//! Data structures shared across the challenge acquisition layers.

use std::fmt;
use std::time::Duration;

use url::Url;

/// reCAPTCHA site key used by the Flow project pages.
pub const DEFAULT_SITE_KEY: &str = "6LdsFiUsAAAAAIjVDZcuLhaHiDn5nnHVXVRQGeMV";
/// Action label attached to generation tokens.
pub const DEFAULT_ACTION: &str = "FLOW_GENERATION";
/// Script endpoint; the site key is appended as the `render` parameter.
pub const DEFAULT_SCRIPT_ENDPOINT: &str = "https://www.google.com/recaptcha/api.js";
/// Project pages live under this prefix, followed by the project id.
pub const DEFAULT_PROJECT_BASE_URL: &str = "https://labs.google/fx/tools/flow/project/";

/// Identifies the Flow project a token is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectContext {
    project_id: String,
}

impl ProjectContext {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Resolve the project page under `base`. The id is pushed as a single,
    /// percent-encoded path segment.
    pub fn page_url(&self, base: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(base)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(&self.project_id);
        Ok(url)
    }
}

impl fmt::Display for ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.project_id)
    }
}

/// Short-lived verification token minted by the challenge provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ChallengeToken {
    value: String,
    latency: Duration,
}

impl ChallengeToken {
    pub fn new(value: impl Into<String>, latency: Duration) -> Self {
        Self {
            value: value.into(),
            latency,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Wall time spent acquiring the token, page open to extraction.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

impl fmt::Debug for ChallengeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.value.chars().take(8).collect();
        f.debug_struct("ChallengeToken")
            .field("value", &format_args!("{prefix}…"))
            .field("latency", &self.latency)
            .finish()
    }
}

/// Knobs for a single challenge attempt.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    pub site_key: String,
    pub action: String,
    pub script_endpoint: String,
    pub project_base_url: String,
    /// Bound for page navigation; exceeding it is a soft failure.
    pub navigation_timeout: Duration,
    /// Bound for short protocol steps (page open, init scripts, probes, close).
    pub step_timeout: Duration,
    /// Bound for the injected script's load/error callback.
    pub script_load_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    pub settle_delay: Duration,
    /// In-page wait for `grecaptcha.ready`.
    pub ready_timeout: Duration,
    /// Outer bound for the execute call as a whole.
    pub execute_timeout: Duration,
}

impl ChallengeConfig {
    /// Full script URL including the `render` parameter.
    pub fn script_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.script_endpoint)?;
        url.query_pairs_mut().append_pair("render", &self.site_key);
        Ok(url)
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            site_key: DEFAULT_SITE_KEY.to_string(),
            action: DEFAULT_ACTION.to_string(),
            script_endpoint: DEFAULT_SCRIPT_ENDPOINT.to_string(),
            project_base_url: DEFAULT_PROJECT_BASE_URL.to_string(),
            navigation_timeout: Duration::from_secs(30),
            step_timeout: Duration::from_secs(10),
            script_load_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(500),
            poll_attempts: 20,
            settle_delay: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(15),
            execute_timeout: Duration::from_secs(30),
        }
    }
}
