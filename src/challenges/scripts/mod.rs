//! Page-side payloads.
//!
//! The strings here are the wire contract with the page's scripting
//! environment: evasion patches registered before navigation, and the
//! reCAPTCHA v3 protocol (probe, bootstrap, execute) evaluated afterwards.

pub mod evasion;

pub use evasion::{EvasionPatch, compose_evasion_script};

use serde::Deserialize;
use serde_json::json;

use crate::challenges::core::ChallengeConfig;

/// Evaluates to `true` once `grecaptcha.execute` is callable.
pub const READY_PROBE: &str =
    "(() => !!(window.grecaptcha && typeof window.grecaptcha.execute === 'function'))()";

/// Outcome reported by [`ChallengeProtocol::execute_script`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ExecuteOutcome {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Builds the protocol expressions for one challenge configuration.
#[derive(Debug, Clone)]
pub struct ChallengeProtocol {
    site_key: String,
    action: String,
    script_url: String,
    load_timeout_ms: u128,
    ready_timeout_ms: u128,
}

impl ChallengeProtocol {
    pub fn new(config: &ChallengeConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            site_key: config.site_key.clone(),
            action: config.action.clone(),
            script_url: config.script_url()?.to_string(),
            load_timeout_ms: config.script_load_timeout.as_millis(),
            ready_timeout_ms: config.ready_timeout.as_millis(),
        })
    }

    pub fn ready_probe(&self) -> &'static str {
        READY_PROBE
    }

    /// Appends the provider script to `<head>` and resolves to whether it
    /// loaded. Resolves `false` on error or after the load timeout.
    pub fn inject_script(&self) -> String {
        let src = json!(self.script_url);
        let timeout = self.load_timeout_ms;
        format!(
            r#"new Promise((resolve) => {{
    const timer = setTimeout(() => resolve(false), {timeout});
    const script = document.createElement('script');
    script.src = {src};
    script.async = true;
    script.defer = true;
    script.onload = () => {{ clearTimeout(timer); resolve(true); }};
    script.onerror = () => {{ clearTimeout(timer); resolve(false); }};
    (document.head || document.documentElement).appendChild(script);
}})"#
        )
    }

    /// Runs `grecaptcha.execute` behind `grecaptcha.ready`, resolving to an
    /// object shaped like [`ExecuteOutcome`]. Never rejects.
    pub fn execute_script(&self) -> String {
        let site_key = json!(self.site_key);
        let action = json!(self.action);
        let timeout = self.ready_timeout_ms;
        format!(
            r#"(async () => {{
    try {{
        if (!window.grecaptcha) {{
            return {{ token: null, error: 'grecaptcha missing' }};
        }}
        if (typeof window.grecaptcha.execute !== 'function') {{
            return {{ token: null, error: 'grecaptcha.execute is not a function' }};
        }}
        await new Promise((resolve, reject) => {{
            const timer = setTimeout(() => reject(new Error('grecaptcha.ready timed out')), {timeout});
            if (typeof window.grecaptcha.ready === 'function') {{
                window.grecaptcha.ready(() => {{ clearTimeout(timer); resolve(); }});
            }} else {{
                clearTimeout(timer);
                resolve();
            }}
        }});
        const token = await window.grecaptcha.execute({site_key}, {{ action: {action} }});
        return {{ token: token || null, error: token ? null : 'empty token' }};
    }} catch (error) {{
        return {{ token: null, error: String(error && error.message ? error.message : error) }};
    }}
}})()"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::{DEFAULT_ACTION, DEFAULT_SITE_KEY};

    #[test]
    fn execute_script_embeds_key_and_action() {
        let protocol = ChallengeProtocol::new(&ChallengeConfig::default()).unwrap();
        let script = protocol.execute_script();
        assert!(script.contains(&format!("\"{DEFAULT_SITE_KEY}\"")));
        assert!(script.contains(&format!("action: \"{DEFAULT_ACTION}\"")));
        assert!(script.contains("15000"));
    }

    #[test]
    fn inject_script_points_at_render_endpoint() {
        let protocol = ChallengeProtocol::new(&ChallengeConfig::default()).unwrap();
        let script = protocol.inject_script();
        assert!(script.contains("recaptcha/api.js?render="));
        assert!(script.contains("onerror"));
    }

    #[test]
    fn outcome_tolerates_missing_fields() {
        let outcome: ExecuteOutcome = serde_json::from_value(json!({ "token": "abc" })).unwrap();
        assert_eq!(outcome.token.as_deref(), Some("abc"));
        assert!(outcome.error.is_none());
    }
}
