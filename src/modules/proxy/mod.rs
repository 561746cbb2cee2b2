//! Browser proxy parsing and validation.
//!
//! The automation layer accepts a single proxy per browser profile. HTTP(S)
//! proxies may carry credentials; SOCKS5 proxies may not, because Chromium has
//! no way to answer a SOCKS5 authentication handshake.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Protocols understood by the browser proxy layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks5 => "socks5",
        }
    }

    /// Whether credentials can be forwarded by the automation layer.
    pub fn supports_auth(&self) -> bool {
        matches!(self, ProxyScheme::Http | ProxyScheme::Https)
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "http" => Some(ProxyScheme::Http),
            "https" => Some(ProxyScheme::Https),
            "socks5" => Some(ProxyScheme::Socks5),
            _ => None,
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username/password pair attached to an authenticated proxy.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parsed proxy endpoint handed to the browser launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    pub credentials: Option<ProxyCredentials>,
}

impl ProxyConfig {
    /// `scheme://host:port` without credentials, as expected by
    /// `--proxy-server`.
    pub fn server(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn has_auth(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Reasons a proxy URL is refused before it reaches the browser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyValidationError {
    #[error("malformed proxy URL, expected http://host:port or socks5://host:port")]
    Malformed,
    #[error(
        "the browser cannot use an authenticated SOCKS5 proxy; use an HTTP proxy or remove the SOCKS5 credentials"
    )]
    Socks5AuthUnsupported,
    #[error("unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),
}

impl ProxyValidationError {
    /// Human readable reason suitable for an admin UI.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

static PROXY_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(socks5|http|https)://(?:([^:]+):([^@]+)@)?([^:]+):(\d+)$")
        .expect("invalid proxy url regex")
});

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://").expect("invalid proxy scheme regex")
});

/// Parse `scheme://[user:pass@]host:port`.
///
/// Returns `None` for anything outside the grammar, including ports that do
/// not fit in a `u16`. Credentials are kept only when both halves are present.
pub fn parse_proxy_url(proxy_url: &str) -> Option<ProxyConfig> {
    let caps = PROXY_URL_RE.captures(proxy_url)?;
    let scheme = ProxyScheme::from_name(caps.get(1)?.as_str())?;
    let host = caps.get(4)?.as_str().to_string();
    let port = caps.get(5)?.as_str().parse::<u16>().ok()?;

    let credentials = match (caps.get(2), caps.get(3)) {
        (Some(user), Some(pass)) => Some(ProxyCredentials {
            username: user.as_str().to_string(),
            password: pass.as_str().to_string(),
        }),
        _ => None,
    };

    Some(ProxyConfig {
        scheme,
        host,
        port,
        credentials,
    })
}

/// Validate a proxy URL for browser use.
///
/// A blank input means "no proxy" and yields `Ok(None)`.
pub fn validate_proxy_url(
    proxy_url: &str,
) -> Result<Option<ProxyConfig>, ProxyValidationError> {
    let trimmed = proxy_url.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if let Some(caps) = SCHEME_RE.captures(trimmed) {
        let scheme = caps[1].to_ascii_lowercase();
        if ProxyScheme::from_name(&scheme).is_none() {
            return Err(ProxyValidationError::UnsupportedProtocol(scheme));
        }
    }

    let parsed = parse_proxy_url(trimmed).ok_or(ProxyValidationError::Malformed)?;

    if parsed.has_auth() && !parsed.scheme.supports_auth() {
        return Err(ProxyValidationError::Socks5AuthUnsupported);
    }

    Ok(Some(parsed))
}
