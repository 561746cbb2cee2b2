//! API key classification.

use thiserror::Error;

/// What a caller's key entitles it to draw from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessScope {
    Unrestricted,
    PremiumOnly,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("authorization header is missing the Bearer scheme")]
    MissingBearer,
}

/// Maps a presented credential to an [`AccessScope`].
///
/// The primary key grants the whole pool. The secondary key, when configured
/// and non-empty, is confined to premium accounts. Matching is exact.
#[derive(Clone)]
pub struct ApiKeyClassifier {
    primary: String,
    premium: Option<String>,
}

impl ApiKeyClassifier {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            premium: None,
        }
    }

    pub fn with_premium_key(mut self, key: Option<String>) -> Self {
        self.premium = key.filter(|key| !key.is_empty());
        self
    }

    pub fn classify(&self, credential: &str) -> Result<AccessScope, AuthError> {
        if !self.primary.is_empty() && credential == self.primary {
            return Ok(AccessScope::Unrestricted);
        }
        if self.premium.as_deref() == Some(credential) {
            return Ok(AccessScope::PremiumOnly);
        }
        Err(AuthError::InvalidApiKey)
    }

    /// Classify the value of an `Authorization` header.
    pub fn classify_bearer(&self, header: &str) -> Result<AccessScope, AuthError> {
        let credential = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingBearer)?;
        self.classify(credential)
    }

    pub fn verify(&self, credential: &str) -> bool {
        self.classify(credential).is_ok()
    }
}

impl std::fmt::Debug for ApiKeyClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyClassifier")
            .field("primary", &"***")
            .field("premium", &self.premium.as_ref().map(|_| "***"))
            .finish()
    }
}
