//! Account dispatching.
//!
//! Picks the pooled account that serves a request. Filtering is
//! deterministic; the final pick is a uniform random draw over every
//! survivor so load spreads across the pool instead of piling onto the
//! "best" account.

pub mod auth;
pub mod ledger;
pub mod pool;

pub use auth::{AccessScope, ApiKeyClassifier, AuthError};
pub use ledger::{GenerationKind, MemoryConcurrencyLedger, SlotGuard};
pub use pool::MemoryAccountPool;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;

use crate::modules::events::{EventDispatcher, GatewayEvent, SelectionEvent};

/// Paygate tiers that count as premium accounts.
pub const PREMIUM_PAYGATE_TIERS: &[&str] = &["PAYGATE_TIER_TWO"];

pub type AccountId = i64;

/// Pooled third-party account. Owned by the token-management layer; the
/// dispatcher only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub credits: i64,
    pub image_enabled: bool,
    pub video_enabled: bool,
    pub access_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub user_paygate_tier: Option<String>,
}

impl Account {
    pub fn new(id: AccountId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            credits: 0,
            image_enabled: true,
            video_enabled: true,
            access_token: None,
            access_token_expires_at: None,
            user_paygate_tier: None,
        }
    }

    pub fn with_access_token(
        mut self,
        token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.access_token = Some(token.into());
        self.access_token_expires_at = expires_at;
        self
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.user_paygate_tier = Some(tier.into());
        self
    }

    pub fn with_credits(mut self, credits: i64) -> Self {
        self.credits = credits;
        self
    }

    pub fn with_capabilities(mut self, image_enabled: bool, video_enabled: bool) -> Self {
        self.image_enabled = image_enabled;
        self.video_enabled = video_enabled;
        self
    }

    pub fn is_premium(&self) -> bool {
        self.user_paygate_tier
            .as_deref()
            .is_some_and(|tier| PREMIUM_PAYGATE_TIERS.contains(&tier))
    }
}

/// Source of active accounts and token validity.
#[async_trait]
pub trait AccountPool: Send + Sync {
    async fn active_accounts(&self) -> Vec<Account>;
    async fn is_access_token_valid(&self, account_id: AccountId) -> bool;
}

/// Per-account generation slot bookkeeping.
///
/// `can_use_*` answers are advisory. [`try_reserve`](Self::try_reserve)
/// re-checks and takes the slot atomically; the slot is held until the
/// returned guard drops.
#[async_trait]
pub trait ConcurrencyLedger: Send + Sync {
    async fn can_use_image_slot(&self, account_id: AccountId) -> bool;
    async fn can_use_video_slot(&self, account_id: AccountId) -> bool;
    async fn try_reserve(&self, account_id: AccountId, kind: GenerationKind) -> Option<SlotGuard>;
}

/// Why an account was filtered out. Each dropped account carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    InvalidAccessToken,
    NotPremium,
    ImageDisabled,
    ImageSlotsFull,
    VideoDisabled,
    VideoSlotsFull,
}

impl DropReason {
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::InvalidAccessToken => "invalid_access_token",
            DropReason::NotPremium => "not_premium",
            DropReason::ImageDisabled => "image_disabled",
            DropReason::ImageSlotsFull => "image_slots_full",
            DropReason::VideoDisabled => "video_disabled",
            DropReason::VideoSlotsFull => "video_slots_full",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::InvalidAccessToken => "access token invalid or expired",
            DropReason::NotPremium => "not a premium account (premium key may only use premium accounts)",
            DropReason::ImageDisabled => "image generation disabled",
            DropReason::ImageSlotsFull => "image concurrency limit reached",
            DropReason::VideoDisabled => "video generation disabled",
            DropReason::VideoSlotsFull => "video concurrency limit reached",
        };
        f.write_str(text)
    }
}

/// What the caller needs from an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub require_image: bool,
    pub require_video: bool,
    /// Accepted for routing compatibility; it does not narrow the candidate
    /// set beyond the image/video flags.
    pub model: Option<String>,
    pub scope: AccessScope,
}

impl SelectionRequest {
    pub fn new(scope: AccessScope) -> Self {
        Self {
            require_image: false,
            require_video: false,
            model: None,
            scope,
        }
    }

    pub fn image(scope: AccessScope) -> Self {
        Self {
            require_image: true,
            ..Self::new(scope)
        }
    }

    pub fn video(scope: AccessScope) -> Self {
        Self {
            require_video: true,
            ..Self::new(scope)
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Per-run breakdown of the filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionReport {
    pub considered: usize,
    pub dropped: Vec<(AccountId, DropReason)>,
    pub eligible: Vec<AccountId>,
}

impl SelectionReport {
    pub fn reason_for(&self, account_id: AccountId) -> Option<DropReason> {
        self.dropped
            .iter()
            .find(|(id, _)| *id == account_id)
            .map(|(_, reason)| *reason)
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub account: Option<Account>,
    pub report: SelectionReport,
}

/// Filters the live pool and draws one eligible account.
///
/// The dispatcher takes no locks and reserves nothing: an account reported
/// as having a free slot may be full by the time the caller uses it, so the
/// caller re-validates when reserving.
pub struct AccountDispatcher {
    pool: Arc<dyn AccountPool>,
    ledger: Option<Arc<dyn ConcurrencyLedger>>,
    events: Option<Arc<EventDispatcher>>,
}

impl AccountDispatcher {
    pub fn new(pool: Arc<dyn AccountPool>) -> Self {
        Self {
            pool,
            ledger: None,
            events: None,
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn ConcurrencyLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn select(&self, request: &SelectionRequest) -> Option<Account> {
        self.select_with_report(request).await.account
    }

    pub async fn select_with_report(&self, request: &SelectionRequest) -> Selection {
        let active = self.pool.active_accounts().await;
        let mut report = SelectionReport {
            considered: active.len(),
            ..Default::default()
        };

        let mut eligible = Vec::with_capacity(active.len());
        for account in active {
            match self.check(&account, request).await {
                Ok(()) => {
                    report.eligible.push(account.id);
                    eligible.push(account);
                }
                Err(reason) => report.dropped.push((account.id, reason)),
            }
        }

        let account = eligible.choose(&mut rand::thread_rng()).cloned();

        if let Some(events) = &self.events {
            events.dispatch(GatewayEvent::Selection(SelectionEvent {
                scope: request.scope,
                require_image: request.require_image,
                require_video: request.require_video,
                model: request.model.clone(),
                considered: report.considered,
                dropped: report
                    .dropped
                    .iter()
                    .map(|(id, reason)| (id.to_string(), *reason))
                    .collect(),
                selected: account
                    .as_ref()
                    .map(|acc| format!("{} ({}, credits {})", acc.id, acc.email, acc.credits)),
                timestamp: Utc::now(),
            }));
        }

        Selection { account, report }
    }

    async fn check(&self, account: &Account, request: &SelectionRequest) -> Result<(), DropReason> {
        if !self.pool.is_access_token_valid(account.id).await {
            return Err(DropReason::InvalidAccessToken);
        }

        if request.scope == AccessScope::PremiumOnly && !account.is_premium() {
            return Err(DropReason::NotPremium);
        }

        if request.require_image {
            if !account.image_enabled {
                return Err(DropReason::ImageDisabled);
            }
            if let Some(ledger) = &self.ledger
                && !ledger.can_use_image_slot(account.id).await
            {
                return Err(DropReason::ImageSlotsFull);
            }
        }

        if request.require_video {
            if !account.video_enabled {
                return Err(DropReason::VideoDisabled);
            }
            if let Some(ledger) = &self.ledger
                && !ledger.can_use_video_slot(account.id).await
            {
                return Err(DropReason::VideoSlotsFull);
            }
        }

        Ok(())
    }
}
