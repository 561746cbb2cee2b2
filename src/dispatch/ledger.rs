//! In-memory per-account generation slots.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AccountId, ConcurrencyLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationKind {
    Image,
    Video,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::Image => "image",
            GenerationKind::Video => "video",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Limits {
    image: Option<u32>,
    video: Option<u32>,
}

#[derive(Debug, Default)]
struct Slots {
    limits: Limits,
    image_in_use: u32,
    video_in_use: u32,
}

impl Slots {
    fn has_room(&self, kind: GenerationKind) -> bool {
        match kind {
            GenerationKind::Image => self.limits.image.is_none_or(|max| self.image_in_use < max),
            GenerationKind::Video => self.limits.video.is_none_or(|max| self.video_in_use < max),
        }
    }

    fn counter(&mut self, kind: GenerationKind) -> &mut u32 {
        match kind {
            GenerationKind::Image => &mut self.image_in_use,
            GenerationKind::Video => &mut self.video_in_use,
        }
    }
}

/// Slot bookkeeping keyed by account. A `None` limit means unlimited.
#[derive(Debug, Clone, Default)]
pub struct MemoryConcurrencyLedger {
    inner: Arc<Mutex<HashMap<AccountId, Slots>>>,
}

impl MemoryConcurrencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_limits(&self, account_id: AccountId, image: Option<u32>, video: Option<u32>) {
        let mut guard = self.inner.lock().expect("ledger lock poisoned");
        guard.entry(account_id).or_default().limits = Limits { image, video };
    }

    pub fn in_use(&self, account_id: AccountId, kind: GenerationKind) -> u32 {
        let guard = self.inner.lock().expect("ledger lock poisoned");
        guard.get(&account_id).map_or(0, |slots| match kind {
            GenerationKind::Image => slots.image_in_use,
            GenerationKind::Video => slots.video_in_use,
        })
    }

    fn has_room(&self, account_id: AccountId, kind: GenerationKind) -> bool {
        let guard = self.inner.lock().expect("ledger lock poisoned");
        guard.get(&account_id).is_none_or(|slots| slots.has_room(kind))
    }

    /// Take one slot now, or `None` when the account is at its limit.
    pub fn reserve(&self, account_id: AccountId, kind: GenerationKind) -> Option<SlotGuard> {
        let mut guard = self.inner.lock().expect("ledger lock poisoned");
        let slots = guard.entry(account_id).or_default();
        if !slots.has_room(kind) {
            return None;
        }
        *slots.counter(kind) += 1;

        let ledger = Arc::clone(&self.inner);
        Some(SlotGuard::new(account_id, kind, move || {
            let Ok(mut guard) = ledger.lock() else {
                return;
            };
            if let Some(slots) = guard.get_mut(&account_id) {
                let counter = slots.counter(kind);
                *counter = counter.saturating_sub(1);
            }
        }))
    }

    pub fn reserve_image(&self, account_id: AccountId) -> Option<SlotGuard> {
        self.reserve(account_id, GenerationKind::Image)
    }

    pub fn reserve_video(&self, account_id: AccountId) -> Option<SlotGuard> {
        self.reserve(account_id, GenerationKind::Video)
    }
}

#[async_trait]
impl ConcurrencyLedger for MemoryConcurrencyLedger {
    async fn can_use_image_slot(&self, account_id: AccountId) -> bool {
        self.has_room(account_id, GenerationKind::Image)
    }

    async fn can_use_video_slot(&self, account_id: AccountId) -> bool {
        self.has_room(account_id, GenerationKind::Video)
    }

    async fn try_reserve(&self, account_id: AccountId, kind: GenerationKind) -> Option<SlotGuard> {
        self.reserve(account_id, kind)
    }
}

type Release = Box<dyn FnOnce() + Send + Sync>;

/// Held slot. `release` runs exactly once, when the guard drops.
pub struct SlotGuard {
    account_id: AccountId,
    kind: GenerationKind,
    release: Option<Release>,
}

impl SlotGuard {
    /// Guard for a slot taken by any ledger implementation.
    pub fn new(
        account_id: AccountId,
        kind: GenerationKind,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            account_id,
            kind,
            release: Some(Box::new(release)),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn kind(&self) -> GenerationKind {
        self.kind
    }
}

impl fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotGuard")
            .field("account_id", &self.account_id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
