//! In-memory account pool.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::{Account, AccountId, AccountPool};

#[derive(Debug, Clone)]
struct Entry {
    account: Account,
    active: bool,
}

/// Account pool kept in process memory, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountPool {
    accounts: Arc<RwLock<BTreeMap<AccountId, Entry>>>,
}

impl MemoryAccountPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let pool = Self::new();
        for account in accounts {
            pool.upsert(account);
        }
        pool
    }

    /// Insert or replace an account. New accounts start active; replacing
    /// keeps the current active flag.
    pub fn upsert(&self, account: Account) {
        let mut guard = self.accounts.write().expect("account pool lock poisoned");
        let active = guard.get(&account.id).is_none_or(|entry| entry.active);
        guard.insert(account.id, Entry { account, active });
    }

    pub fn remove(&self, account_id: AccountId) -> Option<Account> {
        let mut guard = self.accounts.write().expect("account pool lock poisoned");
        guard.remove(&account_id).map(|entry| entry.account)
    }

    /// Returns `false` when the account is unknown.
    pub fn set_active(&self, account_id: AccountId, active: bool) -> bool {
        let mut guard = self.accounts.write().expect("account pool lock poisoned");
        match guard.get_mut(&account_id) {
            Some(entry) => {
                entry.active = active;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, account_id: AccountId) -> Option<Account> {
        let guard = self.accounts.read().expect("account pool lock poisoned");
        guard.get(&account_id).map(|entry| entry.account.clone())
    }

    pub fn len(&self) -> usize {
        self.accounts.read().expect("account pool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AccountPool for MemoryAccountPool {
    async fn active_accounts(&self) -> Vec<Account> {
        let guard = self.accounts.read().expect("account pool lock poisoned");
        guard
            .values()
            .filter(|entry| entry.active)
            .map(|entry| entry.account.clone())
            .collect()
    }

    /// A token is valid when present, non-empty and either without expiry or
    /// expiring in the future.
    async fn is_access_token_valid(&self, account_id: AccountId) -> bool {
        let guard = self.accounts.read().expect("account pool lock poisoned");
        let Some(entry) = guard.get(&account_id) else {
            return false;
        };
        let account = &entry.account;
        match account.access_token.as_deref() {
            Some(token) if !token.is_empty() => account
                .access_token_expires_at
                .is_none_or(|expires_at| expires_at > Utc::now()),
            _ => false,
        }
    }
}
