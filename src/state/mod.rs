//! Persisted per-budget notification watermark.
//!
//! Every invocation may run in a fresh process, so the external key-value
//! service is the only place where "what did we already announce" lives.
//! Nothing here caches state in memory between calls.
//!
//! # Concurrency
//!
//! Writes are unconditional overwrites (last-write-wins). Two invocations for
//! the same budget that both read the old watermark before either commits
//! will both notify. Alerts for one budget are rare enough that this race is
//! accepted instead of paying for a transactional protocol; the watermark
//! itself stays monotonic because every writer stores `max(old, new)` of what
//! it read.
//!
//! # Keys
//!
//! The billing account is part of the key only when the delivery carries it
//! (Pub/Sub attributes). A budget delivered once as a bare body and once as a
//! Pub/Sub message is tracked under two keys, each with its own watermark.
//! Deployments should feed one budget through one transport.
//!
//! # Layout
//!
//! - [`StateStore`]: budget-level get/set used by the pipeline.
//! - [`KvBackend`]: raw byte storage keyed by string.
//! - [`KvStateStore`]: JSON encoding and key namespacing over any backend.

pub mod file;
pub mod http;
pub mod memory;

use crate::error::StateStoreError;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use file::FileBackend;
pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Default key prefix for stored state.
pub const DEFAULT_KEY_PREFIX: &str = "budgetwatch-state";

/// Highest threshold already announced for one budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetNotificationState {
    #[serde(with = "rust_decimal::serde::str")]
    pub last_notified_threshold: Decimal,
    /// Advisory only; never used for ordering.
    pub updated_at: DateTime<Utc>,
    /// Billing period of the last processed alert, if the source reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_interval_start: Option<DateTime<FixedOffset>>,
}

/// Budget-level access to the persisted watermark.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns `Ok(None)` for a budget that was never committed.
    async fn get(
        &self,
        budget: &BudgetKey,
    ) -> Result<Option<BudgetNotificationState>, StateStoreError>;

    /// Overwrites the stored state for `budget`.
    async fn set(
        &self,
        budget: &BudgetKey,
        state: &BudgetNotificationState,
    ) -> Result<(), StateStoreError>;
}

/// Raw key-value storage.
#[async_trait]
pub trait KvBackend: Send + Sync {
    fn backend_type(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateStoreError>;

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StateStoreError>;
}

#[async_trait]
impl<T: KvBackend + ?Sized> KvBackend for std::sync::Arc<T> {
    fn backend_type(&self) -> &str {
        (**self).backend_type()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateStoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StateStoreError> {
        (**self).put(key, value).await
    }
}

/// Identifies the budget whose state is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BudgetKey {
    pub budget_id: String,
    pub billing_account_id: Option<String>,
}

impl BudgetKey {
    pub fn new(budget_id: impl Into<String>, billing_account_id: Option<String>) -> Self {
        Self {
            budget_id: budget_id.into(),
            billing_account_id,
        }
    }

    /// Storage key, e.g. `budgetwatch-state_BILLING-01D4EE_BUDGET-abc`.
    pub fn storage_key(&self, prefix: &str) -> String {
        let mut key = prefix.to_string();
        if let Some(ref billing) = self.billing_account_id {
            key.push_str("_BILLING-");
            key.push_str(&sanitize(billing));
        }
        key.push_str("_BUDGET-");
        key.push_str(&sanitize(&self.budget_id));
        key
    }
}

impl std::fmt::Display for BudgetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.billing_account_id {
            Some(ref billing) => write!(f, "{}/{}", billing, self.budget_id),
            None => write!(f, "{}", self.budget_id),
        }
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9-]`, `_` included, so keys
/// stay usable as file names and URL path segments and distinct ids never
/// map to the same key.
fn sanitize(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for byte in part.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// [`StateStore`] storing JSON blobs in a [`KvBackend`].
#[derive(Debug)]
pub struct KvStateStore<B> {
    backend: B,
    key_prefix: String,
}

impl<B: KvBackend> KvStateStore<B> {
    pub fn new(backend: B, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn key_for(&self, budget: &BudgetKey) -> String {
        budget.storage_key(&self.key_prefix)
    }
}

#[async_trait]
impl<B: KvBackend> StateStore for KvStateStore<B> {
    async fn get(
        &self,
        budget: &BudgetKey,
    ) -> Result<Option<BudgetNotificationState>, StateStoreError> {
        let key = self.key_for(budget);
        let Some(bytes) = self.backend.get(&key).await? else {
            tracing::debug!(key = %key, "No stored state");
            return Ok(None);
        };

        match serde_json::from_slice::<BudgetNotificationState>(&bytes) {
            Ok(state) => {
                tracing::debug!(
                    key = %key,
                    watermark = %state.last_notified_threshold,
                    "Loaded stored state"
                );
                Ok(Some(state))
            }
            Err(e) => {
                // Unreadable state must not suppress alerts; the next commit
                // replaces it.
                tracing::warn!(
                    key = %key,
                    backend = self.backend.backend_type(),
                    error = %e,
                    "Stored state is unreadable, treating as absent"
                );
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        budget: &BudgetKey,
        state: &BudgetNotificationState,
    ) -> Result<(), StateStoreError> {
        let key = self.key_for(budget);
        let bytes =
            serde_json::to_vec(state).map_err(|e| StateStoreError::Encode(e.to_string()))?;
        self.backend.put(&key, &bytes).await?;
        tracing::debug!(
            key = %key,
            watermark = %state.last_notified_threshold,
            "Stored state"
        );
        Ok(())
    }
}
