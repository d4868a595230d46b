//! Distributed mutual exclusion over the shared store.
//!
//! A lock is a plain store entry created with set-if-absent and an expiry:
//! whoever creates it owns it until release or TTL. No fencing tokens and
//! no waiting. Contention is a skip signal, not an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{KeyValueStore, StoreError};

const LOCK_SENTINEL: &str = "1";

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// `true` iff this call created the lock entry.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.store.set_if_absent(key, LOCK_SENTINEL, ttl).await
    }

    /// Idempotent; releasing an absent or expired lock is a no-op.
    pub async fn release(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(key).await
    }

    /// Run `work` under the lock, releasing afterward whatever the outcome.
    ///
    /// Returns `Ok(None)` when the lock is held elsewhere and the work was
    /// skipped. The TTL remains the backstop if the process dies mid-scope.
    pub async fn with_lock<F, Fut, T>(
        &self,
        key: &str,
        ttl: Duration,
        work: F,
    ) -> Result<Option<T>, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.acquire(key, ttl).await? {
            return Ok(None);
        }
        let out = work().await;
        self.release(key).await?;
        Ok(Some(out))
    }
}
