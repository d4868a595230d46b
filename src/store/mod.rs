//! Shared expiring key/value store.
//!
//! The store is the single source of truth for all cross-process
//! coordination: locks, leader election, replay records. Components receive
//! an `Arc<dyn KeyValueStore>` at construction; no lock state is cached
//! in-process beyond one acquire/release scope.

pub mod lock;
pub mod memory;
pub mod replay;

pub use lock::DistributedLock;
pub use memory::InMemoryStore;
pub use replay::{Admission, ReplayGuard, MAX_EVENT_AGE};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Minimal contract this system needs from a shared key/value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically create `key` with `ttl` iff it does not exist.
    /// Returns `true` iff this call created the entry.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditional write, with optional expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Idempotent delete; absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
