//! In-process expiring key/value adapter.
//!
//! Entries carry an optional deadline and are treated as absent once it
//! passes; expired entries are reaped lazily on access.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let new_entry = Entry {
            value: value.to_string(),
            expires_at: Some(Instant::now() + ttl),
        };

        // DashMap entry API keeps check-and-insert atomic per key.
        let mut created = false;
        let mut slot = self.entries.entry(key.to_string()).or_insert_with(|| {
            created = true;
            new_entry.clone()
        });
        if !created && slot.is_expired() {
            *slot = new_entry;
            created = true;
        }
        Ok(created)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Reap after the read guard is dropped.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_if_absent_first_wins() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.set_if_absent("k", "1", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", "2", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let store = InMemoryStore::new();

        store
            .set_if_absent("k", "1", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        // The slot is free for a new owner after expiry.
        assert!(
            store
                .set_if_absent("k", "2", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryStore::new();
        store.set("k", "v", None).await.unwrap();

        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_without_ttl_does_not_expire() {
        let store = InMemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_concurrent_set_if_absent_exactly_one_winner() {
        let store = Arc::new(InMemoryStore::new());

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_if_absent("contested", &i.to_string(), Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
