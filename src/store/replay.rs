//! Replay and staleness guard for inbound events.
//!
//! Two defenses, checked in order: an age window shorter than the provider's
//! delivery-retry cadence, and a processed-record keyed by event id. The
//! record is written only after successful processing, so a crash
//! mid-processing leaves the event eligible for a legitimate retry.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::{KeyValueStore, StoreError};

/// Events older than this are rejected and left to reconciliation.
pub const MAX_EVENT_AGE: Duration = Duration::from_secs(7 * 60);

/// Processed records outlive the acceptance window by this margin so a
/// record cannot expire while provider retries are still arriving.
const RECORD_TTL_MARGIN: Duration = Duration::from_secs(60);

const RECORD_SENTINEL: &str = "1";

/// Outcome of admission checks. Expected alternates, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    TooOld,
    AlreadyProcessed,
}

#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn KeyValueStore>,
}

impl ReplayGuard {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn record_key(event_id: &str) -> String {
        format!("event:processed:{}", event_id)
    }

    pub async fn admit(
        &self,
        event_id: &str,
        created: DateTime<Utc>,
    ) -> Result<Admission, StoreError> {
        let age = Utc::now().signed_duration_since(created);
        if age.to_std().map_or(false, |age| age > MAX_EVENT_AGE) {
            return Ok(Admission::TooOld);
        }

        if self.is_processed(event_id).await? {
            return Ok(Admission::AlreadyProcessed);
        }

        Ok(Admission::Admitted)
    }

    /// Whether a processed record exists for this event id.
    pub async fn is_processed(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&Self::record_key(event_id)).await?.is_some())
    }

    /// Record the event as processed. Called after successful processing.
    pub async fn record_processed(&self, event_id: &str) -> Result<(), StoreError> {
        self.store
            .set_if_absent(
                &Self::record_key(event_id),
                RECORD_SENTINEL,
                MAX_EVENT_AGE + RECORD_TTL_MARGIN,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::TimeDelta;

    fn guard() -> ReplayGuard {
        ReplayGuard::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_fresh_event_admitted() {
        let guard = guard();
        let created = Utc::now() - TimeDelta::seconds(10);
        assert_eq!(guard.admit("E1", created).await.unwrap(), Admission::Admitted);
    }

    #[tokio::test]
    async fn test_event_past_age_window_rejected() {
        let guard = guard();
        let created = Utc::now() - TimeDelta::seconds(8 * 60);
        assert_eq!(guard.admit("E1", created).await.unwrap(), Admission::TooOld);
    }

    #[tokio::test]
    async fn test_future_dated_event_admitted() {
        // Clock skew can put `created` slightly ahead of us. That is not
        // staleness.
        let guard = guard();
        let created = Utc::now() + TimeDelta::seconds(30);
        assert_eq!(guard.admit("E1", created).await.unwrap(), Admission::Admitted);
    }

    #[tokio::test]
    async fn test_recorded_event_rejected_as_duplicate() {
        let guard = guard();
        let created = Utc::now() - TimeDelta::seconds(10);

        assert_eq!(guard.admit("E1", created).await.unwrap(), Admission::Admitted);
        guard.record_processed("E1").await.unwrap();
        assert_eq!(
            guard.admit("E1", created).await.unwrap(),
            Admission::AlreadyProcessed
        );

        // A different id is unaffected.
        assert_eq!(guard.admit("E2", created).await.unwrap(), Admission::Admitted);
    }

    #[tokio::test]
    async fn test_admit_does_not_create_a_record() {
        let guard = guard();
        let created = Utc::now();

        guard.admit("E1", created).await.unwrap();
        // Still admitted: only record_processed writes the record.
        assert_eq!(guard.admit("E1", created).await.unwrap(), Admission::Admitted);
    }

    #[tokio::test]
    async fn test_staleness_checked_before_duplicate() {
        let guard = guard();
        guard.record_processed("E1").await.unwrap();

        let stale = Utc::now() - TimeDelta::seconds(10 * 60);
        assert_eq!(guard.admit("E1", stale).await.unwrap(), Admission::TooOld);
    }
}
