//! Undelivered-event reconciliation.
//!
//! The webhook misses events: deliveries time out, the service restarts, the
//! acceptance window expires. On a schedule this job pulls every event the
//! provider still holds as undelivered and replays the intake dispatch logic
//! per event under a per-event lock, so redundant triggers across instances
//! cannot double-pay. Signature and age checks do not apply to a trusted
//! pull. Every event is marked delivered after its attempt, success or not:
//! a permanently failing event must not be redelivered forever.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::dispatch::TransferDispatcher;
use crate::intake::credited_invoice;
use crate::provider::{ProviderClient, ProviderError};
use crate::store::{DistributedLock, ReplayGuard};

/// Backstop for a worker dying mid-event.
pub const EVENT_LOCK_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub fetched: usize,
    pub dispatched: usize,
    pub ignored: usize,
    pub failed: usize,
    /// Lock held by another instance.
    pub skipped: usize,
    pub marked_delivered: usize,
}

pub struct ReconciliationJob {
    provider: Arc<dyn ProviderClient>,
    lock: DistributedLock,
    replay: ReplayGuard,
    dispatcher: Arc<TransferDispatcher>,
}

impl ReconciliationJob {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        lock: DistributedLock,
        replay: ReplayGuard,
        dispatcher: Arc<TransferDispatcher>,
    ) -> Self {
        Self {
            provider,
            lock,
            replay,
            dispatcher,
        }
    }

    /// One reconciliation pass. Only the event fetch itself can fail the
    /// pass; per-event failures are contained so one bad event cannot block
    /// marking the rest.
    pub async fn run_once(&self) -> Result<ReconcileSummary, ProviderError> {
        let events = self.provider.undelivered_events().await?;
        let mut summary = ReconcileSummary {
            fetched: events.len(),
            ..Default::default()
        };

        for event in events {
            let lock_key = format!("event:{}", event.id);
            match self.lock.acquire(&lock_key, EVENT_LOCK_TTL).await {
                Ok(true) => {}
                Ok(false) => {
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Lock unavailable, skipping event");
                    summary.failed += 1;
                    continue;
                }
            }

            self.settle_event(&event, &mut summary).await;

            if let Err(e) = self.lock.release(&lock_key).await {
                warn!(event_id = %event.id, error = %e, "Could not release event lock");
            }
        }

        info!(
            fetched = summary.fetched,
            dispatched = summary.dispatched,
            ignored = summary.ignored,
            failed = summary.failed,
            skipped = summary.skipped,
            "Reconciliation pass complete"
        );
        Ok(summary)
    }

    async fn settle_event(
        &self,
        event: &crate::provider::types::InboundEvent,
        summary: &mut ReconcileSummary,
    ) {
        match self.dispatch_if_due(event).await {
            Ok(true) => summary.dispatched += 1,
            Ok(false) => summary.ignored += 1,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Event reconciliation failed");
                summary.failed += 1;
            }
        }

        // Delivery acknowledgment is decoupled from transfer outcome.
        match self.provider.mark_delivered(&event.id).await {
            Ok(()) => summary.marked_delivered += 1,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Could not mark event delivered");
            }
        }
    }

    /// Same dispatch predicate as webhook intake, minus signature/age.
    async fn dispatch_if_due(
        &self,
        event: &crate::provider::types::InboundEvent,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let Some(invoice) = credited_invoice(event) else {
            return Ok(false);
        };
        if self.replay.is_processed(&event.id).await? {
            return Ok(false);
        }
        self.dispatcher.dispatch_credit(invoice).await?;
        self.replay.record_processed(&event.id).await?;
        Ok(true)
    }

    /// Scheduled loop; runs forever.
    pub async fn run(&self, every: Duration) {
        info!(interval_secs = every.as_secs(), "Starting reconciliation schedule");
        loop {
            tokio::time::sleep(every).await;
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Reconciliation pass failed");
            }
        }
    }
}
