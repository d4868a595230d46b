//! Startup webhook registration with leader election.
//!
//! Many replicas may cold-start at once, but the provider-side webhook must
//! be registered exactly once. One instance wins the registration lock and
//! performs the lookup-or-create; everyone else polls the shared record for
//! the webhook id. An instance that cannot confirm a registration happened
//! somewhere must not come up serving traffic.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::provider::{ProviderClient, ProviderError};
use crate::store::{DistributedLock, KeyValueStore, StoreError};

pub const WEBHOOK_LOCK_KEY: &str = "webhook:register:lock";
pub const WEBHOOK_ID_KEY: &str = "webhook:register:id";

const LOCK_TTL: Duration = Duration::from_secs(30);
const POLL_DELAY: Duration = Duration::from_secs(3);
const MAX_POLL_ATTEMPTS: u32 = 20;

const WEBHOOK_SUBSCRIPTIONS: &[&str] = &["invoice"];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("webhook registration failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("store unavailable during bootstrap: {0}")]
    Store(#[from] StoreError),
    #[error("could not confirm webhook registration after {0} polling attempts")]
    Unconfirmed(u32),
}

/// Ensure the provider webhook exists, returning its id.
///
/// The lock winner registers and stores the id; losers poll the stored id on
/// a fixed interval up to a bounded attempt count, then fail the startup.
pub async fn ensure_webhook_registered(
    store: Arc<dyn KeyValueStore>,
    provider: &dyn ProviderClient,
    webhook_url: &str,
) -> Result<String, BootstrapError> {
    let lock = DistributedLock::new(store.clone());

    if lock.acquire(WEBHOOK_LOCK_KEY, LOCK_TTL).await? {
        // Critical section: release whatever happens inside.
        let result = register(provider, webhook_url).await;
        let release = lock.release(WEBHOOK_LOCK_KEY).await;

        let webhook_id = result?;
        release?;

        store.set(WEBHOOK_ID_KEY, &webhook_id, None).await?;
        info!(webhook_id = %webhook_id, "Webhook registration confirmed as leader");
        return Ok(webhook_id);
    }

    // Another instance is registering; wait for it to publish the id.
    for attempt in 1..=MAX_POLL_ATTEMPTS {
        tokio::time::sleep(POLL_DELAY).await;
        if let Some(webhook_id) = store.get(WEBHOOK_ID_KEY).await? {
            info!(webhook_id = %webhook_id, attempt, "Adopted webhook registered elsewhere");
            return Ok(webhook_id);
        }
        warn!(attempt, max_attempts = MAX_POLL_ATTEMPTS, "Webhook id not yet published");
    }
    Err(BootstrapError::Unconfirmed(MAX_POLL_ATTEMPTS))
}

async fn register(
    provider: &dyn ProviderClient,
    webhook_url: &str,
) -> Result<String, ProviderError> {
    if let Some(existing) = provider
        .list_webhooks()
        .await?
        .into_iter()
        .find(|w| w.url == webhook_url)
    {
        info!(webhook_id = %existing.id, "Webhook already registered");
        return Ok(existing.id);
    }

    let created = provider
        .create_webhook(webhook_url, WEBHOOK_SUBSCRIPTIONS)
        .await?;
    info!(webhook_id = %created.id, url = %webhook_url, "Webhook created");
    Ok(created.id)
}
