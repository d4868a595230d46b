//! Payment-provider integration.
//!
//! The provider is an opaque remote collaborator: transfers and invoices are
//! created against it, undelivered events are pulled from it, and webhook
//! registrations are managed on it. Everything network-facing sits behind
//! [`ProviderClient`] so the pipeline can be exercised without the network.

pub mod http;
pub mod keys;
pub mod signature;
pub mod types;

pub use http::HttpProviderClient;
pub use keys::{KeyCache, KeyCacheError, ProviderKey};
pub use signature::SignatureVerifier;
pub use types::{
    AccountType, DestinationAccount, EventLog, InboundEvent, Invoice, InvoiceSnapshot, LogDetail,
    ModelError, Person, Transfer, WebhookEnvelope, AMOUNT_MAX,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider response could not be decoded: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether a retry may succeed. Connection errors and server-side
    /// statuses are transient; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(_) => true,
            ProviderError::Status { status, .. } => *status >= 500 || *status == 429,
            ProviderError::Decode(_) => false,
        }
    }
}

/// A webhook registration on the provider side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRegistration {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

/// Remote calls against the payment provider. All methods may fail; callers
/// classify failures via [`ProviderError::is_transient`].
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn create_transfer(&self, transfer: &types::Transfer) -> Result<(), ProviderError>;

    async fn create_invoices(&self, invoices: &[types::Invoice]) -> Result<(), ProviderError>;

    /// Events the provider has not managed to deliver to the webhook.
    async fn undelivered_events(&self) -> Result<Vec<types::InboundEvent>, ProviderError>;

    /// Acknowledge delivery so the provider stops redelivering the event.
    async fn mark_delivered(&self, event_id: &str) -> Result<(), ProviderError>;

    async fn list_webhooks(&self) -> Result<Vec<WebhookRegistration>, ProviderError>;

    async fn create_webhook(
        &self,
        url: &str,
        subscriptions: &[&str],
    ) -> Result<WebhookRegistration, ProviderError>;
}
