//! Work-sender capability.
//!
//! One interface for handing work downstream, with the transport chosen at
//! construction: `QueueWorkSender` publishes envelopes for the retry
//! consumer, `DirectWorkSender` calls the provider inline. Components depend
//! on the capability, not the transport.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::provider::types::{Invoice, Transfer};
use crate::provider::{ProviderClient, ProviderError};

use super::broker::{BrokerError, Headers, MessageBroker};
use super::envelope::{Envelope, EnvelopeError};

/// Correlates a published message across requeues in logs.
pub const MESSAGE_ID_HEADER: &str = "x-message-id";

#[derive(Debug, Error)]
pub enum SendError {
    #[error("queue publish failed: {0}")]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),
}

#[async_trait]
pub trait WorkSender: Send + Sync {
    async fn send_transfer(&self, transfer: &Transfer) -> Result<(), SendError>;

    async fn send_invoices(&self, invoices: &[Invoice]) -> Result<(), SendError>;
}

/// Publishes work onto the durable queue; the retry consumer executes it.
pub struct QueueWorkSender {
    broker: Arc<dyn MessageBroker>,
    queue: String,
}

impl QueueWorkSender {
    pub fn new(broker: Arc<dyn MessageBroker>, queue: impl Into<String>) -> Self {
        Self {
            broker,
            queue: queue.into(),
        }
    }

    async fn publish(&self, envelope: Envelope) -> Result<(), SendError> {
        let bytes = envelope.to_bytes()?;
        let message_id = uuid::Uuid::new_v4().to_string();
        let mut headers = Headers::new();
        headers.insert(MESSAGE_ID_HEADER.to_string(), message_id.clone());
        self.broker.publish(&self.queue, &bytes, headers).await?;
        debug!(queue = %self.queue, kind = %envelope.kind, message_id = %message_id, "Published work item");
        Ok(())
    }
}

#[async_trait]
impl WorkSender for QueueWorkSender {
    async fn send_transfer(&self, transfer: &Transfer) -> Result<(), SendError> {
        self.publish(Envelope::transfer(transfer)?).await
    }

    async fn send_invoices(&self, invoices: &[Invoice]) -> Result<(), SendError> {
        for invoice in invoices {
            self.publish(Envelope::invoice(invoice)?).await?;
        }
        Ok(())
    }
}

/// Calls the provider inline, bypassing the queue. No retry semantics.
pub struct DirectWorkSender {
    provider: Arc<dyn ProviderClient>,
}

impl DirectWorkSender {
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl WorkSender for DirectWorkSender {
    async fn send_transfer(&self, transfer: &Transfer) -> Result<(), SendError> {
        self.provider.create_transfer(transfer).await?;
        Ok(())
    }

    async fn send_invoices(&self, invoices: &[Invoice]) -> Result<(), SendError> {
        self.provider.create_invoices(invoices).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::provider::types::{AccountType, DestinationAccount, Person};
    use crate::queue::envelope::WorkItem;
    use crate::queue::memory::InMemoryBroker;
    use crate::queue::broker::QueueSpec;

    fn transfer() -> Transfer {
        Transfer::new(
            DestinationAccount {
                bank_code: "341".to_string(),
                branch: "0001".to_string(),
                account: "12345-6".to_string(),
                name: "Treasury".to_string(),
                tax_id: "012.345.678-90".to_string(),
                account_type: AccountType::Checking,
            },
            900,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_queue_sender_publishes_decodable_envelope() {
        let broker = InMemoryBroker::new();
        broker
            .declare_queue(QueueSpec::durable("transfers"))
            .await
            .unwrap();
        let sender = QueueWorkSender::new(Arc::new(broker.clone()), "transfers");

        sender.send_transfer(&transfer()).await.unwrap();
        assert_eq!(broker.queue_depth("transfers"), 1);

        let mut channel = broker.open_channel("transfers").await.unwrap();
        let delivery = channel.next_delivery().await.unwrap();
        let item = Envelope::decode(&delivery.payload)
            .unwrap()
            .classify()
            .unwrap();
        assert_eq!(item, WorkItem::Transfer(transfer()));
        channel.ack(delivery.tag).await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_sender_publishes_one_message_per_invoice() {
        let broker = InMemoryBroker::new();
        broker
            .declare_queue(QueueSpec::durable("transfers"))
            .await
            .unwrap();
        let sender = QueueWorkSender::new(Arc::new(broker.clone()), "transfers");

        let person = Person::new("Ada", "123").unwrap();
        let invoices = vec![
            Invoice::new(100, person.clone(), None).unwrap(),
            Invoice::new(200, person, None).unwrap(),
        ];
        sender.send_invoices(&invoices).await.unwrap();
        assert_eq!(broker.queue_depth("transfers"), 2);
    }

    #[tokio::test]
    async fn test_direct_sender_calls_provider() {
        let provider = Arc::new(MockProvider::new());
        let sender = DirectWorkSender::new(provider.clone());

        sender.send_transfer(&transfer()).await.unwrap();
        assert_eq!(provider.transfers.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sender_variants_are_interchangeable() {
        let provider = Arc::new(MockProvider::new());
        let broker = InMemoryBroker::new();
        broker
            .declare_queue(QueueSpec::durable("transfers"))
            .await
            .unwrap();

        let senders: Vec<Arc<dyn WorkSender>> = vec![
            Arc::new(QueueWorkSender::new(Arc::new(broker.clone()), "transfers")),
            Arc::new(DirectWorkSender::new(provider.clone())),
        ];
        for sender in senders {
            sender.send_transfer(&transfer()).await.unwrap();
        }
        assert_eq!(broker.queue_depth("transfers"), 1);
        assert_eq!(provider.transfers.lock().unwrap().len(), 1);
    }
}
