//! Message-broker port.
//!
//! The contract this system needs from a broker: durable queues, publish
//! with per-message headers, publish with a per-message TTL into a queue
//! whose expired messages dead-letter into a target queue, and
//! one-at-a-time consumption with manual acknowledgment. Unacked deliveries
//! return to the queue when a channel goes away.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub type Headers = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
    #[error("queue {0} has no dead-letter target")]
    NoDeadLetter(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Declaration parameters for one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    /// Queue that receives this queue's expired messages.
    pub dead_letter_to: Option<String>,
}

impl QueueSpec {
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            dead_letter_to: None,
        }
    }

    pub fn dead_lettering_into(mut self, target: impl Into<String>) -> Self {
        self.dead_letter_to = Some(target.into());
        self
    }
}

/// One message handed to a consumer. `tag` identifies it for acknowledgment.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: u64,
    pub payload: Vec<u8>,
    pub headers: Headers,
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Idempotent declare; redeclaring with the same spec is a no-op.
    async fn declare_queue(&self, spec: QueueSpec) -> Result<(), BrokerError>;

    /// Publish with persistent delivery.
    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        headers: Headers,
    ) -> Result<(), BrokerError>;

    /// Publish with a per-message TTL. On expiry the message dead-letters
    /// into the queue's configured target; publishing to a queue without a
    /// dead-letter target is an error.
    async fn publish_with_ttl(
        &self,
        queue: &str,
        payload: &[u8],
        headers: Headers,
        ttl: Duration,
    ) -> Result<(), BrokerError>;

    /// Open a consuming channel with prefetch 1: the channel holds at most
    /// one unacked delivery at a time.
    async fn open_channel(&self, queue: &str) -> Result<Box<dyn WorkChannel>, BrokerError>;
}

#[async_trait]
pub trait WorkChannel: Send {
    /// Wait for the next delivery. Errors if the previous delivery has not
    /// been acked yet.
    async fn next_delivery(&mut self) -> Result<Delivery, BrokerError>;

    /// Acknowledge the in-flight delivery by tag.
    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError>;
}
