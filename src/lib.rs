//! fundbridge - Signed payment-event intake and reliable transfer pipeline.
//!
//! Ingests signed event notifications from a payment provider over HTTP,
//! verifies authenticity and freshness, and converts validated events into
//! fund transfers delivered through a durable work queue with bounded,
//! backoff-scheduled retries.
//!
//! # Modules
//!
//! - [`provider`] - Provider wire models, key cache, signature verification, REST client
//! - [`store`] - Expiring key/value port, distributed lock, replay guard
//! - [`queue`] - Broker port, envelopes, work senders, retry consumer
//! - [`dispatch`] - Credited invoice -> transfer instruction
//! - [`intake`] - Webhook intake orchestration
//! - [`gateway`] - Axum HTTP gateway
//! - [`jobs`] - Reconciliation and invoice-seeding schedules
//! - [`bootstrap`] - Leader-elected webhook registration

pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod intake;
pub mod jobs;
pub mod logging;
pub mod provider;
pub mod queue;
pub mod store;

// Convenient re-exports at crate root
pub use dispatch::{DispatchError, TransferDispatcher};
pub use intake::{IntakeError, IntakeOutcome, WebhookIntake};
pub use provider::{
    HttpProviderClient, KeyCache, ProviderClient, ProviderError, SignatureVerifier,
};
pub use queue::{
    ConsumerConfig, InMemoryBroker, MessageBroker, QueueWorkSender, RetryConsumer, WorkSender,
};
pub use store::{Admission, DistributedLock, InMemoryStore, KeyValueStore, ReplayGuard};
