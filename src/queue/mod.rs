//! Reliable work queue.
//!
//! Publishing side: the [`WorkSender`] capability, queue-backed or direct.
//! Consuming side: the [`RetryConsumer`], which executes work with bounded,
//! backoff-scheduled retries over a wait queue that dead-letters back into
//! the main queue.

pub mod broker;
pub mod consumer;
pub mod envelope;
pub mod memory;
pub mod publisher;

pub use broker::{BrokerError, Delivery, Headers, MessageBroker, QueueSpec, WorkChannel};
pub use consumer::{
    declare_topology, retry_delay, wait_queue_name, ConsumerConfig, ConsumerError, DropReason,
    Outcome, RetryConsumer, MAX_ATTEMPTS,
};
pub use envelope::{attempt_from, with_attempt, Envelope, EnvelopeError, WorkItem, ATTEMPT_HEADER};
pub use memory::InMemoryBroker;
pub use publisher::{DirectWorkSender, QueueWorkSender, SendError, WorkSender};
