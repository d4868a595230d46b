//! Retry consumer.
//!
//! Pulls work items off the durable queue one at a time and executes them
//! against the provider. Malformed or unrecognized messages are dropped
//! permanently; failed work is republished onto the wait queue with an
//! incremented attempt header and a jittered per-message TTL, so expiry
//! dead-letters it back onto the main queue. Work that has exhausted its
//! attempt budget is discarded as poison.
//!
//! Connection policy: bounded attempts with fixed backoff at startup (a
//! service that cannot reach its broker must not come up), indefinite
//! fixed-delay reconnects mid-run.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::provider::{ProviderClient, ProviderError};

use super::broker::{BrokerError, Delivery, MessageBroker, QueueSpec, WorkChannel};
use super::envelope::{attempt_from, with_attempt, Envelope, EnvelopeError, WorkItem};

/// A work item is attempted once plus this many retries before discard.
pub const MAX_ATTEMPTS: u32 = 3;

pub fn wait_queue_name(queue: &str) -> String {
    format!("{}_wait", queue)
}

/// Jittered backoff per attempt number. Ranges widen so retry storms from a
/// burst of failures spread out instead of synchronizing.
pub fn retry_delay(attempt: u32) -> Duration {
    let mut rng = rand::thread_rng();
    let ms = match attempt {
        0 | 1 => rng.gen_range(15_000..30_000),
        2 => rng.gen_range(120_000..180_000),
        _ => rng.gen_range(300_000..420_000),
    };
    Duration::from_millis(ms)
}

/// Declare the main queue and its wait queue, wired so expired wait-queue
/// messages dead-letter back onto the main queue.
pub async fn declare_topology(broker: &dyn MessageBroker, queue: &str) -> Result<(), BrokerError> {
    broker.declare_queue(QueueSpec::durable(queue)).await?;
    broker
        .declare_queue(QueueSpec::durable(wait_queue_name(queue)).dead_lettering_into(queue))
        .await
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("broker connection failed after {attempts} attempts: {last}")]
    StartupExhausted { attempts: u32, last: BrokerError },
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub queue: String,
    pub workers: usize,
    pub connect_max_attempts: u32,
    pub connect_retry: Duration,
    /// Pause before reconnecting after a mid-run channel failure.
    pub resume_delay: Duration,
}

impl ConsumerConfig {
    pub fn from_queue_config(config: &QueueConfig) -> Self {
        Self {
            queue: config.name.clone(),
            workers: config.workers.max(1),
            connect_max_attempts: config.connect_max_attempts,
            connect_retry: Duration::from_secs(config.connect_retry_secs),
            resume_delay: Duration::from_secs(5),
        }
    }
}

/// Where a consumed message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    Dropped(DropReason),
    Requeued { attempt: u32 },
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    UnknownType,
    InvalidPayload,
    RequeueFailed,
}

pub struct RetryConsumer {
    broker: Arc<dyn MessageBroker>,
    provider: Arc<dyn ProviderClient>,
    config: ConsumerConfig,
    wait_queue: String,
}

impl RetryConsumer {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        provider: Arc<dyn ProviderClient>,
        config: ConsumerConfig,
    ) -> Self {
        let wait_queue = wait_queue_name(&config.queue);
        Self {
            broker,
            provider,
            config,
            wait_queue,
        }
    }

    /// Establish the queue topology, retrying with fixed backoff up to the
    /// configured attempt budget. Exhaustion is a fatal startup error.
    pub async fn connect(&self) -> Result<(), ConsumerError> {
        let max = self.config.connect_max_attempts.max(1);
        let mut last = None;
        for attempt in 1..=max {
            match declare_topology(self.broker.as_ref(), &self.config.queue).await {
                Ok(()) => {
                    info!(queue = %self.config.queue, attempt, "Connected to broker");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        queue = %self.config.queue,
                        attempt,
                        max_attempts = max,
                        error = %e,
                        "Broker connection failed"
                    );
                    last = Some(e);
                    if attempt < max {
                        tokio::time::sleep(self.config.connect_retry).await;
                    }
                }
            }
        }
        Err(ConsumerError::StartupExhausted {
            attempts: max,
            last: last.unwrap_or_else(|| BrokerError::Unavailable("no attempt made".to_string())),
        })
    }

    /// Spawn the configured number of worker tasks.
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.workers)
            .map(|worker_id| {
                let consumer = self.clone();
                tokio::spawn(async move { consumer.run_worker(worker_id).await })
            })
            .collect()
    }

    /// Consume forever. Channel failures reconnect with a short fixed delay.
    pub async fn run_worker(&self, worker_id: usize) {
        loop {
            let mut channel = loop {
                match self.broker.open_channel(&self.config.queue).await {
                    Ok(channel) => break channel,
                    Err(e) => {
                        error!(worker_id, error = %e, "Cannot open channel, retrying");
                        tokio::time::sleep(self.config.resume_delay).await;
                    }
                }
            };
            info!(worker_id, queue = %self.config.queue, "Worker consuming");

            loop {
                match self.consume_once(channel.as_mut()).await {
                    Ok(outcome) => debug!(worker_id, ?outcome, "Delivery settled"),
                    Err(e) => {
                        error!(worker_id, error = %e, "Channel failed, reconnecting");
                        tokio::time::sleep(self.config.resume_delay).await;
                        break;
                    }
                }
            }
        }
    }

    /// Take one delivery, settle it, ack. Errors are channel-level only;
    /// processing failures never propagate.
    pub async fn consume_once(
        &self,
        channel: &mut dyn WorkChannel,
    ) -> Result<Outcome, BrokerError> {
        let delivery = channel.next_delivery().await?;
        let outcome = self.process(&delivery).await;
        channel.ack(delivery.tag).await?;
        Ok(outcome)
    }

    async fn process(&self, delivery: &Delivery) -> Outcome {
        let envelope = match Envelope::decode(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Discarding malformed message");
                return Outcome::Dropped(DropReason::Malformed);
            }
        };

        let item = match envelope.classify() {
            Ok(item) => item,
            Err(EnvelopeError::UnknownType(kind)) => {
                warn!(kind = %kind, "Discarding message with unrecognized type");
                return Outcome::Dropped(DropReason::UnknownType);
            }
            Err(e) => {
                warn!(kind = %envelope.kind, error = %e, "Discarding message with invalid payload");
                return Outcome::Dropped(DropReason::InvalidPayload);
            }
        };

        let attempt = attempt_from(&delivery.headers);
        debug!(kind = %envelope.kind, attempt, "Processing work item");

        match self.execute(&item).await {
            Ok(()) => {
                info!(kind = %envelope.kind, attempt, "Work item processed");
                Outcome::Processed
            }
            Err(e) => self.schedule_retry(delivery, &e).await,
        }
    }

    async fn execute(&self, item: &WorkItem) -> Result<(), ProviderError> {
        match item {
            WorkItem::Transfer(transfer) => self.provider.create_transfer(transfer).await,
            WorkItem::Invoice(invoice) => {
                self.provider
                    .create_invoices(std::slice::from_ref(invoice))
                    .await
            }
        }
    }

    async fn schedule_retry(&self, delivery: &Delivery, cause: &ProviderError) -> Outcome {
        let attempt = attempt_from(&delivery.headers) + 1;
        if attempt > MAX_ATTEMPTS {
            error!(
                attempts = attempt - 1,
                error = %cause,
                "Work item exhausted retry budget, discarding as poison"
            );
            return Outcome::Poisoned;
        }

        let delay = retry_delay(attempt);
        let headers = with_attempt(&delivery.headers, attempt);
        match self
            .broker
            .publish_with_ttl(&self.wait_queue, &delivery.payload, headers, delay)
            .await
        {
            Ok(()) => {
                warn!(
                    attempt,
                    max_attempts = MAX_ATTEMPTS,
                    delay_ms = delay.as_millis() as u64,
                    error = %cause,
                    "Work item failed, retry scheduled"
                );
                Outcome::Requeued { attempt }
            }
            Err(e) => {
                error!(error = %e, "Could not schedule retry, message dropped");
                Outcome::Dropped(DropReason::RequeueFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::provider::types::{AccountType, DestinationAccount, Transfer};
    use crate::queue::broker::Headers;
    use crate::queue::envelope::ATTEMPT_HEADER;
    use crate::queue::memory::InMemoryBroker;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

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

    fn config() -> ConsumerConfig {
        ConsumerConfig {
            queue: "transfers".to_string(),
            workers: 1,
            connect_max_attempts: 3,
            connect_retry: Duration::ZERO,
            resume_delay: Duration::ZERO,
        }
    }

    async fn setup() -> (InMemoryBroker, Arc<MockProvider>, RetryConsumer) {
        let broker = InMemoryBroker::new();
        let provider = Arc::new(MockProvider::new());
        let consumer = RetryConsumer::new(
            Arc::new(broker.clone()),
            provider.clone(),
            config(),
        );
        consumer.connect().await.unwrap();
        (broker, provider, consumer)
    }

    async fn publish_transfer(broker: &InMemoryBroker, headers: Headers) {
        let bytes = Envelope::transfer(&transfer()).unwrap().to_bytes().unwrap();
        broker.publish("transfers", &bytes, headers).await.unwrap();
    }

    #[test]
    fn test_retry_delay_ranges() {
        for _ in 0..50 {
            let first = retry_delay(1).as_millis();
            assert!((15_000..30_000).contains(&first), "attempt 1: {}", first);

            let second = retry_delay(2).as_millis();
            assert!((120_000..180_000).contains(&second), "attempt 2: {}", second);

            let third = retry_delay(3).as_millis();
            assert!((300_000..420_000).contains(&third), "attempt 3: {}", third);
        }
    }

    #[tokio::test]
    async fn test_success_path_acks_and_executes() {
        let (broker, provider, consumer) = setup().await;
        publish_transfer(&broker, Headers::new()).await;

        let mut channel = broker.open_channel("transfers").await.unwrap();
        let outcome = consumer.consume_once(channel.as_mut()).await.unwrap();

        assert_eq!(outcome, Outcome::Processed);
        assert_eq!(provider.transfers.lock().unwrap().len(), 1);
        assert_eq!(broker.queue_depth("transfers"), 0);
    }

    #[tokio::test]
    async fn test_malformed_message_dropped_permanently() {
        let (broker, provider, consumer) = setup().await;
        broker
            .publish("transfers", b"{{{{not json", Headers::new())
            .await
            .unwrap();

        let mut channel = broker.open_channel("transfers").await.unwrap();
        let outcome = consumer.consume_once(channel.as_mut()).await.unwrap();

        assert_eq!(outcome, Outcome::Dropped(DropReason::Malformed));
        assert_eq!(provider.transfer_calls(), 0);
        assert_eq!(broker.queue_depth("transfers"), 0);
    }

    #[tokio::test]
    async fn test_unknown_type_dropped_permanently() {
        let (broker, _provider, consumer) = setup().await;
        broker
            .publish(
                "transfers",
                br#"{"type": "chargeback", "data": {}}"#,
                Headers::new(),
            )
            .await
            .unwrap();

        let mut channel = broker.open_channel("transfers").await.unwrap();
        let outcome = consumer.consume_once(channel.as_mut()).await.unwrap();
        assert_eq!(outcome, Outcome::Dropped(DropReason::UnknownType));
    }

    #[tokio::test]
    async fn test_invalid_payload_dropped_permanently() {
        let (broker, _provider, consumer) = setup().await;
        broker
            .publish(
                "transfers",
                br#"{"type": "transfer", "data": {"amount": -1}}"#,
                Headers::new(),
            )
            .await
            .unwrap();

        let mut channel = broker.open_channel("transfers").await.unwrap();
        let outcome = consumer.consume_once(channel.as_mut()).await.unwrap();
        assert_eq!(outcome, Outcome::Dropped(DropReason::InvalidPayload));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_requeues_with_attempt_one_and_jittered_delay() {
        let (broker, provider, consumer) = setup().await;
        provider.set_fail_transfers(true);
        publish_transfer(&broker, Headers::new()).await;

        let mut channel = broker.open_channel("transfers").await.unwrap();
        let outcome = consumer.consume_once(channel.as_mut()).await.unwrap();
        assert_eq!(outcome, Outcome::Requeued { attempt: 1 });
        assert_eq!(broker.queue_depth("transfers"), 0);

        // Not yet due before the minimum of the jitter window.
        tokio::time::advance(Duration::from_millis(14_999)).await;
        tokio::task::yield_now().await;
        assert_eq!(broker.queue_depth("transfers"), 0);

        // Due at the latest at the window maximum.
        tokio::time::advance(Duration::from_millis(15_001)).await;
        tokio::task::yield_now().await;
        assert_eq!(broker.queue_depth("transfers"), 1);

        let delivery = channel.next_delivery().await.unwrap();
        assert_eq!(delivery.headers.get(ATTEMPT_HEADER).map(String::as_str), Some("1"));
        channel.ack(delivery.tag).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeued_body_is_preserved_verbatim() {
        let (broker, provider, consumer) = setup().await;
        provider.set_fail_transfers(true);
        let original = Envelope::transfer(&transfer()).unwrap().to_bytes().unwrap();
        broker
            .publish("transfers", &original, Headers::new())
            .await
            .unwrap();

        let mut channel = broker.open_channel("transfers").await.unwrap();
        consumer.consume_once(channel.as_mut()).await.unwrap();

        tokio::time::advance(Duration::from_millis(30_000)).await;
        tokio::task::yield_now().await;

        let delivery = channel.next_delivery().await.unwrap();
        assert_eq!(delivery.payload, original);
        channel.ack(delivery.tag).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poison_after_exhausting_attempts() {
        let (broker, provider, consumer) = setup().await;
        provider.set_fail_transfers(true);
        publish_transfer(&broker, Headers::new()).await;

        let mut channel = broker.open_channel("transfers").await.unwrap();
        for expected_attempt in 1..=MAX_ATTEMPTS {
            let outcome = consumer.consume_once(channel.as_mut()).await.unwrap();
            assert_eq!(
                outcome,
                Outcome::Requeued {
                    attempt: expected_attempt
                }
            );
            // Past the widest jitter window: the retry is back on the queue.
            tokio::time::advance(Duration::from_millis(420_000)).await;
            tokio::task::yield_now().await;
            assert_eq!(broker.queue_depth("transfers"), 1);
        }

        let outcome = consumer.consume_once(channel.as_mut()).await.unwrap();
        assert_eq!(outcome, Outcome::Poisoned);
        assert_eq!(provider.transfer_calls(), 4);

        // Never requeued again.
        tokio::time::advance(Duration::from_millis(600_000)).await;
        tokio::task::yield_now().await;
        assert_eq!(broker.queue_depth("transfers"), 0);
        assert_eq!(broker.queue_depth("transfers_wait"), 0);
    }

    // Broker stub whose declare fails a configurable number of times.
    struct FlakyBroker {
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl MessageBroker for FlakyBroker {
        async fn declare_queue(&self, _spec: QueueSpec) -> Result<(), BrokerError> {
            if self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BrokerError::Unavailable("connection refused".to_string()));
            }
            Ok(())
        }

        async fn publish(
            &self,
            _queue: &str,
            _payload: &[u8],
            _headers: Headers,
        ) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn publish_with_ttl(
            &self,
            _queue: &str,
            _payload: &[u8],
            _headers: Headers,
            _ttl: Duration,
        ) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn open_channel(&self, queue: &str) -> Result<Box<dyn WorkChannel>, BrokerError> {
            Err(BrokerError::UnknownQueue(queue.to_string()))
        }
    }

    #[tokio::test]
    async fn test_startup_connect_retries_then_succeeds() {
        let broker = Arc::new(FlakyBroker {
            failures_remaining: AtomicU32::new(2),
        });
        let consumer = RetryConsumer::new(broker, Arc::new(MockProvider::new()), config());
        consumer.connect().await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_connect_exhaustion_is_fatal() {
        let broker = Arc::new(FlakyBroker {
            failures_remaining: AtomicU32::new(u32::MAX),
        });
        let consumer = RetryConsumer::new(broker, Arc::new(MockProvider::new()), config());
        let result = consumer.connect().await;
        assert!(matches!(
            result,
            Err(ConsumerError::StartupExhausted { attempts: 3, .. })
        ));
    }
}
