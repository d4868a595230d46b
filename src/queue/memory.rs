//! In-process broker adapter.
//!
//! Implements the full port contract (durable queues, header-carrying
//! publishes, TTL dead-lettering into a target queue, prefetch-1 channels
//! with manual ack and redelivery of unacked messages) over tokio
//! primitives. This is the adapter the single-process deployment and the
//! test suite run on; the port is the seam for an external broker.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::broker::{BrokerError, Delivery, Headers, MessageBroker, QueueSpec, WorkChannel};

#[derive(Debug, Clone)]
struct Stored {
    tag: u64,
    payload: Vec<u8>,
    headers: Headers,
}

struct QueueState {
    spec: QueueSpec,
    ready: VecDeque<Stored>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct BrokerInner {
    queues: Mutex<HashMap<String, QueueState>>,
    next_tag: AtomicU64,
}

impl BrokerInner {
    fn enqueue(&self, queue: &str, payload: Vec<u8>, headers: Headers) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock().expect("broker lock poisoned");
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
        state.ready.push_back(Stored {
            tag: self.next_tag.fetch_add(1, Ordering::Relaxed),
            payload,
            headers,
        });
        state.notify.notify_one();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready (undelivered, unexpired) messages on a queue. Test observability.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.inner
            .queues
            .lock()
            .expect("broker lock poisoned")
            .get(queue)
            .map(|state| state.ready.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_queue(&self, spec: QueueSpec) -> Result<(), BrokerError> {
        let mut queues = self.inner.queues.lock().expect("broker lock poisoned");
        if let Some(existing) = queues.get(&spec.name) {
            if existing.spec != spec {
                return Err(BrokerError::Protocol(format!(
                    "queue {} already declared with different parameters",
                    spec.name
                )));
            }
            return Ok(());
        }
        debug!(queue = %spec.name, dead_letter_to = ?spec.dead_letter_to, "Declared queue");
        queues.insert(
            spec.name.clone(),
            QueueState {
                spec,
                ready: VecDeque::new(),
                notify: Arc::new(Notify::new()),
            },
        );
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        headers: Headers,
    ) -> Result<(), BrokerError> {
        self.inner.enqueue(queue, payload.to_vec(), headers)
    }

    async fn publish_with_ttl(
        &self,
        queue: &str,
        payload: &[u8],
        headers: Headers,
        ttl: Duration,
    ) -> Result<(), BrokerError> {
        let target = {
            let queues = self.inner.queues.lock().expect("broker lock poisoned");
            let state = queues
                .get(queue)
                .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
            state
                .spec
                .dead_letter_to
                .clone()
                .ok_or_else(|| BrokerError::NoDeadLetter(queue.to_string()))?
        };

        // The wait queue has no consumers; expiry is the only exit. Model the
        // TTL as a timer that dead-letters straight into the target.
        let inner = self.inner.clone();
        let payload = payload.to_vec();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = inner.enqueue(&target, payload, headers) {
                warn!(target_queue = %target, error = %e, "Dead-letter target gone, message dropped");
            }
        });
        Ok(())
    }

    async fn open_channel(&self, queue: &str) -> Result<Box<dyn WorkChannel>, BrokerError> {
        {
            let queues = self.inner.queues.lock().expect("broker lock poisoned");
            if !queues.contains_key(queue) {
                return Err(BrokerError::UnknownQueue(queue.to_string()));
            }
        }
        Ok(Box::new(MemoryChannel {
            inner: self.inner.clone(),
            queue: queue.to_string(),
            in_flight: None,
        }))
    }
}

struct MemoryChannel {
    inner: Arc<BrokerInner>,
    queue: String,
    in_flight: Option<Stored>,
}

#[async_trait]
impl WorkChannel for MemoryChannel {
    async fn next_delivery(&mut self) -> Result<Delivery, BrokerError> {
        if self.in_flight.is_some() {
            return Err(BrokerError::Protocol(
                "previous delivery not yet acked".to_string(),
            ));
        }

        loop {
            let notify = {
                let mut queues = self.inner.queues.lock().expect("broker lock poisoned");
                let state = queues
                    .get_mut(&self.queue)
                    .ok_or_else(|| BrokerError::UnknownQueue(self.queue.clone()))?;
                if let Some(msg) = state.ready.pop_front() {
                    let delivery = Delivery {
                        tag: msg.tag,
                        payload: msg.payload.clone(),
                        headers: msg.headers.clone(),
                    };
                    self.in_flight = Some(msg);
                    return Ok(delivery);
                }
                state.notify.clone()
            };
            notify.notified().await;
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), BrokerError> {
        match self.in_flight.take() {
            Some(msg) if msg.tag == tag => Ok(()),
            Some(msg) => {
                // Wrong tag: put it back in flight, refuse the ack.
                let held = msg.tag;
                self.in_flight = Some(msg);
                Err(BrokerError::Protocol(format!(
                    "ack tag {} does not match in-flight delivery {}",
                    tag, held
                )))
            }
            None => Err(BrokerError::Protocol(format!(
                "ack tag {} with no delivery in flight",
                tag
            ))),
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        // A channel dying with an unacked delivery redelivers it, front of
        // the queue, like a broker recovering unacked messages.
        if let Some(msg) = self.in_flight.take() {
            if let Ok(mut queues) = self.inner.queues.lock() {
                if let Some(state) = queues.get_mut(&self.queue) {
                    state.ready.push_front(msg);
                    state.notify.notify_one();
                }
            }
        }
    }
}
