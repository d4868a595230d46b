//! Invoice seeding job.
//!
//! Issues a random batch of invoices through the work-sender capability on a
//! schedule. A long-TTL job lock keeps redundant schedulers across instances
//! from overlapping. The person source is a collaborator behind a trait.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::config::InvoiceSeedConfig;
use crate::provider::types::{Invoice, ModelError, Person, AMOUNT_MAX};
use crate::queue::{SendError, WorkSender};
use crate::store::{DistributedLock, StoreError};

pub const JOB_LOCK_KEY: &str = "job:invoice_seed";
pub const JOB_LOCK_TTL: Duration = Duration::from_secs(600);

const AMOUNT_MIN: i64 = 100;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid batch bounds: n_min {n_min} > n_max {n_max}")]
    InvalidBounds { n_min: u32, n_max: u32 },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Another instance holds the job lock.
    Skipped,
    Published(usize),
}

/// Source of demo invoice recipients.
pub trait PersonSource: Send + Sync {
    fn random_person(&self) -> Person;
}

/// Built-in sample directory.
pub struct SamplePeople;

impl PersonSource for SamplePeople {
    fn random_person(&self) -> Person {
        const PEOPLE: &[(&str, &str)] = &[
            ("Ana Souza", "012.345.678-90"),
            ("Bruno Lima", "123.456.789-01"),
            ("Carla Mendes", "234.567.890-12"),
            ("Diego Alves", "345.678.901-23"),
            ("Elisa Rocha", "456.789.012-34"),
            ("Fabio Castro", "567.890.123-45"),
        ];
        let (name, tax_id) = PEOPLE[rand::thread_rng().gen_range(0..PEOPLE.len())];
        Person {
            name: name.to_string(),
            tax_id: tax_id.to_string(),
        }
    }
}

pub struct InvoiceSeedJob {
    lock: DistributedLock,
    sender: Arc<dyn WorkSender>,
    people: Arc<dyn PersonSource>,
    config: InvoiceSeedConfig,
}

impl InvoiceSeedJob {
    pub fn new(
        lock: DistributedLock,
        sender: Arc<dyn WorkSender>,
        people: Arc<dyn PersonSource>,
        config: InvoiceSeedConfig,
    ) -> Self {
        Self {
            lock,
            sender,
            people,
            config,
        }
    }

    pub async fn run_once(&self) -> Result<SeedOutcome, SeedError> {
        let (n_min, n_max) = (self.config.n_min, self.config.n_max);
        if n_min > n_max {
            return Err(SeedError::InvalidBounds { n_min, n_max });
        }

        if !self.lock.acquire(JOB_LOCK_KEY, JOB_LOCK_TTL).await? {
            info!("Invoice seed run skipped, lock held elsewhere");
            return Ok(SeedOutcome::Skipped);
        }

        let result = self.publish_batch(n_min, n_max).await;
        self.lock.release(JOB_LOCK_KEY).await?;

        let count = result?;
        info!(count, "Invoice batch published");
        Ok(SeedOutcome::Published(count))
    }

    async fn publish_batch(&self, n_min: u32, n_max: u32) -> Result<usize, SeedError> {
        let invoices = self.build_batch(n_min, n_max)?;
        if !invoices.is_empty() {
            self.sender.send_invoices(&invoices).await?;
        }
        Ok(invoices.len())
    }

    fn build_batch(&self, n_min: u32, n_max: u32) -> Result<Vec<Invoice>, SeedError> {
        let mut rng = rand::thread_rng();
        let n = rng.gen_range(n_min..=n_max) as usize;

        let mut invoices = Vec::with_capacity(n);
        for _ in 0..n {
            let amount = rng.gen_range(AMOUNT_MIN..AMOUNT_MAX);
            invoices.push(Invoice::new(amount, self.people.random_person(), None)?);
        }
        Ok(invoices)
    }

    /// Scheduled loop; runs forever.
    pub async fn run(&self, every: Duration) {
        info!(interval_secs = every.as_secs(), "Starting invoice seed schedule");
        loop {
            tokio::time::sleep(every).await;
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Invoice seed run failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::queue::DirectWorkSender;
    use crate::store::{InMemoryStore, KeyValueStore};

    fn config(n_min: u32, n_max: u32) -> InvoiceSeedConfig {
        InvoiceSeedConfig {
            enabled: true,
            interval_secs: 60,
            n_min,
            n_max,
        }
    }

    fn job_with(
        store: Arc<dyn KeyValueStore>,
        provider: Arc<MockProvider>,
        config: InvoiceSeedConfig,
    ) -> InvoiceSeedJob {
        InvoiceSeedJob::new(
            DistributedLock::new(store),
            Arc::new(DirectWorkSender::new(provider)),
            Arc::new(SamplePeople),
            config,
        )
    }

    #[tokio::test]
    async fn test_batch_size_within_bounds() {
        let provider = Arc::new(MockProvider::new());
        let job = job_with(Arc::new(InMemoryStore::new()), provider.clone(), config(3, 5));

        let outcome = job.run_once().await.unwrap();
        let SeedOutcome::Published(count) = outcome else {
            panic!("expected a published batch");
        };
        assert!((3..=5).contains(&count));
        assert_eq!(provider.invoices.lock().unwrap().len(), count);

        for invoice in provider.invoices.lock().unwrap().iter() {
            assert!((AMOUNT_MIN..AMOUNT_MAX).contains(&invoice.amount));
            assert!(!invoice.person.name.is_empty());
        }
    }

    #[tokio::test]
    async fn test_run_skipped_when_lock_held() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let provider = Arc::new(MockProvider::new());
        let job = job_with(store.clone(), provider.clone(), config(3, 5));

        let other = DistributedLock::new(store);
        assert!(other.acquire(JOB_LOCK_KEY, JOB_LOCK_TTL).await.unwrap());

        assert_eq!(job.run_once().await.unwrap(), SeedOutcome::Skipped);
        assert!(provider.invoices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_bounds_rejected() {
        let job = job_with(
            Arc::new(InMemoryStore::new()),
            Arc::new(MockProvider::new()),
            config(5, 3),
        );
        assert!(matches!(
            job.run_once().await,
            Err(SeedError::InvalidBounds { n_min: 5, n_max: 3 })
        ));
    }

    #[tokio::test]
    async fn test_lock_released_even_when_send_fails() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let provider = Arc::new(MockProvider::new());
        provider.set_fail_invoices(true);
        let job = job_with(store.clone(), provider, config(2, 2));

        assert!(matches!(job.run_once().await, Err(SeedError::Send(_))));

        let lock = DistributedLock::new(store);
        assert!(lock.acquire(JOB_LOCK_KEY, JOB_LOCK_TTL).await.unwrap());
    }
}
