//! Scheduled background jobs.

pub mod invoice_seed;
pub mod reconcile;

pub use invoice_seed::{
    InvoiceSeedJob, PersonSource, SamplePeople, SeedError, SeedOutcome, JOB_LOCK_KEY, JOB_LOCK_TTL,
};
pub use reconcile::{ReconcileSummary, ReconciliationJob, EVENT_LOCK_TTL};
