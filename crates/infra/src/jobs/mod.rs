//! Retryable side-effect jobs.
//!
//! Checkout keeps the write path small: anything that can be retried
//! later (refund settlement, cart-conversion and discount-redemption
//! catch-ups, projection rebuilds) is enqueued as a [`Job`] instead of
//! failing the request. A [`JobExecutor`] polls the [`JobStore`], routes
//! each job to its handler by dotted kind name, and applies the retry
//! policy; jobs that exhaust their attempts land in the dead-letter book
//! for inspection and replay.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus, RetryPolicy,
};
