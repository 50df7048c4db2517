//! Job records, routing kinds and retry policies for the background executor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reweave_core::AggregateId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What a job does. The executor routes on [`JobKind::type_name`], so every
/// variant maps to a stable dotted key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Finish a refund that was accepted but not yet settled with the gateway.
    RefundCompletion { order_id: AggregateId },
    /// Mark a cart converted when the synchronous attempt during checkout failed.
    CartConversion {
        cart_id: AggregateId,
        order_id: AggregateId,
    },
    /// Record a discount redemption that could not be written during checkout.
    DiscountRedemption {
        code_id: AggregateId,
        order_id: AggregateId,
    },
    /// Replay the event log into a projection.
    ProjectionRebuild { projection_name: String },
    /// Escape hatch for kinds the core set does not cover.
    Custom { kind: String },
}

impl JobKind {
    pub fn refund_completion(order_id: AggregateId) -> Self {
        Self::RefundCompletion { order_id }
    }

    pub fn cart_conversion(cart_id: AggregateId, order_id: AggregateId) -> Self {
        Self::CartConversion { cart_id, order_id }
    }

    pub fn discount_redemption(code_id: AggregateId, order_id: AggregateId) -> Self {
        Self::DiscountRedemption { code_id, order_id }
    }

    pub fn projection_rebuild(projection_name: impl Into<String>) -> Self {
        Self::ProjectionRebuild {
            projection_name: projection_name.into(),
        }
    }

    pub fn custom(kind: impl Into<String>) -> Self {
        Self::Custom { kind: kind.into() }
    }

    /// Routing key, matched against exact, `prefix.*` and `*` registrations.
    pub fn type_name(&self) -> &str {
        match self {
            JobKind::RefundCompletion { .. } => "payments.refund_completion",
            JobKind::CartConversion { .. } => "orders.cart_conversion",
            JobKind::DiscountRedemption { .. } => "promotions.discount_redemption",
            JobKind::ProjectionRebuild { .. } => "projections.rebuild",
            JobKind::Custom { kind } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Attempt failed but the retry budget is not exhausted.
    Failed { error: String, attempt: u32 },
    /// Out of retries. The store keeps these in a separate dead-letter book.
    DeadLettered { error: String, attempts: u32 },
}

/// How a handler reports back to the executor.
#[derive(Debug)]
pub enum JobResult {
    Success,
    Failure(String),
    /// Transient failure, requeue without a backoff delay.
    RetryNow,
    RetryAfter(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time.
    Fixed,
    /// Doubles per attempt, capped at `max_delay`.
    Exponential,
    /// Grows by `base_delay` per attempt, capped at `max_delay`.
    Linear,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Controls how failed jobs are rescheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// How many attempts are allowed before dead-lettering.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Fraction of the delay (0.0..=1.0) to spread retries apart.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retrying the given attempt, 1-indexed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.base_delay.as_millis() as f64;
        let cap = self.max_delay.as_millis() as f64;
        let raw = match self.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential => base * 2_f64.powi(attempt as i32 - 1),
            BackoffStrategy::Linear => base * f64::from(attempt),
        };
        let delay = raw.min(cap);

        // Deterministic spread derived from the attempt number. Good enough to
        // keep a burst of failed jobs from retrying in lockstep.
        let spread = ((f64::from(attempt) * 17.0) % 100.0) / 50.0 - 1.0;
        let jittered = delay + delay * self.jitter * spread;

        Duration::from_millis(jittered.max(0.0) as u64)
    }
}

/// One finished attempt, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl JobAttemptRecord {
    fn finished(attempt: u32, started_at: DateTime<Utc>, error: Option<String>) -> Self {
        let finished_at = Utc::now();
        Self {
            attempt,
            started_at,
            finished_at,
            success: error.is_none(),
            error,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        }
    }
}

/// A unit of deferred work with its full attempt history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far. 0 until the first claim.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When set, the job is held back until this instant.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

impl Job {
    pub fn new(kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.scheduled_at.is_none_or(|at| Utc::now() >= at)
    }

    pub fn mark_running(&mut self) {
        self.attempt += 1;
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        self.history
            .push(JobAttemptRecord::finished(self.attempt, started_at, None));
        self.status = JobStatus::Completed;
        self.updated_at = Utc::now();
    }

    /// Record the failure and either schedule a backoff retry or dead-letter
    /// the job once the policy runs out of attempts.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        self.history.push(JobAttemptRecord::finished(
            self.attempt,
            started_at,
            Some(error.clone()),
        ));
        self.updated_at = Utc::now();

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at =
                Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }
}

/// A job that ran out of retries, parked for operator inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            strategy,
            jitter: 0.0,
        }
    }

    #[test]
    fn exponential_backoff_doubles_per_attempt() {
        let policy = policy(BackoffStrategy::Exponential);
        let delays: Vec<_> = (1..=4).map(|a| policy.delay_for_attempt(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
            ]
        );
    }

    #[test]
    fn fixed_and_linear_backoff_shapes() {
        let fixed = RetryPolicy::fixed(3, Duration::from_millis(500));
        assert_eq!(fixed.delay_for_attempt(1), fixed.delay_for_attempt(3));

        let linear = policy(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn backoff_respects_the_cap() {
        let policy = policy(BackoffStrategy::Exponential);
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(10));
    }

    #[test]
    fn retry_budget_is_exclusive_of_max() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn every_kind_routes_to_a_dotted_key() {
        let id = AggregateId::new();
        assert_eq!(
            JobKind::refund_completion(id).type_name(),
            "payments.refund_completion"
        );
        assert_eq!(
            JobKind::cart_conversion(id, id).type_name(),
            "orders.cart_conversion"
        );
        assert_eq!(
            JobKind::projection_rebuild("orders").type_name(),
            "projections.rebuild"
        );
        assert_eq!(JobKind::custom("exports.csv").type_name(), "exports.csv");
    }

    #[test]
    fn a_completed_job_keeps_its_attempt_history() {
        let mut job = Job::new(JobKind::custom("noop"), serde_json::json!({}));
        assert_eq!(job.attempt, 0);

        job.mark_running();
        job.mark_completed(Utc::now());

        assert!(matches!(job.status, JobStatus::Completed));
        assert_eq!(job.history.len(), 1);
        assert!(job.history[0].success);
        assert_eq!(job.history[0].attempt, 1);
    }

    #[test]
    fn failures_back_off_then_dead_letter() {
        let mut job = Job::new(JobKind::custom("flaky"), serde_json::json!({}))
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                ..Default::default()
            });

        job.mark_running();
        job.mark_failed("first".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::Failed { attempt: 1, .. }));
        assert!(job.scheduled_at.is_some());

        job.mark_running();
        job.mark_failed("second".to_string(), Utc::now());
        assert!(matches!(
            job.status,
            JobStatus::DeadLettered { attempts: 2, .. }
        ));
        assert_eq!(job.history.len(), 2);
    }

    #[test]
    fn a_scheduled_job_is_not_ready_early() {
        let mut job = Job::new(JobKind::custom("later"), serde_json::json!({}));
        assert!(job.is_ready());

        job.scheduled_at = Some(Utc::now() + chrono::Duration::hours(1));
        assert!(!job.is_ready());
    }
}
