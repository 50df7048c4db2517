//! Background worker that drains the job store.

use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, JobStatus};

pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Thread name, shows up in logs.
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Counters kept by the worker thread, readable through the handle.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Owned handle to a running worker. Dropping it leaves the worker
/// running; call [`JobExecutorHandle::shutdown`] to stop and join it.
#[derive(Debug)]
pub struct JobExecutorHandle {
    stop: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    pub fn shutdown(mut self) {
        let _ = self.stop.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Routes claimed jobs to registered handlers and applies the retry
/// policy to their outcomes.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under an exact routing key, a `"prefix.*"`
    /// pattern, or the catch-all `"*"`.
    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind_pattern.into(), Box::new(handler));
    }

    /// Most specific registration wins: exact key, then prefix pattern,
    /// then catch-all.
    fn handler_for(&self, kind: &JobKind) -> Option<&JobHandler> {
        let key = kind.type_name();
        if let Some(handler) = self.handlers.get(key) {
            return Some(handler);
        }
        let prefix_match = self.handlers.iter().find(|(pattern, _)| {
            pattern
                .strip_suffix(".*")
                .is_some_and(|prefix| key.starts_with(prefix))
        });
        if let Some((_, handler)) = prefix_match {
            return Some(handler);
        }
        self.handlers.get("*")
    }

    /// Run one already-claimed job through its handler. Tests and
    /// synchronous callers use this instead of the worker thread.
    pub fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        if self.handler_for(&job.kind).is_none() {
            return Err(format!("no handler for job kind: {:?}", job.kind));
        }
        self.run_job(job)
    }

    /// Move the executor onto its own polling thread.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle
    where
        S: Send,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let thread_stats = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || self.run_loop(config, stop_rx, thread_stats))
            .expect("failed to spawn job executor thread");

        JobExecutorHandle {
            stop: stop_tx,
            join: Some(join),
            stats,
        }
    }

    fn run_loop(
        &self,
        config: JobExecutorConfig,
        stop_rx: mpsc::Receiver<()>,
        stats: Arc<Mutex<ExecutorStats>>,
    ) {
        info!(executor = %config.name, "job executor started");
        let started_at = Instant::now();

        while stop_rx.try_recv().is_err() {
            if let Ok(mut s) = stats.lock() {
                s.uptime_secs = started_at.elapsed().as_secs();
            }

            let claimed = match self.store.claim_next() {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(executor = %config.name, error = ?e, "failed to claim job");
                    thread::sleep(config.poll_interval);
                    continue;
                }
            };
            let Some(mut job) = claimed else {
                thread::sleep(config.poll_interval);
                continue;
            };

            debug!(executor = %config.name, job_id = %job.id, kind = ?job.kind, "claimed job");
            let outcome = self.run_job(&mut job);

            if let Ok(mut s) = stats.lock() {
                s.jobs_processed += 1;
                match &outcome {
                    Ok(()) => s.jobs_succeeded += 1,
                    Err(_) => {
                        s.jobs_failed += 1;
                        if matches!(job.status, JobStatus::DeadLettered { .. }) {
                            s.jobs_dead_lettered += 1;
                        }
                    }
                }
            }

            if let Err(e) = outcome {
                debug!(executor = %config.name, job_id = %job.id, error = %e, status = ?job.status, "job failed");
            }
        }

        info!(executor = %config.name, "job executor stopped");
    }

    fn run_job(&self, job: &mut Job) -> Result<(), String> {
        let Some(handler) = self.handler_for(&job.kind) else {
            let error = format!("no handler for job kind: {:?}", job.kind);
            warn!(job_id = %job.id, error = %error, "unroutable job");
            job.mark_failed(error.clone(), Utc::now());
            self.store.update(job).ok();
            return Err(error);
        };

        let started = Utc::now();

        // claim_next already moved the job to Running and counted the
        // attempt; only do it here for jobs handed in directly.
        if !matches!(job.status, JobStatus::Running) {
            job.mark_running();
        }

        match handler(job) {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job).map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, "job completed");
                Ok(())
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), started);
                self.store.update(job).map_err(|e| e.to_string())?;
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, error = %error, "job dead-lettered");
                    self.store.dead_letter(job.clone(), error.clone()).ok();
                }
                Err(error)
            }
            JobResult::RetryNow => {
                job.mark_failed("retry requested".to_string(), started);
                job.scheduled_at = None;
                self.store.update(job).map_err(|e| e.to_string())?;
                Err("retry requested".to_string())
            }
            JobResult::RetryAfter(delay) => {
                job.mark_failed("retry after delay".to_string(), started);
                job.scheduled_at =
                    Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
                self.store.update(job).map_err(|e| e.to_string())?;
                Err("retry after delay".to_string())
            }
        }
    }
}
