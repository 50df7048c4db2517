//! Job queue storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Queue persistence seam used by the executor and by whoever enqueues
/// side-effect jobs.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Take the oldest job that is ready to run, marking it running.
    /// `None` when the queue has nothing ready.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// Move a job out of the queue into the dead-letter book.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Put a dead-lettered job back in the queue with a fresh attempt
    /// budget.
    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("lock poisoned".to_string())
}

/// Map-backed queue for dev and tests. FIFO by creation time.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.read().map_err(|_| poisoned())
    }

    fn queue_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.write().map_err(|_| poisoned())
    }

    fn book(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobStoreError> {
        self.dead_letters.read().map_err(|_| poisoned())
    }

    fn book_mut(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobStoreError> {
        self.dead_letters.write().map_err(|_| poisoned())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut queue = self.queue_mut()?;
        if queue.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        queue.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.queue()?.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut queue = self.queue_mut()?;
        if !queue.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        queue.insert(job.id, job.clone());
        Ok(())
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut queue = self.queue_mut()?;

        let next_id = queue
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. }) && j.is_ready()
            })
            .min_by_key(|j| j.created_at)
            .map(|j| j.id);

        let Some(id) = next_id else {
            return Ok(None);
        };
        let Some(job) = queue.get_mut(&id) else {
            return Ok(None);
        };
        job.mark_running();
        Ok(Some(job.clone()))
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut queue = self.queue_mut()?;
        let mut book = self.book_mut()?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        queue.remove(&job.id);
        book.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let book = self.book()?;
        let mut entries: Vec<_> = book.values().cloned().collect();
        entries.sort_by_key(|e| e.dead_lettered_at);
        entries.truncate(limit);
        Ok(entries)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut queue = self.queue_mut()?;
        let mut book = self.book_mut()?;

        let entry = book.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();
        job.history.clear();

        queue.insert(job.id, job.clone());
        Ok(job)
    }
}

impl JobStore for Arc<InMemoryJobStore> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(limit)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::JobKind;
    use super::*;

    #[test]
    fn claiming_marks_running_and_counts_the_attempt() {
        let store = InMemoryJobStore::new();
        let job_id = store
            .enqueue(Job::new(JobKind::custom("test"), serde_json::json!({})))
            .unwrap();

        let claimed = store.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        assert!(matches!(claimed.status, JobStatus::Running));
        assert_eq!(claimed.attempt, 1);

        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn oldest_ready_job_is_claimed_first() {
        let store = InMemoryJobStore::new();
        let first = store
            .enqueue(Job::new(JobKind::custom("a"), serde_json::json!({})))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store
            .enqueue(Job::new(JobKind::custom("b"), serde_json::json!({})))
            .unwrap();

        assert_eq!(store.claim_next().unwrap().unwrap().id, first);
    }

    #[test]
    fn duplicate_enqueue_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = Job::new(JobKind::custom("test"), serde_json::json!({}));
        store.enqueue(job.clone()).unwrap();
        assert!(matches!(
            store.enqueue(job),
            Err(JobStoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn dead_lettered_jobs_leave_the_queue_and_can_be_retried() {
        let store = InMemoryJobStore::new();
        let job = Job::new(JobKind::custom("test"), serde_json::json!({}));
        let job_id = job.id;
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        claimed.mark_failed("test error".to_string(), Utc::now());
        store
            .dead_letter(claimed, "max retries exceeded".to_string())
            .unwrap();

        assert!(store.get(job_id).unwrap().is_none());
        let entries = store.list_dead_letters(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].job.id, job_id);

        let retried = store.retry_dead_letter(job_id).unwrap();
        assert!(matches!(retried.status, JobStatus::Pending));
        assert_eq!(retried.attempt, 0);
        assert!(store.list_dead_letters(10).unwrap().is_empty());
    }
}
