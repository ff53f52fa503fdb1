//! The durable queue substrate
//!
//! Scheduling, redelivery and exactly-one-owner dequeue are owned by the
//! substrate. [`InMemoryJobQueue`] implements the same contract for
//! development and testing. Not suitable for production use.

use crate::config::{RetryConfig, WorkerConfig};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use evote_saga_types::{JobId, JobKind, JobRecord, JobResult, JobState, Result, SagaError};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Job substrate consumed by the engine.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job and return its id.
    async fn enqueue(&self, kind: JobKind, name: &str, data: serde_json::Value) -> Result<JobId>;

    /// Hand the next deliverable job to exactly one caller.
    ///
    /// The returned job is `Active` and its `attempts_made` counts this delivery.
    async fn dequeue(&self) -> Result<Option<JobRecord>>;

    /// Durably replace the data of a job.
    async fn persist(&self, job_id: &JobId, data: serde_json::Value) -> Result<()>;

    /// Current record of a job, if known.
    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>>;

    /// Mark an active job completed with its result.
    async fn complete(&self, job_id: &JobId, result: JobResult) -> Result<()>;

    /// Schedule redelivery of an active job.
    ///
    /// Returns `false` when attempts are exhausted and the job was failed instead.
    async fn retry(&self, job_id: &JobId, reason: &str) -> Result<bool>;

    /// Mark a job failed without further redelivery.
    async fn fail(&self, job_id: &JobId, reason: &str) -> Result<()>;
}

/// In-memory job substrate.
pub struct InMemoryJobQueue {
    /// All jobs indexed by ID.
    jobs: Arc<DashMap<JobId, JobRecord>>,

    /// Delivery order of waiting and delayed jobs.
    pending: Mutex<VecDeque<JobId>>,

    retry: RetryConfig,
    max_completed: usize,
    max_failed: usize,
}

impl InMemoryJobQueue {
    pub fn new(retry: RetryConfig, worker: &WorkerConfig) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            retry,
            max_completed: worker.max_completed_jobs,
            max_failed: worker.max_failed_jobs,
        }
    }

    /// Queue with immediate redelivery and default retention.
    pub fn with_attempts(attempts: u32) -> Self {
        Self::new(RetryConfig::immediate(attempts), &WorkerConfig::default())
    }

    /// Total number of jobs held, finished ones included.
    pub fn total_count(&self) -> usize {
        self.jobs.len()
    }

    /// Number of jobs in a given state.
    pub fn count_in_state(&self, state: JobState) -> usize {
        self.jobs.iter().filter(|j| j.state == state).count()
    }

    fn not_found(job_id: &JobId) -> SagaError {
        SagaError::JobNotFound(job_id.clone())
    }

    /// Evict the oldest finished jobs in `state` beyond `keep`.
    fn evict_finished(&self, state: JobState, keep: usize) {
        let mut finished: Vec<(chrono::DateTime<Utc>, JobId)> = self
            .jobs
            .iter()
            .filter(|j| j.state == state)
            .map(|j| (j.finished_at.unwrap_or(j.updated_at), j.id.clone()))
            .collect();

        if finished.len() <= keep {
            return;
        }

        finished.sort_by(|a, b| a.0.cmp(&b.0));
        let excess = finished.len() - keep;
        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
    }

    fn finish(&self, job_id: &JobId, state: JobState, update: impl FnOnce(&mut JobRecord)) -> Result<()> {
        {
            let mut job = self.jobs.get_mut(job_id).ok_or_else(|| Self::not_found(job_id))?;
            let now = Utc::now();
            job.state = state;
            job.updated_at = now;
            job.finished_at = Some(now);
            update(&mut *job);
        }
        match state {
            JobState::Completed => self.evict_finished(state, self.max_completed),
            JobState::Failed => self.evict_finished(state, self.max_failed),
            _ => {}
        }
        Ok(())
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(RetryConfig::default(), &WorkerConfig::default())
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, kind: JobKind, name: &str, data: serde_json::Value) -> Result<JobId> {
        let record = JobRecord::new(kind, name, data);
        let id = record.id.clone();
        self.jobs.insert(id.clone(), record);
        self.pending.lock().await.push_back(id.clone());

        tracing::debug!(job_id = %id, %kind, name, "Job enqueued");
        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<JobRecord>> {
        let mut pending = self.pending.lock().await;
        let now = Utc::now();

        let position = pending.iter().position(|id| {
            self.jobs
                .get(id)
                .map(|j| match j.state {
                    JobState::Waiting => true,
                    JobState::Delayed => j.available_at <= now,
                    _ => false,
                })
                .unwrap_or(false)
        });

        let Some(id) = position.and_then(|p| pending.remove(p)) else {
            return Ok(None);
        };

        let mut job = self.jobs.get_mut(&id).ok_or_else(|| Self::not_found(&id))?;
        job.state = JobState::Active;
        job.attempts_made += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn persist(&self, job_id: &JobId, data: serde_json::Value) -> Result<()> {
        let mut job = self.jobs.get_mut(job_id).ok_or_else(|| Self::not_found(job_id))?;
        job.data = data;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>> {
        Ok(self.jobs.get(job_id).map(|j| j.clone()))
    }

    async fn complete(&self, job_id: &JobId, result: JobResult) -> Result<()> {
        self.finish(job_id, JobState::Completed, |job| job.result = Some(result))?;
        tracing::debug!(job_id = %job_id, "Job completed");
        Ok(())
    }

    async fn retry(&self, job_id: &JobId, reason: &str) -> Result<bool> {
        let attempts_made = self
            .jobs
            .get(job_id)
            .map(|j| j.attempts_made)
            .ok_or_else(|| Self::not_found(job_id))?;

        if attempts_made >= self.retry.attempts {
            self.finish(job_id, JobState::Failed, |job| {
                job.failed_reason = Some(reason.to_string())
            })?;
            tracing::warn!(job_id = %job_id, attempts_made, reason, "Job attempts exhausted");
            return Ok(false);
        }

        let delay = self.retry.delay_for(attempts_made);
        {
            let mut job = self.jobs.get_mut(job_id).ok_or_else(|| Self::not_found(job_id))?;
            let now = Utc::now();
            job.failed_reason = Some(reason.to_string());
            job.updated_at = now;
            if delay.is_zero() {
                job.state = JobState::Waiting;
                job.available_at = now;
            } else {
                job.state = JobState::Delayed;
                job.available_at = now
                    + chrono::Duration::from_std(delay)
                        .map_err(|e| SagaError::Config(format!("backoff delay: {e}")))?;
            }
        }
        self.pending.lock().await.push_back(job_id.clone());

        tracing::debug!(job_id = %job_id, attempts_made, ?delay, "Job scheduled for redelivery");
        Ok(true)
    }

    async fn fail(&self, job_id: &JobId, reason: &str) -> Result<()> {
        self.finish(job_id, JobState::Failed, |job| {
            job.failed_reason = Some(reason.to_string())
        })?;
        tracing::warn!(job_id = %job_id, reason, "Job failed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_enqueue_dequeue_marks_active() {
        let queue = InMemoryJobQueue::with_attempts(3);
        let id = queue.enqueue(JobKind::Submission, "submit X transaction", json!({"a": 1})).await.unwrap();

        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.attempts_made, 1);

        // Single owner: an active job is not delivered twice
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo() {
        let queue = InMemoryJobQueue::with_attempts(3);
        let first = queue.enqueue(JobKind::Workflow, "a", json!(1)).await.unwrap();
        let second = queue.enqueue(JobKind::Workflow, "b", json!(2)).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, first);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, second);
    }

    #[tokio::test]
    async fn test_persist_replaces_data() {
        let queue = InMemoryJobQueue::with_attempts(3);
        let id = queue.enqueue(JobKind::Workflow, "w", json!({"step": 1})).await.unwrap();
        queue.persist(&id, json!({"step": 2})).await.unwrap();

        let job = queue.get(&id).await.unwrap().unwrap();
        assert_eq!(job.data, json!({"step": 2}));
    }

    #[tokio::test]
    async fn test_persist_unknown_job() {
        let queue = InMemoryJobQueue::with_attempts(3);
        let err = queue.persist(&JobId::new("missing"), json!(null)).await.unwrap_err();
        assert!(matches!(err, SagaError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_retry_until_exhausted() {
        let queue = InMemoryJobQueue::with_attempts(2);
        let id = queue.enqueue(JobKind::Submission, "s", json!({})).await.unwrap();

        queue.dequeue().await.unwrap().unwrap();
        assert!(queue.retry(&id, "timeout").await.unwrap());

        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 2);
        assert!(!queue.retry(&id, "timeout again").await.unwrap());

        let job = queue.get(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failed_reason.as_deref(), Some("timeout again"));
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delayed_retry_is_not_delivered_early() {
        let retry = RetryConfig {
            attempts: 5,
            backoff: BackoffKind::Fixed,
            delay_ms: 60_000,
        };
        let queue = InMemoryJobQueue::new(retry, &WorkerConfig::default());
        let id = queue.enqueue(JobKind::Submission, "s", json!({})).await.unwrap();

        queue.dequeue().await.unwrap().unwrap();
        assert!(queue.retry(&id, "transient").await.unwrap());
        assert_eq!(queue.get(&id).await.unwrap().unwrap().state, JobState::Delayed);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_and_retention() {
        let worker = WorkerConfig {
            max_completed_jobs: 1,
            ..WorkerConfig::default()
        };
        let queue = InMemoryJobQueue::new(RetryConfig::immediate(1), &worker);

        let first = queue.enqueue(JobKind::Submission, "a", json!({})).await.unwrap();
        let second = queue.enqueue(JobKind::Submission, "b", json!({})).await.unwrap();
        for id in [&first, &second] {
            queue.dequeue().await.unwrap().unwrap();
            queue.complete(id, JobResult::payload(b"ok".to_vec())).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        assert!(queue.get(&first).await.unwrap().is_none());
        let kept = queue.get(&second).await.unwrap().unwrap();
        assert_eq!(kept.state, JobState::Completed);
        assert_eq!(kept.result, Some(JobResult::payload(b"ok".to_vec())));
        assert_eq!(queue.total_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_is_final() {
        let queue = InMemoryJobQueue::with_attempts(5);
        let id = queue.enqueue(JobKind::Workflow, "w", json!({})).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();
        queue.fail(&id, "invalid step").await.unwrap();

        assert_eq!(queue.count_in_state(JobState::Failed), 1);
        assert!(queue.dequeue().await.unwrap().is_none());
    }
}
