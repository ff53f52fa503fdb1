//! Durable checkpoints for in-flight transaction attempts
//!
//! The submission unit saves an attempt through a checkpoint every time
//! the attempt's identity or resume snapshot changes, before the result
//! of the ledger call is known.

use crate::JobQueue;
use async_trait::async_trait;
use evote_saga_types::{
    ElectionStep, JobId, Result, SubmissionJob, TransactionAttempt, WorkflowContext,
};
use std::sync::Arc;

/// Where an updated attempt is persisted.
#[async_trait]
pub trait AttemptCheckpoint: Send + Sync {
    async fn save(&self, attempt: &TransactionAttempt) -> Result<()>;
}

/// Persists the attempt of a single-step submission job.
pub struct SubmissionCheckpoint {
    queue: Arc<dyn JobQueue>,
    job_id: JobId,
    job: SubmissionJob,
}

impl SubmissionCheckpoint {
    pub fn new(queue: Arc<dyn JobQueue>, job_id: JobId, job: SubmissionJob) -> Self {
        Self { queue, job_id, job }
    }
}

#[async_trait]
impl AttemptCheckpoint for SubmissionCheckpoint {
    async fn save(&self, attempt: &TransactionAttempt) -> Result<()> {
        let job = SubmissionJob {
            attempt: attempt.clone(),
            ..self.job.clone()
        };
        self.queue.persist(&self.job_id, job.to_value()?).await
    }
}

/// Persists the attempt of one saga step inside its workflow context.
///
/// The step cursor is left untouched, so a crash resumes the same step
/// with the same logical transaction.
pub struct StepCheckpoint {
    queue: Arc<dyn JobQueue>,
    job_id: JobId,
    context: WorkflowContext,
    step: ElectionStep,
}

impl StepCheckpoint {
    pub fn new(queue: Arc<dyn JobQueue>, job_id: JobId, context: WorkflowContext) -> Self {
        let step = context.step;
        Self {
            queue,
            job_id,
            context,
            step,
        }
    }
}

#[async_trait]
impl AttemptCheckpoint for StepCheckpoint {
    async fn save(&self, attempt: &TransactionAttempt) -> Result<()> {
        let context = self.context.clone().with_attempt(self.step, attempt.clone());
        tracing::debug!(
            job_id = %self.job_id,
            step = %self.step,
            transaction_id = attempt.logical_id().unwrap_or_default(),
            "Checkpointing step attempt"
        );
        self.queue.persist(&self.job_id, context.to_value()?).await
    }
}
