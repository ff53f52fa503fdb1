//! Saga runner: drives a workflow context through its steps
//!
//! After every step the full context is persisted before the next step
//! starts, so the persisted cursor is always the step to resume at.

use crate::checkpoint::StepCheckpoint;
use crate::queue::JobQueue;
use crate::steps::{StepFailure, StepRegistry, DEFAULT_TERMINAL_STATUS};
use evote_saga_types::{
    ElectionStep, JobId, JobKind, LedgerWriteError, Result, SagaError, WorkflowContext,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How a saga run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaOutcome {
    /// Reached `Finish`.
    Completed { terminal_status: String },
    /// Stopped on a retryable ledger failure; redelivery resumes at `step`.
    Paused {
        step: ElectionStep,
        error: LedgerWriteError,
    },
    /// Stopped on a settled ledger failure at `step`.
    Halted {
        step: ElectionStep,
        error: LedgerWriteError,
    },
}

/// Executes sagas against the step registry, persisting through the queue.
#[derive(Clone)]
pub struct SagaRunner {
    registry: StepRegistry,
    queue: Arc<dyn JobQueue>,
}

impl SagaRunner {
    pub fn new(registry: StepRegistry, queue: Arc<dyn JobQueue>) -> Self {
        Self { registry, queue }
    }

    /// Run from the context's current step until it finishes or stops.
    ///
    /// Errors are infrastructure failures or corrupted state; callers check
    /// [`SagaError::is_fatal`] to decide between retry and abort.
    #[instrument(skip(self, context), fields(job_id = %job_id))]
    pub async fn run(&self, job_id: &JobId, mut context: WorkflowContext) -> Result<SagaOutcome> {
        context.check_invariants()?;

        while !context.is_terminal() {
            let step = context.step;
            let checkpoint = StepCheckpoint::new(self.queue.clone(), job_id.clone(), context.clone());

            let next = match self.registry.execute(&context, &checkpoint).await {
                Ok(next) => next,
                Err(StepFailure::Paused(error)) => {
                    warn!(%step, error = %error, "Saga paused");
                    return Ok(SagaOutcome::Paused { step, error });
                }
                Err(StepFailure::Halted(error)) => {
                    warn!(%step, error = %error, "Saga halted");
                    return Ok(SagaOutcome::Halted { step, error });
                }
                Err(StepFailure::Error(err)) => return Err(err),
            };

            if Some(next.step) != step.next() {
                return Err(SagaError::InvalidTransition(format!(
                    "{step} moved to {}",
                    next.step
                )));
            }

            self.queue.persist(job_id, next.to_value()?).await?;
            info!(from = %step, to = %next.step, "Step completed");
            context = next;
        }

        let terminal_status = match &context.terminal_status {
            Some(status) => status.clone(),
            None => {
                context.terminal_status = Some(DEFAULT_TERMINAL_STATUS.to_string());
                self.queue.persist(job_id, context.to_value()?).await?;
                DEFAULT_TERMINAL_STATUS.to_string()
            }
        };

        info!(%terminal_status, "Saga finished");
        Ok(SagaOutcome::Completed { terminal_status })
    }

    /// Load a workflow job's persisted context and run it.
    pub async fn resume(&self, job_id: &JobId) -> Result<SagaOutcome> {
        let context = self.load(job_id).await?;
        self.run(job_id, context).await
    }

    /// The persisted context of a workflow job.
    pub async fn load(&self, job_id: &JobId) -> Result<WorkflowContext> {
        let record = self
            .queue
            .get(job_id)
            .await?
            .ok_or_else(|| SagaError::JobNotFound(job_id.clone()))?;
        if record.kind != JobKind::Workflow {
            return Err(SagaError::JobKindMismatch {
                job_id: job_id.clone(),
                expected: JobKind::Workflow.to_string(),
            });
        }
        WorkflowContext::from_value(record.data)
    }
}
