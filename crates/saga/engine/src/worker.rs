//! Worker loop: pulls jobs from the substrate and executes them
//!
//! Outcomes map onto the substrate as follows. Success and settled ledger
//! failures complete the job with a result, retryable failures request
//! redelivery, and halted sagas or corrupted state fail the job.

use crate::checkpoint::SubmissionCheckpoint;
use crate::config::WorkerConfig;
use crate::ledger::{IdentityRegistrar, LedgerClient};
use crate::queue::JobQueue;
use crate::runner::{SagaOutcome, SagaRunner};
use crate::steps::StepRegistry;
use crate::submission::{SubmissionError, SubmissionUnit};
use evote_saga_types::{JobId, JobKind, JobRecord, JobResult, Result, SagaError, SubmissionJob};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// What the worker did with a delivered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDisposition {
    Completed,
    Retried,
    Failed,
}

/// Executes submission and workflow jobs.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    submission: SubmissionUnit,
    runner: SagaRunner,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        ledger: Arc<dyn LedgerClient>,
        registrar: Arc<dyn IdentityRegistrar>,
        config: WorkerConfig,
    ) -> Self {
        let submission = SubmissionUnit::new(ledger);
        let runner = SagaRunner::new(
            StepRegistry::new(submission.clone(), registrar),
            queue.clone(),
        );
        Self {
            queue,
            submission,
            runner,
            config,
        }
    }

    pub fn runner(&self) -> &SagaRunner {
        &self.runner
    }

    /// Process one deliverable job, if any.
    ///
    /// A job whose outcome could not be recorded is handed back for
    /// redelivery so it never stays `Active`.
    pub async fn run_once(&self) -> Result<Option<(JobId, JobDisposition)>> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        let job_id = job.id.clone();
        let processed = match job.kind {
            JobKind::Submission => self.process_submission(job).await,
            JobKind::Workflow => self.process_workflow(&job_id).await,
        };
        let disposition = match processed {
            Ok(disposition) => disposition,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Job outcome not recorded, requesting redelivery");
                self.retry(&job_id, &e.to_string()).await?
            }
        };
        Ok(Some((job_id, disposition)))
    }

    /// Process jobs until none is deliverable; returns how many were handled.
    pub async fn run_until_idle(&self) -> Result<usize> {
        let mut handled = 0;
        while self.run_once().await?.is_some() {
            handled += 1;
        }
        debug!(handled, "Queue idle");
        Ok(handled)
    }

    /// Poll with the configured concurrency until `shutdown` turns true.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        info!(concurrency = self.config.concurrency, "Worker started");

        let handles: Vec<_> = (0..self.config.concurrency.max(1))
            .map(|slot| {
                let worker = self.clone();
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    loop {
                        if *shutdown.borrow() {
                            break;
                        }
                        let idle = match worker.run_once().await {
                            Ok(Some(_)) => false,
                            Ok(None) => true,
                            Err(e) => {
                                error!(slot, error = %e, "Job processing failed");
                                true
                            }
                        };
                        if idle {
                            tokio::select! {
                                _ = tokio::time::sleep(worker.config.poll_interval()) => {}
                                _ = shutdown.changed() => {}
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
        info!("Worker stopped");
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, attempt = job.attempts_made))]
    async fn process_submission(&self, job: JobRecord) -> Result<JobDisposition> {
        let data = match SubmissionJob::from_value(job.data) {
            Ok(data) => data,
            Err(e) => return self.fail(&job.id, &e.to_string()).await,
        };
        let checkpoint = SubmissionCheckpoint::new(self.queue.clone(), job.id.clone(), data.clone());
        let mut attempt = data.attempt.clone();

        match self
            .submission
            .submit(&data.owner_id, &mut attempt, &data.call_name, &data.args, &checkpoint)
            .await
        {
            Ok(payload) => {
                self.queue.complete(&job.id, JobResult::payload(payload)).await?;
                Ok(JobDisposition::Completed)
            }
            Err(SubmissionError::Terminal(e)) => {
                self.queue.complete(&job.id, JobResult::error(e.message)).await?;
                Ok(JobDisposition::Completed)
            }
            Err(SubmissionError::Retryable { error, .. }) => self.retry(&job.id, &error.message).await,
            Err(SubmissionError::Infrastructure(e)) => self.retry_or_fail(&job.id, e).await,
        }
    }

    #[instrument(skip(self))]
    async fn process_workflow(&self, job_id: &JobId) -> Result<JobDisposition> {
        match self.runner.resume(job_id).await {
            Ok(SagaOutcome::Completed { terminal_status }) => {
                self.queue
                    .complete(job_id, JobResult::payload(terminal_status.into_bytes()))
                    .await?;
                Ok(JobDisposition::Completed)
            }
            Ok(SagaOutcome::Paused { error, .. }) => self.retry(job_id, &error.message).await,
            Ok(SagaOutcome::Halted { step, error }) => {
                self.fail(job_id, &format!("{step}: {}", error.message)).await
            }
            Err(e) => self.retry_or_fail(job_id, e).await,
        }
    }

    async fn retry(&self, job_id: &JobId, reason: &str) -> Result<JobDisposition> {
        if self.queue.retry(job_id, reason).await? {
            Ok(JobDisposition::Retried)
        } else {
            Ok(JobDisposition::Failed)
        }
    }

    async fn fail(&self, job_id: &JobId, reason: &str) -> Result<JobDisposition> {
        self.queue.fail(job_id, reason).await?;
        Ok(JobDisposition::Failed)
    }

    async fn retry_or_fail(&self, job_id: &JobId, err: SagaError) -> Result<JobDisposition> {
        if err.is_fatal() {
            error!(job_id = %job_id, error = %err, "Fatal job error");
            self.fail(job_id, &err.to_string()).await
        } else {
            warn!(job_id = %job_id, error = %err, "Job error, requesting redelivery");
            self.retry(job_id, &err.to_string()).await
        }
    }
}
