//! Service facade consumed by the HTTP layer
//!
//! Enqueues sagas and single-step submissions and answers status polls.
//! Execution happens later, on whichever worker dequeues the job.

use crate::config::QueueConfig;
use crate::progress::progress;
use crate::queue::JobQueue;
use evote_saga_types::{
    ElectionRequest, JobId, JobKind, JobRecord, JobState, JobSummary, Progress, Result, SagaError,
    SubmissionJob, WorkflowContext,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Entry points for starting and polling election work.
#[derive(Clone)]
pub struct ElectionService {
    queue: Arc<dyn JobQueue>,
    config: QueueConfig,
}

impl ElectionService {
    pub fn new(queue: Arc<dyn JobQueue>, config: QueueConfig) -> Self {
        Self { queue, config }
    }

    /// Start an election saga for `owner_id`.
    #[instrument(skip(self, input), fields(election = %input.election_name))]
    pub async fn enqueue_workflow(&self, input: ElectionRequest, owner_id: &str) -> Result<JobId> {
        input.validate()?;
        let context = WorkflowContext::new(owner_id, input);
        let job_id = self
            .queue
            .enqueue(JobKind::Workflow, &self.config.workflow_queue_name, context.to_value()?)
            .await?;
        info!(job_id = %job_id, owner_id, "Election workflow enqueued");
        Ok(job_id)
    }

    /// Progress of an election saga.
    pub async fn get_progress(&self, job_id: &JobId) -> Result<Progress> {
        Ok(progress(&self.get_workflow(job_id).await?))
    }

    /// The persisted context of an election saga.
    pub async fn get_workflow(&self, job_id: &JobId) -> Result<WorkflowContext> {
        let record = self.record(job_id, JobKind::Workflow).await?;
        WorkflowContext::from_value(record.data)
    }

    /// Queue a single ledger write, independent of any saga.
    #[instrument(skip(self, args))]
    pub async fn enqueue_submission(
        &self,
        owner_id: &str,
        call_name: &str,
        args: Vec<String>,
    ) -> Result<JobId> {
        let job = SubmissionJob::new(owner_id, call_name, args);
        let job_id = self
            .queue
            .enqueue(JobKind::Submission, &job.job_name(), job.to_value()?)
            .await?;
        info!(
            job_id = %job_id,
            queue = %self.config.submit_queue_name,
            "Submission enqueued"
        );
        Ok(job_id)
    }

    /// Transaction ids and outcome of a single-step submission.
    pub async fn get_job_summary(&self, job_id: &JobId) -> Result<JobSummary> {
        let record = self.record(job_id, JobKind::Submission).await?;
        let job = SubmissionJob::from_value(record.data)?;

        let (tx_payload, tx_error) = match (&record.state, &record.result) {
            (_, Some(result)) if result.error.is_some() => (None, result.error.clone()),
            (_, Some(result)) => (
                Some(
                    result
                        .payload
                        .as_deref()
                        .map(|p| String::from_utf8_lossy(p).into_owned())
                        .unwrap_or_default(),
                ),
                None,
            ),
            (JobState::Failed, None) => (None, record.failed_reason.clone()),
            _ => (None, None),
        };

        Ok(JobSummary {
            job_id: job_id.clone(),
            tx_ids: job.attempt.history,
            tx_payload,
            tx_error,
        })
    }

    async fn record(&self, job_id: &JobId, kind: JobKind) -> Result<JobRecord> {
        let record = self
            .queue
            .get(job_id)
            .await?
            .ok_or_else(|| SagaError::JobNotFound(job_id.clone()))?;
        if record.kind != kind {
            return Err(SagaError::JobKindMismatch {
                job_id: job_id.clone(),
                expected: kind.to_string(),
            });
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobQueue;
    use evote_saga_types::{Candidate, JobResult, Participant};

    fn service() -> (Arc<InMemoryJobQueue>, ElectionService) {
        let queue = Arc::new(InMemoryJobQueue::with_attempts(2));
        let service = ElectionService::new(queue.clone(), QueueConfig::default());
        (queue, service)
    }

    fn request() -> ElectionRequest {
        ElectionRequest {
            election_name: "Board".into(),
            election_date: vec!["2026-11-01".into()],
            election_location: "Online".into(),
            candidate_list: vec![Candidate::new("Ada", "A")],
            participant_list: vec![Participant::new(1, "Grace")],
        }
    }

    #[tokio::test]
    async fn test_new_workflow_reports_first_step() {
        let (queue, service) = service();
        let job_id = service.enqueue_workflow(request(), "admin").await.unwrap();

        let progress = service.get_progress(&job_id).await.unwrap();
        assert_eq!(progress, Progress { percent: 20, is_terminal: false });

        let record = queue.get(&job_id).await.unwrap().unwrap();
        assert_eq!(record.name, "CreateElection");
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let (queue, service) = service();
        let mut input = request();
        input.candidate_list.clear();

        let err = service.enqueue_workflow(input, "admin").await.unwrap_err();
        assert!(matches!(err, SagaError::InvalidInput(_)));
        assert_eq!(queue.total_count(), 0);
    }

    #[tokio::test]
    async fn test_progress_of_unknown_job() {
        let (_, service) = service();
        let err = service.get_progress(&JobId::new("nope")).await.unwrap_err();
        assert!(matches!(err, SagaError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_progress_is_idempotent_across_persists() {
        let (queue, service) = service();
        let job_id = service.enqueue_workflow(request(), "admin").await.unwrap();
        let ctx = service.get_workflow(&job_id).await.unwrap();

        queue.persist(&job_id, ctx.to_value().unwrap()).await.unwrap();
        let first = service.get_progress(&job_id).await.unwrap();
        queue.persist(&job_id, ctx.to_value().unwrap()).await.unwrap();
        let second = service.get_progress(&job_id).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_summary_of_pending_submission() {
        let (_, service) = service();
        let job_id = service
            .enqueue_submission("admin", "CastVote", vec!["b1".into()])
            .await
            .unwrap();

        let summary = service.get_job_summary(&job_id).await.unwrap();
        assert_eq!(summary.job_id, job_id);
        assert!(summary.tx_ids.is_empty());
        assert_eq!(summary.tx_payload, None);
        assert_eq!(summary.tx_error, None);
    }

    #[tokio::test]
    async fn test_summary_of_completed_submission_without_payload() {
        let (queue, service) = service();
        let job_id = service
            .enqueue_submission("admin", "CastVote", vec![])
            .await
            .unwrap();
        queue.dequeue().await.unwrap();
        queue.complete(&job_id, JobResult::default()).await.unwrap();

        let summary = service.get_job_summary(&job_id).await.unwrap();
        assert_eq!(summary.tx_payload.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_summary_requires_submission_job() {
        let (_, service) = service();
        let job_id = service.enqueue_workflow(request(), "admin").await.unwrap();

        let err = service.get_job_summary(&job_id).await.unwrap_err();
        assert!(matches!(err, SagaError::JobKindMismatch { .. }));
    }
}
