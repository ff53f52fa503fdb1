//! Step registry: the work performed at each saga step
//!
//! Each handler receives the context at its step and returns the context
//! for the next step. Handlers never persist the cursor themselves; the
//! runner does that between steps.

use crate::checkpoint::AttemptCheckpoint;
use crate::ledger::IdentityRegistrar;
use crate::settle::settle_all;
use crate::submission::{SubmissionError, SubmissionUnit};
use evote_saga_types::{
    ElectionRecord, ElectionStep, IdentityError, LedgerErrorKind, LedgerResponse,
    LedgerWriteError, Result, SagaError, TransactionAttempt, WorkflowContext,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Chaincode functions invoked by the saga.
pub mod calls {
    pub const CREATE_ELECTION: &str = "CreateElection";
    pub const CREATE_CANDIDATE: &str = "CreateCandidate";
    pub const CREATE_BALLOT: &str = "CreateBallot";
}

/// Terminal status recorded when the saga reaches `Finish` without one.
pub const DEFAULT_TERMINAL_STATUS: &str = "election created";

/// Why a step did not advance.
#[derive(Debug, thiserror::Error)]
pub enum StepFailure {
    /// Retryable ledger failure; the saga stays at its step.
    #[error("step paused: {0}")]
    Paused(LedgerWriteError),

    /// Settled ledger failure; the saga cannot progress.
    #[error("step halted: {0}")]
    Halted(LedgerWriteError),

    #[error(transparent)]
    Error(#[from] SagaError),
}

impl StepFailure {
    /// Human-readable failure text, the ledger message when there is one.
    pub fn status_text(&self) -> String {
        match self {
            StepFailure::Paused(error) | StepFailure::Halted(error) => error.message.clone(),
            StepFailure::Error(error) => error.to_string(),
        }
    }
}

impl From<SubmissionError> for StepFailure {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Terminal(error) => StepFailure::Halted(error),
            SubmissionError::Retryable { error, .. } => StepFailure::Paused(error),
            SubmissionError::Infrastructure(error) => StepFailure::Error(error),
        }
    }
}

/// Dispatches a context to the handler for its current step.
#[derive(Clone)]
pub struct StepRegistry {
    submission: SubmissionUnit,
    registrar: Arc<dyn IdentityRegistrar>,
}

impl StepRegistry {
    pub fn new(submission: SubmissionUnit, registrar: Arc<dyn IdentityRegistrar>) -> Self {
        Self {
            submission,
            registrar,
        }
    }

    /// Run the current step and return the advanced context.
    ///
    /// `Finish` has no handler; the runner never dispatches it.
    #[instrument(skip_all, fields(step = %ctx.step))]
    pub async fn execute(
        &self,
        ctx: &WorkflowContext,
        checkpoint: &dyn AttemptCheckpoint,
    ) -> std::result::Result<WorkflowContext, StepFailure> {
        let next = match ctx.step {
            ElectionStep::CreateElection => self.create_election(ctx, checkpoint).await?,
            ElectionStep::CreateCandidates => self.create_candidates(ctx, checkpoint).await?,
            ElectionStep::RegisterIdentities => self.register_identities(ctx).await?,
            ElectionStep::CreateBallots => self.create_ballots(ctx, checkpoint).await?,
            ElectionStep::Finish => {
                return Err(SagaError::InvalidTransition("finish has no handler".into()).into())
            }
        };
        Ok(next.advanced()?)
    }

    async fn create_election(
        &self,
        ctx: &WorkflowContext,
        checkpoint: &dyn AttemptCheckpoint,
    ) -> std::result::Result<WorkflowContext, StepFailure> {
        let record = ElectionRecord::from_request(&ctx.input, ctx.owner_id.clone());
        let args = vec![serde_json::to_string(&record).map_err(SagaError::from)?];

        let mut attempt = ctx.attempt_for(ctx.step);
        let payload = self
            .submission
            .submit(&ctx.owner_id, &mut attempt, calls::CREATE_ELECTION, &args, checkpoint)
            .await?;

        let election_id = LedgerResponse::parse(&payload)?.into_message()?;
        if election_id.is_empty() {
            return Err(SagaError::UnexpectedResponse("empty election id".into()).into());
        }
        info!(%election_id, "Election created");

        let mut next = ctx.clone().with_attempt(ctx.step, attempt);
        next.derived.election_id = Some(election_id);
        Ok(next)
    }

    async fn create_candidates(
        &self,
        ctx: &WorkflowContext,
        checkpoint: &dyn AttemptCheckpoint,
    ) -> std::result::Result<WorkflowContext, StepFailure> {
        let election_id = ctx.election_id()?.to_string();
        let candidates: Vec<_> = ctx.input.candidate_list.iter().map(|c| c.tagged()).collect();
        let args = vec![
            serde_json::to_string(&candidates).map_err(SagaError::from)?,
            election_id,
        ];

        let mut attempt = ctx.attempt_for(ctx.step);
        match self
            .submission
            .submit(&ctx.owner_id, &mut attempt, calls::CREATE_CANDIDATE, &args, checkpoint)
            .await
        {
            Ok(_) => info!(count = candidates.len(), "Candidates created"),
            // The saved id already committed before the cursor moved on.
            Err(SubmissionError::Terminal(error)) if error.kind == LedgerErrorKind::Duplicate => {
                info!(
                    transaction_id = attempt.logical_id().unwrap_or_default(),
                    "Candidates already committed"
                );
            }
            Err(err) => return Err(err.into()),
        }

        Ok(ctx.clone().with_attempt(ctx.step, attempt))
    }

    /// Register one identity per participant.
    ///
    /// Individual failures are logged and dropped; the step always
    /// advances once every registration has settled. An identity the
    /// authority already holds counts as registered.
    async fn register_identities(
        &self,
        ctx: &WorkflowContext,
    ) -> std::result::Result<WorkflowContext, StepFailure> {
        let election_id = ctx.election_id()?;
        let hashes = ctx
            .input
            .participant_list
            .iter()
            .map(|p| p.content_hash())
            .collect::<Result<Vec<_>>>()?;

        let settled = settle_all(hashes.iter().map(|hash| {
            let registrar = self.registrar.clone();
            async move {
                match registrar
                    .register_identity(hash, election_id, &ctx.owner_id)
                    .await
                {
                    Ok(_) => Ok(hash.clone()),
                    Err(err) if err.already_registered => {
                        debug!(content_hash = %hash, "Identity already registered");
                        Ok(hash.clone())
                    }
                    Err(err) => Err(err),
                }
            }
        }))
        .await;

        for IdentityError {
            content_hash,
            reason,
            ..
        } in &settled.failed
        {
            warn!(%content_hash, %reason, "Identity registration failed");
        }
        info!(
            registered = settled.succeeded.len(),
            failed = settled.failed.len(),
            "Identities registered"
        );

        let mut next = ctx.clone();
        next.derived.registered_identities = settled.succeeded;
        Ok(next)
    }

    /// Submit the ballot batch.
    ///
    /// Every outcome, success or failure, becomes the terminal status.
    async fn create_ballots(
        &self,
        ctx: &WorkflowContext,
        checkpoint: &dyn AttemptCheckpoint,
    ) -> std::result::Result<WorkflowContext, StepFailure> {
        let mut attempt = ctx.attempt_for(ctx.step);
        let status = match self.submit_ballots(ctx, &mut attempt, checkpoint).await {
            Ok(message) => {
                info!(%message, "Ballots created");
                message
            }
            Err(err) => {
                warn!(error = %err, "Ballot creation failed");
                err.status_text()
            }
        };

        let mut next = ctx.clone().with_attempt(ctx.step, attempt);
        next.terminal_status = Some(status);
        Ok(next)
    }

    async fn submit_ballots(
        &self,
        ctx: &WorkflowContext,
        attempt: &mut TransactionAttempt,
        checkpoint: &dyn AttemptCheckpoint,
    ) -> std::result::Result<String, StepFailure> {
        let election_id = ctx.election_id()?.to_string();
        let hashes = ctx
            .input
            .participant_list
            .iter()
            .map(|p| p.content_hash())
            .collect::<Result<Vec<_>>>()?;
        let batch = serde_json::json!({ "data": hashes });
        let args = vec![batch.to_string(), election_id];

        let payload = self
            .submission
            .submit(&ctx.owner_id, attempt, calls::CREATE_BALLOT, &args, checkpoint)
            .await?;
        Ok(LedgerResponse::parse(&payload)?.into_message()?)
    }
}
