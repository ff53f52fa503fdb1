//! The submission unit: one idempotent, resumable ledger write
//!
//! A write is bound to a logical transaction id. The id and a resume
//! snapshot are checkpointed *before* the ledger call, so a worker that
//! dies mid-call leaves behind enough state for the next delivery to reuse
//! the same id instead of silently abandoning it.

use crate::checkpoint::AttemptCheckpoint;
use crate::classifier::classify;
use crate::ledger::{LedgerClient, TransactionHandle};
use evote_saga_types::{LedgerWriteError, RetryAction, SagaError, TransactionAttempt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Why a submission did not produce a payload.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// Settled outcome; surfaced verbatim and never retried.
    #[error("{0}")]
    Terminal(LedgerWriteError),

    /// The caller's retry policy should deliver the submission again.
    #[error("{error} (retry {action})")]
    Retryable {
        action: RetryAction,
        error: LedgerWriteError,
    },

    /// Checkpointing or the ledger client failed before an outcome was known.
    #[error(transparent)]
    Infrastructure(#[from] SagaError),
}

impl SubmissionError {
    /// The ledger failure, if the ledger reported one.
    pub fn ledger_error(&self) -> Option<&LedgerWriteError> {
        match self {
            SubmissionError::Terminal(error) | SubmissionError::Retryable { error, .. } => {
                Some(error)
            }
            SubmissionError::Infrastructure(_) => None,
        }
    }
}

/// Executes ledger writes with retry-safe transaction identity.
#[derive(Clone)]
pub struct SubmissionUnit {
    ledger: Arc<dyn LedgerClient>,
}

impl SubmissionUnit {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Submit `call_name(args)` under the attempt's logical identity.
    ///
    /// Resumes from the attempt's snapshot when present, otherwise mints and
    /// checkpoints a new identity first. After a failure the attempt reflects
    /// the classified retry action and has been checkpointed if it changed.
    #[instrument(skip(self, attempt, args, checkpoint), fields(call = call_name))]
    pub async fn submit(
        &self,
        owner_id: &str,
        attempt: &mut TransactionAttempt,
        call_name: &str,
        args: &[String],
        checkpoint: &dyn AttemptCheckpoint,
    ) -> Result<Vec<u8>, SubmissionError> {
        let handle = self.prepare(owner_id, attempt, call_name, checkpoint).await?;

        match self.ledger.submit(&handle, args).await {
            Ok(payload) => {
                info!(transaction_id = %handle.transaction_id, "Transaction committed");
                Ok(payload)
            }
            Err(error) => {
                let action = classify(&error);
                warn!(
                    transaction_id = %handle.transaction_id,
                    kind = ?error.kind,
                    %action,
                    error = %error,
                    "Transaction failed"
                );
                match action {
                    RetryAction::None => Err(SubmissionError::Terminal(error)),
                    RetryAction::WithExistingTransactionId => {
                        Err(SubmissionError::Retryable { action, error })
                    }
                    RetryAction::WithNewTransactionId => {
                        if attempt.discard_state() {
                            checkpoint.save(attempt).await?;
                        }
                        Err(SubmissionError::Retryable { action, error })
                    }
                }
            }
        }
    }

    /// Resume the in-flight transaction or mint and checkpoint a new one.
    async fn prepare(
        &self,
        owner_id: &str,
        attempt: &mut TransactionAttempt,
        call_name: &str,
        checkpoint: &dyn AttemptCheckpoint,
    ) -> Result<TransactionHandle, SubmissionError> {
        if let Some(state) = &attempt.serialized_state {
            let handle = self.ledger.deserialize(owner_id, state)?;
            debug!(transaction_id = %handle.transaction_id, "Resuming transaction");
            return Ok(handle);
        }

        let handle = self.ledger.create_transaction(owner_id, call_name)?;
        let state = self.ledger.serialize(&handle)?;
        attempt.begin(handle.transaction_id.clone(), state);
        checkpoint.save(attempt).await?;

        debug!(
            transaction_id = %handle.transaction_id,
            identities = attempt.identity_count(),
            "Minted transaction"
        );
        Ok(handle)
    }
}
