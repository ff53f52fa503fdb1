//! Logical transaction attempts
//!
//! A [`TransactionAttempt`] is the persisted state of one ledger write. It
//! lists every logical transaction id minted for the write and, while the
//! write is in flight, carries an opaque snapshot from which the ledger
//! client can rebuild the same transaction.

use serde::{Deserialize, Serialize};

/// What the caller of a failed submission must do next.
///
/// Whether to mint a new transaction id decides at-most-once semantics on
/// the ledger, so this stays a closed enum and every match names all arms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    /// The outcome is settled. Retrying could double-apply the write.
    None,
    /// Retry with the current transaction id; the write may already be ordered.
    WithExistingTransactionId,
    /// Retry with a freshly minted transaction id.
    WithNewTransactionId,
}

impl RetryAction {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RetryAction::None)
    }
}

impl std::fmt::Display for RetryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryAction::None => write!(f, "none"),
            RetryAction::WithExistingTransactionId => write!(f, "with_existing_transaction_id"),
            RetryAction::WithNewTransactionId => write!(f, "with_new_transaction_id"),
        }
    }
}

/// Persisted state of one ledger write across retries.
///
/// Invariant: once started, `history` is non-empty and the current
/// logical id is its last element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAttempt {
    /// Every logical transaction id used, oldest first (append-only).
    #[serde(default)]
    pub history: Vec<String>,
    /// Snapshot of the uncommitted write, present while it can be resumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialized_state: Option<Vec<u8>>,
}

impl TransactionAttempt {
    pub fn new() -> Self {
        Self::default()
    }

    /// The logical id the next resume would reuse.
    pub fn logical_id(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    pub fn is_started(&self) -> bool {
        !self.history.is_empty()
    }

    /// True when a snapshot exists and no new id must be minted.
    pub fn is_resumable(&self) -> bool {
        self.serialized_state.is_some()
    }

    /// Record a freshly minted logical id together with its resume snapshot.
    pub fn begin(&mut self, transaction_id: impl Into<String>, state: Vec<u8>) {
        self.history.push(transaction_id.into());
        self.serialized_state = Some(state);
    }

    /// Forget the resume snapshot so the next submission mints a new id.
    ///
    /// Returns whether anything changed.
    pub fn discard_state(&mut self) -> bool {
        self.serialized_state.take().is_some()
    }

    /// Number of logical ids minted so far.
    pub fn identity_count(&self) -> usize {
        self.history.len()
    }
}
