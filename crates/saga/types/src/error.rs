//! Error types for ledger writes and saga execution

use crate::JobId;
use serde::{Deserialize, Serialize};

// ── Ledger Errors ────────────────────────────────────────────────────

/// Deterministic business-rule failures reported by the chaincode.
///
/// These recur identically on every retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainRejection {
    NeedAdminPrivilege,
    AssetNotFound,
    FunctionNotFound,
    UnauthorizedBallotAccess,
    NoValidPeerResponse,
}

impl DomainRejection {
    /// HTTP-like status surfaced to API callers.
    pub fn status(&self) -> u16 {
        match self {
            DomainRejection::NeedAdminPrivilege => 403,
            DomainRejection::AssetNotFound => 404,
            DomainRejection::FunctionNotFound => 404,
            DomainRejection::UnauthorizedBallotAccess => 403,
            DomainRejection::NoValidPeerResponse => 400,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainRejection::NeedAdminPrivilege => "NeedAdminPrivilegeError",
            DomainRejection::AssetNotFound => "AssetNotExist",
            DomainRejection::FunctionNotFound => "FunctionNotExist",
            DomainRejection::UnauthorizedBallotAccess => "UnauthorizedAccessBallot",
            DomainRejection::NoValidPeerResponse => "NoValidResponsePeerError",
        }
    }
}

/// Failure taxonomy of a ledger write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rejection", rename_all = "snake_case")]
pub enum LedgerErrorKind {
    /// The ledger already holds a transaction with this logical id.
    Duplicate,
    /// No definitive commit or abort signal arrived in time.
    Timeout,
    /// A deterministic chaincode rejection.
    DomainRejection(DomainRejection),
    /// Anything else; the write never reached ordering.
    Transient,
}

/// A failed ledger write as reported by the ledger client.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct LedgerWriteError {
    pub kind: LedgerErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl LedgerWriteError {
    pub fn new(kind: LedgerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            transaction_id: None,
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Duplicate, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Timeout, message)
    }

    pub fn rejected(rejection: DomainRejection, message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::DomainRejection(rejection), message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(LedgerErrorKind::Transient, message)
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn rejection(&self) -> Option<DomainRejection> {
        match self.kind {
            LedgerErrorKind::DomainRejection(rejection) => Some(rejection),
            _ => None,
        }
    }
}

/// Identity registration failed with the certificate authority.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("identity registration failed for {content_hash}: {reason}")]
pub struct IdentityError {
    pub content_hash: String,
    pub reason: String,
    /// The authority already holds an identity for this hash.
    pub already_registered: bool,
}

impl IdentityError {
    pub fn refused(content_hash: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            reason: reason.into(),
            already_registered: false,
        }
    }

    pub fn already_registered(content_hash: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            reason: "identity is already registered".into(),
            already_registered: true,
        }
    }
}

// ── Saga Errors ──────────────────────────────────────────────────────

/// Errors that can occur while running sagas and submission jobs.
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("Job {job_id} is not a {expected} job")]
    JobKindMismatch { job_id: JobId, expected: String },

    #[error("Invalid step cursor: {0}")]
    InvalidStep(u64),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Corrupted workflow context: {0}")]
    CorruptedContext(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unexpected ledger response: {0}")]
    UnexpectedResponse(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerWriteError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SagaError {
    /// Fatal errors signal corrupted persisted state and must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SagaError::InvalidStep(_)
                | SagaError::InvalidTransition(_)
                | SagaError::CorruptedContext(_)
                | SagaError::JobKindMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for SagaError {
    fn from(err: serde_json::Error) -> Self {
        SagaError::Serialization(err.to_string())
    }
}

/// Result type alias for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_status_codes() {
        assert_eq!(DomainRejection::NeedAdminPrivilege.status(), 403);
        assert_eq!(DomainRejection::AssetNotFound.status(), 404);
        assert_eq!(DomainRejection::FunctionNotFound.status(), 404);
        assert_eq!(DomainRejection::UnauthorizedBallotAccess.status(), 403);
        assert_eq!(DomainRejection::NoValidPeerResponse.status(), 400);
    }

    #[test]
    fn test_ledger_error_display_is_message() {
        let err = LedgerWriteError::rejected(DomainRejection::AssetNotFound, "The asset e1 does not exist")
            .with_transaction_id("tx-9");
        assert_eq!(err.to_string(), "The asset e1 does not exist");
        assert_eq!(err.rejection(), Some(DomainRejection::AssetNotFound));
        assert_eq!(err.transaction_id.as_deref(), Some("tx-9"));
    }

    #[test]
    fn test_ledger_error_kind_serde() {
        let err = LedgerWriteError::rejected(DomainRejection::FunctionNotFound, "nope");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"]["kind"], "domain_rejection");
        assert_eq!(json["kind"]["rejection"], "function_not_found");

        let back: LedgerWriteError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_identity_error_marks_repeat_registration() {
        let repeat = IdentityError::already_registered("abc");
        assert!(repeat.already_registered);
        assert_eq!(
            repeat.to_string(),
            "identity registration failed for abc: identity is already registered"
        );
        assert!(!IdentityError::refused("abc", "registration refused").already_registered);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(SagaError::InvalidStep(9).is_fatal());
        assert!(SagaError::CorruptedContext("x".into()).is_fatal());
        assert!(!SagaError::Storage("down".into()).is_fatal());
        assert!(!SagaError::Ledger(LedgerWriteError::timeout("t")).is_fatal());
    }
}
