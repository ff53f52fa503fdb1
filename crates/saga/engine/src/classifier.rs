//! Retry classification of failed ledger writes
//!
//! Precedence between failure kinds is decided once, when a raw ledger
//! failure is mapped into a [`LedgerWriteError`] (see
//! [`ErrorMapper::map`](crate::ErrorMapper::map)): duplicate detection
//! first, then domain rejections, then timeouts. A duplicate or a
//! rejection reported through a timeout therefore never reaches this
//! function as `Timeout`.

use evote_saga_types::{LedgerErrorKind, LedgerWriteError, RetryAction};

/// Map a failed write to the retry action its caller must take.
///
/// Total and side-effect free.
pub fn classify(error: &LedgerWriteError) -> RetryAction {
    match error.kind {
        // Already recorded (or permanently conflicted) under this id
        LedgerErrorKind::Duplicate => RetryAction::None,
        LedgerErrorKind::DomainRejection(_) => RetryAction::None,
        // May already be ordered: keep the id for at-most-once
        LedgerErrorKind::Timeout => RetryAction::WithExistingTransactionId,
        // Never reached ordering
        LedgerErrorKind::Transient => RetryAction::WithNewTransactionId,
    }
}
