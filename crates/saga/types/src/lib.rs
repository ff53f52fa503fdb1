//! Domain types for resumable election sagas
//!
//! An election is created on the ledger through a fixed sequence of
//! writes. Each write may fail, time out, or be redelivered to another
//! worker, so everything needed to resume it lives in plain serializable
//! records owned by the job substrate.
//!
//! # Key Concepts
//!
//! - **TransactionAttempt**: one ledger write, with every logical
//!   transaction id ever minted for it and an optional resume snapshot.
//! - **RetryAction**: the closed classification of a failed write.
//! - **ElectionStep**: the persisted step cursor of the saga.
//! - **WorkflowContext**: the full persisted state of one saga.
//! - **JobRecord**: a unit of work as held by the queue substrate.

#![deny(unsafe_code)]

mod attempt;
mod context;
mod election;
mod error;
mod job;
mod step;

pub use attempt::*;
pub use context::*;
pub use election::*;
pub use error::*;
pub use job::*;
pub use step::*;
