//! Election saga engine
//!
//! Executes ledger writes so that a crash or retry never loses track of
//! an in-flight transaction, and drives the election creation saga on top
//! of them:
//!
//! - [`classify`] decides whether a failed write reuses its transaction id,
//!   mints a new one, or is settled
//! - [`SubmissionUnit`] checkpoints the transaction identity before every
//!   ledger call
//! - [`SagaRunner`] advances the step cursor one persisted step at a time
//! - [`Worker`] pulls jobs from a [`JobQueue`] and maps outcomes back onto it
//! - [`ElectionService`] is the facade the HTTP layer calls

#![deny(unsafe_code)]

pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod error_mapping;
pub mod ledger;
pub mod progress;
pub mod queue;
pub mod runner;
pub mod service;
pub mod settle;
pub mod simulation;
pub mod steps;
pub mod submission;
pub mod telemetry;
pub mod worker;

pub use checkpoint::{AttemptCheckpoint, StepCheckpoint, SubmissionCheckpoint};
pub use classifier::classify;
pub use crate::config::{
    BackoffKind, EngineConfig, LedgerConfig, LoggingConfig, QueueConfig, RetryConfig,
    WorkerConfig,
};
pub use error_mapping::{ErrorMapper, ErrorRule, RawLedgerFailure};
pub use ledger::{IdentityRegistrar, LedgerClient, TransactionHandle};
pub use progress::{progress, progress_for_step};
pub use queue::{InMemoryJobQueue, JobQueue};
pub use runner::{SagaOutcome, SagaRunner};
pub use service::ElectionService;
pub use settle::{settle_all, Settled};
pub use simulation::{RecordedSubmission, SimulatedLedger, SimulatedRegistrar};
pub use steps::{StepFailure, StepRegistry};
pub use submission::{SubmissionError, SubmissionUnit};
pub use telemetry::init_tracing;
pub use worker::{JobDisposition, Worker};

// Re-export the data model
pub use evote_saga_types as types;
