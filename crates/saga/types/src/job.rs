//! Job records as held by the durable queue substrate

use crate::{Result, TransactionAttempt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Job Identifier ───────────────────────────────────────────────────

/// Unique identifier for a queued job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first eight characters, for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Job Records ──────────────────────────────────────────────────────

/// Which processor handles a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A single idempotent ledger write.
    Submission,
    /// A multi-step election saga.
    Workflow,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Submission => write!(f, "submission"),
            JobKind::Workflow => write!(f, "workflow"),
        }
    }
}

/// Lifecycle state of a job in the substrate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// What a finished job returned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    pub fn payload(payload: Vec<u8>) -> Self {
        Self {
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// A job as stored by the queue substrate.
///
/// `data` is opaque to the substrate; processors decode it by `kind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub name: String,
    pub data: serde_json::Value,
    pub state: JobState,
    /// Deliveries started so far.
    pub attempts_made: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest time a delayed job may be delivered again.
    pub available_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(kind: JobKind, name: impl Into<String>, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            kind,
            name: name.into(),
            data,
            state: JobState::Waiting,
            attempts_made: 0,
            result: None,
            failed_reason: None,
            created_at: now,
            updated_at: now,
            available_at: now,
            finished_at: None,
        }
    }
}

// ── Submission Jobs ──────────────────────────────────────────────────

/// Data of a single-step submission job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionJob {
    pub owner_id: String,
    pub call_name: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub attempt: TransactionAttempt,
}

impl SubmissionJob {
    pub fn new(owner_id: impl Into<String>, call_name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            call_name: call_name.into(),
            args,
            attempt: TransactionAttempt::new(),
        }
    }

    /// Queue-visible job name.
    pub fn job_name(&self) -> String {
        format!("submit {} transaction", self.call_name)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Caller-facing view of a submission job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub tx_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_error: Option<String>,
}

/// Polling view of a saga's progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// 0 to 100.
    pub percent: u8,
    pub is_terminal: bool,
}
