//! Workflow context: the persisted state of one election saga

use crate::{ElectionRequest, ElectionStep, Result, SagaError, TransactionAttempt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outputs of completed steps, each written once by the step producing it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedData {
    /// Ledger-assigned election id, set by `CreateElection`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_id: Option<String>,
    /// Content hashes whose identity registration succeeded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registered_identities: Vec<String>,
}

/// Full state of one election saga.
///
/// Owned by a single worker at a time and mutated only by the saga runner
/// between persisted steps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// Next step to execute.
    pub step: ElectionStep,
    /// Identity on whose behalf the saga runs.
    pub owner_id: String,
    /// Original request payload.
    pub input: ElectionRequest,
    /// Accumulated outputs of completed steps.
    #[serde(default)]
    pub derived: DerivedData,
    /// Ledger write attempts, one per ledger-writing step.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attempts: BTreeMap<ElectionStep, TransactionAttempt>,
    /// Final human-readable outcome, only set once the saga finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowContext {
    pub fn new(owner_id: impl Into<String>, input: ElectionRequest) -> Self {
        let now = Utc::now();
        Self {
            step: ElectionStep::first(),
            owner_id: owner_id.into(),
            input,
            derived: DerivedData::default(),
            attempts: BTreeMap::new(),
            terminal_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.step.is_terminal()
    }

    /// The derived election id; its absence after `CreateElection` is corruption.
    pub fn election_id(&self) -> Result<&str> {
        self.derived.election_id.as_deref().ok_or_else(|| {
            SagaError::CorruptedContext(format!("step {} has no election id", self.step))
        })
    }

    /// The attempt persisted for a step, or a fresh one.
    pub fn attempt_for(&self, step: ElectionStep) -> TransactionAttempt {
        self.attempts.get(&step).cloned().unwrap_or_default()
    }

    pub fn with_attempt(mut self, step: ElectionStep, attempt: TransactionAttempt) -> Self {
        self.attempts.insert(step, attempt);
        self
    }

    /// The context moved to the next step.
    ///
    /// Fails on `Finish`, which has no successor.
    pub fn advanced(mut self) -> Result<Self> {
        let next = self.step.next().ok_or_else(|| {
            SagaError::InvalidTransition(format!("no step follows {}", self.step))
        })?;
        self.step = next;
        self.updated_at = Utc::now();
        Ok(self)
    }

    /// Check the cross-field invariants of persisted state.
    pub fn check_invariants(&self) -> Result<()> {
        match (self.step.requires_election_id(), &self.derived.election_id) {
            (true, None) => Err(SagaError::CorruptedContext(format!(
                "step {} has no election id",
                self.step
            ))),
            (false, Some(_)) => Err(SagaError::CorruptedContext(
                "election id present before it was created".into(),
            )),
            _ => Ok(()),
        }?;
        if self.terminal_status.is_some() && !self.is_terminal() {
            return Err(SagaError::CorruptedContext(format!(
                "terminal status set at step {}",
                self.step
            )));
        }
        Ok(())
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode persisted job data.
    ///
    /// An unknown step cursor yields [`SagaError::InvalidStep`] rather than a
    /// generic serialization error so callers can treat it as fatal.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value.get("step") {
            Some(serde_json::Value::Number(n)) => {
                let raw = n
                    .as_u64()
                    .ok_or_else(|| SagaError::CorruptedContext(format!("step cursor {n}")))?;
                let ordinal = u8::try_from(raw).map_err(|_| SagaError::InvalidStep(raw))?;
                ElectionStep::try_from(ordinal)?;
            }
            Some(other) => {
                return Err(SagaError::CorruptedContext(format!("step cursor {other}")));
            }
            None => return Err(SagaError::CorruptedContext("missing step cursor".into())),
        }
        let context: Self = serde_json::from_value(value)?;
        context.check_invariants()?;
        Ok(context)
    }
}
