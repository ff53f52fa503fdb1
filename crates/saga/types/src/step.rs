//! The election saga step cursor

use crate::SagaError;
use serde::{Deserialize, Serialize};

/// Persisted cursor of the election saga: the next step to execute.
///
/// Steps form a fixed total order and are persisted as their ordinal
/// (1 through 5). Any other persisted value is corrupted state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ElectionStep {
    CreateElection = 1,
    CreateCandidates = 2,
    RegisterIdentities = 3,
    CreateBallots = 4,
    Finish = 5,
}

impl ElectionStep {
    /// Every step in execution order.
    pub const ALL: [ElectionStep; 5] = [
        ElectionStep::CreateElection,
        ElectionStep::CreateCandidates,
        ElectionStep::RegisterIdentities,
        ElectionStep::CreateBallots,
        ElectionStep::Finish,
    ];

    pub fn first() -> Self {
        ElectionStep::CreateElection
    }

    /// 1-based position in the fixed order.
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    /// The step that follows, or `None` for `Finish`.
    pub fn next(&self) -> Option<Self> {
        match self {
            ElectionStep::CreateElection => Some(ElectionStep::CreateCandidates),
            ElectionStep::CreateCandidates => Some(ElectionStep::RegisterIdentities),
            ElectionStep::RegisterIdentities => Some(ElectionStep::CreateBallots),
            ElectionStep::CreateBallots => Some(ElectionStep::Finish),
            ElectionStep::Finish => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ElectionStep::Finish)
    }

    /// Whether the election id must already be derived when this step runs.
    pub fn requires_election_id(&self) -> bool {
        *self > ElectionStep::CreateElection
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElectionStep::CreateElection => "create_election",
            ElectionStep::CreateCandidates => "create_candidates",
            ElectionStep::RegisterIdentities => "register_identities",
            ElectionStep::CreateBallots => "create_ballots",
            ElectionStep::Finish => "finish",
        }
    }
}

impl TryFrom<u8> for ElectionStep {
    type Error = SagaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ElectionStep::ALL
            .into_iter()
            .find(|step| step.ordinal() == value)
            .ok_or(SagaError::InvalidStep(u64::from(value)))
    }
}

impl From<ElectionStep> for u8 {
    fn from(step: ElectionStep) -> Self {
        step.ordinal()
    }
}

impl std::fmt::Display for ElectionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
