//! Election request payloads and the records written to the ledger

use crate::{Result, SagaError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Document type tag carried by every chaincode record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocType {
    Election,
    Participant,
    Ballot,
    Candidate,
}

/// A candidate standing in an election.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(rename = "candidateID", default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    pub candidate_name: String,
    pub candidate_description: String,
    #[serde(rename = "candidatePhotoURL", default, skip_serializing_if = "Option::is_none")]
    pub candidate_photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocType>,
}

impl Candidate {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            candidate_id: None,
            candidate_name: name.into(),
            candidate_description: description.into(),
            candidate_photo_url: None,
            doc_type: None,
        }
    }

    /// The candidate as submitted to the ledger.
    pub fn tagged(&self) -> Self {
        Self {
            doc_type: Some(DocType::Candidate),
            ..self.clone()
        }
    }
}

/// A voter registered for an election.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "participantID", default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<u64>,
    #[serde(rename = "participantRegisterID")]
    pub participant_register_id: u64,
    pub participant_name: String,
    #[serde(rename = "electionID", default, skip_serializing_if = "Option::is_none")]
    pub election_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocType>,
}

impl Participant {
    pub fn new(register_id: u64, name: impl Into<String>) -> Self {
        Self {
            participant_id: None,
            participant_register_id: register_id,
            participant_name: name.into(),
            election_id: None,
            doc_type: None,
        }
    }

    /// Hex SHA-256 of the participant record tagged as `Participant`.
    ///
    /// The same participant always yields the same hash, so identity
    /// registration and ballot creation agree on it.
    pub fn content_hash(&self) -> Result<String> {
        let tagged = Self {
            doc_type: Some(DocType::Participant),
            ..self.clone()
        };
        let bytes = serde_json::to_vec(&tagged)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// The request payload that starts an election saga.
///
/// Immutable for the life of the saga.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionRequest {
    pub election_name: String,
    pub election_date: Vec<String>,
    pub election_location: String,
    pub candidate_list: Vec<Candidate>,
    pub participant_list: Vec<Participant>,
}

impl ElectionRequest {
    /// Reject requests with empty required fields.
    pub fn validate(&self) -> Result<()> {
        let missing = [
            ("electionName", self.election_name.trim().is_empty()),
            ("electionDate", self.election_date.is_empty()),
            ("electionLocation", self.election_location.trim().is_empty()),
            ("candidateList", self.candidate_list.is_empty()),
            ("participantList", self.participant_list.is_empty()),
        ];
        match missing.iter().find(|(_, empty)| *empty) {
            Some((field, _)) => Err(SagaError::InvalidInput(format!("{field} must not be empty"))),
            None => Ok(()),
        }
    }
}

/// The election document submitted by `CreateElection`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionRecord {
    pub election_name: String,
    pub election_date: Vec<String>,
    pub election_location: String,
    pub election_show_result: bool,
    pub owner: String,
    pub doc_type: DocType,
}

impl ElectionRecord {
    pub fn from_request(request: &ElectionRequest, owner: impl Into<String>) -> Self {
        Self {
            election_name: request.election_name.clone(),
            election_date: request.election_date.clone(),
            election_location: request.election_location.clone(),
            election_show_result: false,
            owner: owner.into(),
            doc_type: DocType::Election,
        }
    }
}

/// JSON envelope returned by chaincode functions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LedgerResponse {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| SagaError::UnexpectedResponse(format!("not a chaincode response: {e}")))
    }

    /// The `message` field, which carries the result of a chaincode call.
    pub fn into_message(self) -> Result<String> {
        self.message
            .ok_or_else(|| SagaError::UnexpectedResponse("response has no message".into()))
    }
}
