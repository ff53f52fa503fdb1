//! Simulated ledger and certificate authority
//!
//! Used by the daemon's local runs and by tests. Failures can be scripted
//! per chaincode function; they are mapped through the same
//! [`ErrorMapper`] a real client uses.

use crate::error_mapping::{ErrorMapper, RawLedgerFailure, DUPLICATE_TXID_CODE};
use crate::ledger::{IdentityRegistrar, LedgerClient, TransactionHandle};
use crate::steps::calls;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use evote_saga_types::{IdentityError, LedgerWriteError, Result, SagaError};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A submission as seen by the simulated ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub transaction_id: String,
    pub call_name: String,
    pub args: Vec<String>,
}

#[derive(Default)]
struct LedgerLog {
    committed: Vec<String>,
    submissions: Vec<RecordedSubmission>,
}

/// In-process ledger with at-most-once commit per transaction id.
pub struct SimulatedLedger {
    mapper: ErrorMapper,
    scripted: DashMap<String, VecDeque<RawLedgerFailure>>,
    log: Mutex<LedgerLog>,
    latency: Duration,
}

impl SimulatedLedger {
    pub fn new() -> Result<Self> {
        Ok(Self {
            mapper: ErrorMapper::new()?,
            scripted: DashMap::new(),
            log: Mutex::new(LedgerLog::default()),
            latency: Duration::ZERO,
        })
    }

    /// Delay every submission by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next submission of `call_name` with `failure`.
    ///
    /// Repeated calls queue further failures in order.
    pub fn fail_next(&self, call_name: &str, failure: RawLedgerFailure) {
        self.scripted
            .entry(call_name.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Scripted failures not yet consumed.
    pub fn pending_failures(&self) -> usize {
        self.scripted.iter().map(|entry| entry.len()).sum()
    }

    /// Transaction ids committed so far, in commit order.
    pub fn committed_ids(&self) -> Vec<String> {
        self.log().committed.clone()
    }

    /// Every submission received, failed ones included.
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.log().submissions.clone()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, LedgerLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_failure(&self, call_name: &str) -> Option<RawLedgerFailure> {
        self.scripted.get_mut(call_name)?.pop_front()
    }

    fn response(handle: &TransactionHandle) -> Vec<u8> {
        let message = match handle.call_name.as_str() {
            calls::CREATE_ELECTION => {
                let id = &handle.transaction_id;
                format!("election-{}", id.get(..12).unwrap_or(id))
            }
            calls::CREATE_BALLOT => "ballots created".to_string(),
            _ => handle.transaction_id.clone(),
        };
        serde_json::json!({ "message": message }).to_string().into_bytes()
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    fn create_transaction(&self, owner_id: &str, call_name: &str) -> Result<TransactionHandle> {
        Ok(TransactionHandle {
            transaction_id: uuid::Uuid::new_v4().simple().to_string(),
            call_name: call_name.to_string(),
            owner_id: owner_id.to_string(),
        })
    }

    fn serialize(&self, handle: &TransactionHandle) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(handle)?)
    }

    fn deserialize(&self, owner_id: &str, state: &[u8]) -> Result<TransactionHandle> {
        let handle: TransactionHandle = serde_json::from_slice(state)?;
        if handle.owner_id != owner_id {
            return Err(SagaError::CorruptedContext(format!(
                "transaction {} belongs to another identity",
                handle.transaction_id
            )));
        }
        Ok(handle)
    }

    async fn submit(
        &self,
        handle: &TransactionHandle,
        args: &[String],
    ) -> std::result::Result<Vec<u8>, LedgerWriteError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let txid = &handle.transaction_id;
        let mut log = self.log();
        log.submissions.push(RecordedSubmission {
            transaction_id: txid.clone(),
            call_name: handle.call_name.clone(),
            args: args.to_vec(),
        });

        if log.committed.contains(txid) {
            let raw = RawLedgerFailure::message(format!("transaction {txid} already committed"))
                .with_transaction_code(DUPLICATE_TXID_CODE);
            return Err(self.mapper.map(txid, &raw));
        }
        if let Some(raw) = self.next_failure(&handle.call_name) {
            return Err(self.mapper.map(txid, &raw));
        }

        log.committed.push(txid.clone());
        Ok(Self::response(handle))
    }
}

/// In-process certificate authority.
#[derive(Default)]
pub struct SimulatedRegistrar {
    failing: DashSet<String>,
    registered: DashMap<String, String>,
}

impl SimulatedRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every registration of `content_hash`.
    pub fn fail_for(&self, content_hash: &str) {
        self.failing.insert(content_hash.to_string());
    }

    /// Election id an identity was registered for.
    pub fn registered_for(&self, content_hash: &str) -> Option<String> {
        self.registered.get(content_hash).map(|e| e.clone())
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }
}

#[async_trait]
impl IdentityRegistrar for SimulatedRegistrar {
    async fn register_identity(
        &self,
        content_hash: &str,
        election_id: &str,
        _owner_id: &str,
    ) -> std::result::Result<String, IdentityError> {
        if self.failing.contains(content_hash) {
            return Err(IdentityError::refused(content_hash, "registration refused"));
        }
        if self.registered.contains_key(content_hash) {
            return Err(IdentityError::already_registered(content_hash));
        }

        self.registered
            .insert(content_hash.to_string(), election_id.to_string());
        Ok(format!("secret-{}", content_hash.get(..8).unwrap_or(content_hash)))
    }
}
