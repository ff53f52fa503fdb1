//! Capabilities consumed from the ledger client and certificate authority
//!
//! Connection setup, wallets and wire decoding live behind these traits.

use async_trait::async_trait;
use evote_saga_types::{IdentityError, LedgerWriteError, Result};
use serde::{Deserialize, Serialize};

/// One logical ledger transaction, identified by the id the client minted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHandle {
    pub transaction_id: String,
    pub call_name: String,
    pub owner_id: String,
}

/// Write path of the ledger client.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Mint a new logical transaction for a chaincode function.
    fn create_transaction(&self, owner_id: &str, call_name: &str) -> Result<TransactionHandle>;

    /// Snapshot an uncommitted transaction so it can be resumed elsewhere.
    fn serialize(&self, handle: &TransactionHandle) -> Result<Vec<u8>>;

    /// Rebuild a transaction from its snapshot, keeping its id.
    fn deserialize(&self, owner_id: &str, state: &[u8]) -> Result<TransactionHandle>;

    /// Endorse, order and wait for commit of the transaction.
    async fn submit(
        &self,
        handle: &TransactionHandle,
        args: &[String],
    ) -> std::result::Result<Vec<u8>, LedgerWriteError>;
}

/// Registers ledger identities for election participants.
#[async_trait]
pub trait IdentityRegistrar: Send + Sync {
    /// Register an identity named by `content_hash`, scoped to an election.
    ///
    /// Returns the enrollment secret issued for the identity.
    async fn register_identity(
        &self,
        content_hash: &str,
        election_id: &str,
        owner_id: &str,
    ) -> std::result::Result<String, IdentityError>;
}
