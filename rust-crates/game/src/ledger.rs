//! Boundary to the remote ledger that owns balances, inventory and offers.
use crate::{
    catalog::OperationDescriptor,
    error::LedgerError,
    market::Offer,
    record::{
        AccountState,
        Credential,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::fmt;

mod in_memory;

pub use in_memory::{
    InMemoryLedger,
    Script,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The player on whose behalf an operation is submitted.
#[derive(Clone, Debug)]
pub struct Signer {
    pub player: String,
    pub credential: Credential,
}

impl Signer {
    /// Hex digest binding the operation to the player's credential.
    pub fn sign(&self, descriptor: &OperationDescriptor) -> Result<String, LedgerError> {
        let payload = serde_json::to_vec(descriptor)
            .map_err(|err| LedgerError::Submission(format!("malformed operation: {err}")))?;
        let mut hasher = Sha256::new();
        hasher.update(self.credential.expose().as_bytes());
        hasher.update(self.player.as_bytes());
        hasher.update(&payload);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// What the ledger reported for a confirmed operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub message: String,
    pub amount: Option<u64>,
}

/// A confirmed operation as shown to the player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationReport {
    pub operation_id: OperationId,
    pub confirmation: Confirmation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollStatus {
    Confirmed(Confirmation),
    Pending,
    Rejected(String),
}

pub trait Ledger: Send + Sync + 'static {
    /// Hands a signed operation to the ledger. Returns as soon as the ledger
    /// has accepted it for inclusion.
    fn submit_operation(
        &self,
        signer: &Signer,
        descriptor: &OperationDescriptor,
    ) -> impl Future<Output = Result<OperationId, LedgerError>> + Send;

    fn poll_operation(
        &self,
        id: &OperationId,
    ) -> impl Future<Output = Result<PollStatus, LedgerError>> + Send;

    /// Authoritative balances, inventory and characters. Unknown players
    /// have an empty account.
    fn query_account(
        &self,
        player: &str,
    ) -> impl Future<Output = Result<AccountState, LedgerError>> + Send;

    fn provision_credential(
        &self,
        player: &str,
    ) -> impl Future<Output = Result<Credential, LedgerError>> + Send;

    fn list_offers(&self) -> impl Future<Output = Result<Vec<Offer>, LedgerError>> + Send;
}
