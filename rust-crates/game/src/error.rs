use thiserror::Error;

/// The persistent player cache is unusable. Fatal to a session.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("player store is closed")]
    Closed,
    #[error("player store unavailable: {0}")]
    Unavailable(String),
    #[error("stored record for `{name}` is corrupt")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// Failures reported by the remote ledger boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger refused the operation outright.
    #[error("submission rejected: {0}")]
    Submission(String),
    #[error("ledger unreachable: {0}")]
    Network(String),
    #[error("unexpected ledger response: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SyncError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Storage(_))
    }
}

/// Synchronous validation failures raised while resolving an action.
///
/// These never leave the Select/Enter stage that detected them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("{0}")]
    Catalog(String),
    #[error("insufficient {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: &'static str,
        needed: u64,
        available: u64,
    },
    #[error("`{raw}` is not a valid {field}")]
    InvalidInput { field: &'static str, raw: String },
}

impl ActionError {
    pub fn catalog(reason: impl Into<String>) -> Self {
        ActionError::Catalog(reason.into())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage failed")]
    Storage(#[from] StorageError),
}
