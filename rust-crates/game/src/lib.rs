//! Game core for the LOUD terminal client.
//!
//! Every player action is a signed ledger operation. This crate owns the
//! cached player records, the mapping from actions to operations, the
//! session state machine and the background orchestration of submitted
//! operations. Rendering lives in the `loud-tui` crate.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod market;
pub mod orchestrator;
pub mod record;
pub mod roster;
pub mod session;
pub mod store;
pub mod sync;

pub use error::{
    ActionError,
    LedgerError,
    SessionError,
    StorageError,
    SyncError,
};
