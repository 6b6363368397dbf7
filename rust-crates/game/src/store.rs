//! Durable cache of player records keyed by player name.
use crate::{
    error::StorageError,
    record::PlayerRecord,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

mod in_memory_storage;
mod sled_storage;

pub use in_memory_storage::InMemoryPlayerStore;
pub use sled_storage::SledPlayerStore;

pub trait PlayerStore: Send + Sync + 'static {
    /// Returns the stored record, if any.
    fn load(&self, name: &str) -> Result<Option<PlayerRecord>, StorageError>;

    /// Overwrites the stored record for `record.name()`.
    fn put(&self, record: &PlayerRecord) -> Result<(), StorageError>;

    /// Read-modify-write of an existing record under the per-player write
    /// lock. Returns the updated record, or `None` if nothing is stored.
    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(&mut PlayerRecord),
    ) -> Result<Option<PlayerRecord>, StorageError>;

    /// Releases the underlying handle. Calling it again is a no-op.
    fn close(&self) -> Result<(), StorageError>;
}

/// One write lock per player name so writers for different players never
/// wait on each other.
#[derive(Default)]
pub(crate) struct WriteLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WriteLocks {
    pub(crate) fn for_player(&self, name: &str) -> Result<Arc<Mutex<()>>, StorageError> {
        let mut locks = self.locks.lock().map_err(poisoned)?;
        Ok(locks.entry(name.to_string()).or_default().clone())
    }
}

pub(crate) fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Unavailable("store lock poisoned".to_string())
}

pub(crate) fn hold(lock: &Mutex<()>) -> Result<MutexGuard<'_, ()>, StorageError> {
    lock.lock().map_err(poisoned)
}
