use super::{
    PlayerStore,
    WriteLocks,
    hold,
    poisoned,
};
use crate::{
    error::StorageError,
    record::PlayerRecord,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};

/// Volatile store for tests and throwaway sessions. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryPlayerStore {
    records: Arc<Mutex<HashMap<String, PlayerRecord>>>,
    locks: Arc<WriteLocks>,
    closed: Arc<AtomicBool>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the medium were gone.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("disk full".to_string()));
        }
        Ok(())
    }
}

impl PlayerStore for InMemoryPlayerStore {
    fn load(&self, name: &str) -> Result<Option<PlayerRecord>, StorageError> {
        self.check()?;
        let records = self.records.lock().map_err(poisoned)?;
        Ok(records.get(name).cloned())
    }

    fn put(&self, record: &PlayerRecord) -> Result<(), StorageError> {
        self.check()?;
        let lock = self.locks.for_player(record.name())?;
        let _guard = hold(&lock)?;
        let mut records = self.records.lock().map_err(poisoned)?;
        records.insert(record.name().to_string(), record.clone());
        Ok(())
    }

    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(&mut PlayerRecord),
    ) -> Result<Option<PlayerRecord>, StorageError> {
        self.check()?;
        let lock = self.locks.for_player(name)?;
        let _guard = hold(&lock)?;
        let mut records = self.records.lock().map_err(poisoned)?;
        Ok(records.get_mut(name).map(|record| {
            apply(record);
            record.clone()
        }))
    }

    fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
