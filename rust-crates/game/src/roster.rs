//! Reload-or-create access to player records.
use crate::{
    error::{
        StorageError,
        SyncError,
    },
    ledger::Ledger,
    record::PlayerRecord,
    store::PlayerStore,
    sync::{
        RemoteSync,
        SyncStatus,
    },
};
use std::sync::Arc;
use tracing::{
    info,
    warn,
};

#[derive(Clone, Debug)]
pub struct Loaded {
    pub record: PlayerRecord,
    pub status: SyncStatus,
    /// The record did not exist before this call.
    pub created: bool,
}

pub struct Roster<S, L> {
    store: Arc<S>,
    sync: RemoteSync<S, L>,
}

impl<S: PlayerStore, L: Ledger> Roster<S, L> {
    pub fn new(store: Arc<S>, sync: RemoteSync<S, L>) -> Self {
        Self { store, sync }
    }

    /// Returns the cached record for `name`. Unknown players get a default
    /// record which is persisted and then synced once. A failed sync leaves
    /// the default record in place and reports it as stale.
    pub async fn get(&self, name: &str) -> Result<Loaded, StorageError> {
        if let Some(record) = self.store.load(name)? {
            return Ok(Loaded {
                record,
                status: SyncStatus::Cached,
                created: false,
            });
        }
        let record = PlayerRecord::new(name);
        self.store.put(&record)?;
        info!(player = name, "created player record");
        let (record, status) = match self.sync.sync(&record).await {
            Ok(synced) => (synced, SyncStatus::Synced),
            Err(SyncError::Storage(err)) => return Err(err),
            Err(SyncError::Ledger(err)) => {
                warn!(player = name, error = %err, "initial sync failed");
                (record, SyncStatus::Stale(err.to_string()))
            }
        };
        Ok(Loaded {
            record,
            status,
            created: true,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        catalog::GameCatalog,
        ledger::InMemoryLedger,
        record::Location,
        store::InMemoryPlayerStore,
    };

    fn roster() -> (
        Arc<InMemoryPlayerStore>,
        Arc<InMemoryLedger>,
        Roster<InMemoryPlayerStore, InMemoryLedger>,
    ) {
        let store = Arc::new(InMemoryPlayerStore::new());
        let ledger = Arc::new(InMemoryLedger::new(Arc::new(GameCatalog::default())));
        let sync = RemoteSync::new(store.clone(), ledger.clone());
        (store.clone(), ledger, Roster::new(store, sync))
    }

    #[tokio::test]
    async fn get__unknown_player__creates_synced_default_record() {
        // given
        let (store, _ledger, roster) = roster();

        // when
        let loaded = roster.get("alice").await.unwrap();

        // then
        assert!(loaded.created);
        assert_eq!(loaded.status, SyncStatus::Synced);
        assert_eq!(loaded.record.gold(), 0);
        assert_eq!(loaded.record.pylon(), 0);
        assert!(loaded.record.items().is_empty());
        assert_eq!(loaded.record.location(), Location::Home);
        assert!(loaded.record.credential().is_some());
        assert_eq!(store.load("alice").unwrap(), Some(loaded.record));
    }

    #[tokio::test]
    async fn get__called_twice__returns_identical_record() {
        // given
        let (_store, _ledger, roster) = roster();
        let first = roster.get("alice").await.unwrap();

        // when
        let second = roster.get("alice").await.unwrap();

        // then
        assert!(!second.created);
        assert_eq!(second.status, SyncStatus::Cached);
        assert_eq!(second.record, first.record);
    }

    #[tokio::test]
    async fn get__unknown_player_with_ledger_down__is_stale_but_persisted() {
        // given
        let (store, ledger, roster) = roster();
        ledger.set_outage(Some("timeout"));

        // when
        let loaded = roster.get("alice").await.unwrap();

        // then
        assert!(matches!(loaded.status, SyncStatus::Stale(_)));
        assert_eq!(loaded.record, PlayerRecord::new("alice"));
        assert_eq!(store.load("alice").unwrap(), Some(PlayerRecord::new("alice")));
    }

    #[tokio::test]
    async fn get__with_store_unavailable__fails() {
        let (store, _ledger, roster) = roster();
        store.set_unavailable(true);

        let result = roster.get("alice").await;

        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }
}
