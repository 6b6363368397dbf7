// Sled-backed player store.
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
use sled::{
    Config,
    Db,
    Tree,
};
use std::{
    path::Path,
    sync::RwLock,
};
use tracing::{
    debug,
    info,
};

const PLAYERS_TREE: &str = "players";

struct Handles {
    db: Db,
    players: Tree,
}

pub struct SledPlayerStore {
    handles: RwLock<Option<Handles>>,
    locks: WriteLocks,
}

impl SledPlayerStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let players = db.open_tree(PLAYERS_TREE)?;
        Ok(Self {
            handles: RwLock::new(Some(Handles { db, players })),
            locks: WriteLocks::default(),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| StorageError::Unavailable(err.to_string()))?;
        }
        let db = Config::default().path(path).open()?;
        info!(path = %path.display(), "opened player store");
        Self::new(db)
    }

    fn with_tree<T>(
        &self,
        f: impl FnOnce(&Tree) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let handles = self.handles.read().map_err(poisoned)?;
        let handles = handles.as_ref().ok_or(StorageError::Closed)?;
        f(&handles.players)
    }
}

fn serialize_record(record: &PlayerRecord) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(record).map_err(|source| StorageError::Corrupt {
        name: record.name().to_string(),
        source,
    })
}

fn deserialize_record(name: &str, bytes: &[u8]) -> Result<PlayerRecord, StorageError> {
    serde_json::from_slice(bytes).map_err(|source| StorageError::Corrupt {
        name: name.to_string(),
        source,
    })
}

fn write(tree: &Tree, record: &PlayerRecord) -> Result<(), StorageError> {
    let bytes = serialize_record(record)?;
    tree.insert(record.name().as_bytes(), bytes)?;
    tree.flush()?;
    Ok(())
}

impl PlayerStore for SledPlayerStore {
    fn load(&self, name: &str) -> Result<Option<PlayerRecord>, StorageError> {
        self.with_tree(|tree| {
            tree.get(name.as_bytes())?
                .map(|bytes| deserialize_record(name, &bytes))
                .transpose()
        })
    }

    fn put(&self, record: &PlayerRecord) -> Result<(), StorageError> {
        let lock = self.locks.for_player(record.name())?;
        let _guard = hold(&lock)?;
        self.with_tree(|tree| write(tree, record))
    }

    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(&mut PlayerRecord),
    ) -> Result<Option<PlayerRecord>, StorageError> {
        let lock = self.locks.for_player(name)?;
        let _guard = hold(&lock)?;
        self.with_tree(|tree| {
            let Some(bytes) = tree.get(name.as_bytes())? else {
                return Ok(None);
            };
            let mut record = deserialize_record(name, &bytes)?;
            apply(&mut record);
            write(tree, &record)?;
            Ok(Some(record))
        })
    }

    fn close(&self) -> Result<(), StorageError> {
        let mut handles = self.handles.write().map_err(poisoned)?;
        match handles.take() {
            Some(Handles { db, .. }) => {
                db.flush()?;
                info!("closed player store");
            }
            None => debug!("player store already closed"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::record::{
        AccountState,
        Credential,
        Item,
        ItemKind,
        Location,
    };
    use chrono::Utc;
    use std::{
        sync::mpsc,
        thread,
        time::Duration,
    };
    use tempdir::TempDir;

    fn sled_db(temp_dir: &TempDir) -> Db {
        Config::default()
            .path(temp_dir.path())
            .open()
            .expect("open sled db")
    }

    fn synced_record(name: &str) -> PlayerRecord {
        let mut record = PlayerRecord::new(name);
        record.set_location(Location::Shop);
        record.set_credential(Credential::new("secret"));
        record.record_operation("op-7");
        record.apply_account(
            AccountState {
                gold: 90,
                pylon: 4,
                items: vec![Item {
                    id: "sword".into(),
                    kind: ItemKind::WoodenSword,
                    level: 1,
                    attack: 3,
                }],
                characters: vec![],
            },
            Utc::now(),
        );
        record
    }

    #[test]
    fn sut__when_putting_record_then_load_returns_equal_record() {
        // given
        let temp_dir = TempDir::new("sled_player_store").unwrap();
        let store = SledPlayerStore::new(sled_db(&temp_dir)).unwrap();
        let record = synced_record("alice");

        // when
        store.put(&record).unwrap();

        // then
        assert_eq!(store.load("alice").unwrap(), Some(record));
        assert_eq!(store.load("bob").unwrap(), None);
    }

    #[test]
    fn sut__when_reopened_then_records_survive() {
        // given
        let temp_dir = TempDir::new("sled_player_store").unwrap();
        let record = synced_record("alice");
        {
            let store = SledPlayerStore::open(temp_dir.path().join("players.db")).unwrap();
            store.put(&record).unwrap();
            store.close().unwrap();
        }

        // when
        let store = SledPlayerStore::open(temp_dir.path().join("players.db")).unwrap();

        // then
        assert_eq!(store.load("alice").unwrap(), Some(record));
    }

    #[test]
    fn sut__when_updating_missing_record_then_nothing_is_written() {
        // given
        let temp_dir = TempDir::new("sled_player_store").unwrap();
        let store = SledPlayerStore::new(sled_db(&temp_dir)).unwrap();

        // when
        let updated = store
            .update("ghost", &mut |record| record.set_location(Location::Forest))
            .unwrap();

        // then
        assert_eq!(updated, None);
        assert_eq!(store.load("ghost").unwrap(), None);
    }

    #[test]
    fn sut__when_updating_then_change_is_persisted() {
        // given
        let temp_dir = TempDir::new("sled_player_store").unwrap();
        let store = SledPlayerStore::new(sled_db(&temp_dir)).unwrap();
        store.put(&synced_record("alice")).unwrap();

        // when
        let updated = store
            .update("alice", &mut |record| record.set_location(Location::Market))
            .unwrap()
            .unwrap();

        // then
        assert_eq!(updated.location(), Location::Market);
        assert_eq!(updated.gold(), 90);
        assert_eq!(store.load("alice").unwrap(), Some(updated));
    }

    #[test]
    fn sut__when_writing_from_many_threads_then_every_record_stays_intact() {
        // given
        let temp_dir = TempDir::new("sled_player_store").unwrap();
        let store = SledPlayerStore::new(sled_db(&temp_dir)).unwrap();
        let names = ["alice", "bob", "carol", "dave"];
        let rounds = 20;

        // when
        thread::scope(|scope| {
            for (writer, name) in names.iter().enumerate() {
                let store = &store;
                scope.spawn(move || {
                    for round in 0..rounds {
                        let mut own = synced_record(name);
                        own.record_operation(format!("{name}-{round}"));
                        store.put(&own).unwrap();
                        store
                            .update(name, &mut |record| record.set_location(Location::Forest))
                            .unwrap();
                        let mut shared = synced_record("shared");
                        shared.record_operation(format!("writer-{writer}-{round}"));
                        store.put(&shared).unwrap();
                    }
                });
            }
        });

        // then
        for name in names {
            let loaded = store.load(name).unwrap().unwrap();
            let expected = format!("{name}-{}", rounds - 1);
            assert_eq!(loaded.last_operation(), Some(expected.as_str()));
            assert_eq!(loaded.location(), Location::Forest);
            assert_eq!(loaded.gold(), 90);
        }
        // the last completed write is some writer's final round
        let shared = store.load("shared").unwrap().unwrap();
        let last = shared.last_operation().unwrap();
        assert!(last.starts_with("writer-"));
        assert!(last.ends_with(&format!("-{}", rounds - 1)));
        assert_eq!(shared.gold(), 90);
        assert_eq!(shared.items().len(), 1);
    }

    #[test]
    fn sut__when_one_player_is_mid_update_then_other_players_can_still_write() {
        // given
        let temp_dir = TempDir::new("sled_player_store").unwrap();
        let store = SledPlayerStore::new(sled_db(&temp_dir)).unwrap();
        store.put(&synced_record("alice")).unwrap();
        let (done_tx, done_rx) = mpsc::channel();
        let mut bob_written_meanwhile = false;

        // when
        thread::scope(|scope| {
            store
                .update("alice", &mut |record| {
                    let store = &store;
                    let done_tx = done_tx.clone();
                    scope.spawn(move || {
                        store.put(&synced_record("bob")).unwrap();
                        done_tx.send(()).unwrap();
                    });
                    bob_written_meanwhile =
                        done_rx.recv_timeout(Duration::from_secs(5)).is_ok();
                    record.set_location(Location::Market);
                })
                .unwrap();
        });

        // then
        assert!(bob_written_meanwhile);
        assert!(store.load("bob").unwrap().is_some());
        assert_eq!(
            store.load("alice").unwrap().map(|record| record.location()),
            Some(Location::Market)
        );
    }

    #[test]
    fn sut__when_closed_twice_then_second_close_is_noop_and_access_fails() {
        // given
        let temp_dir = TempDir::new("sled_player_store").unwrap();
        let store = SledPlayerStore::new(sled_db(&temp_dir)).unwrap();

        // when
        store.close().unwrap();
        store.close().unwrap();

        // then
        assert!(matches!(store.load("alice"), Err(StorageError::Closed)));
        assert!(matches!(
            store.put(&PlayerRecord::new("alice")),
            Err(StorageError::Closed)
        ));
    }

    #[test]
    fn sut__when_stored_bytes_are_garbage_then_load_reports_corruption() {
        // given
        let temp_dir = TempDir::new("sled_player_store").unwrap();
        let db = sled_db(&temp_dir);
        db.open_tree(PLAYERS_TREE)
            .unwrap()
            .insert("alice", b"not json".to_vec())
            .unwrap();
        let store = SledPlayerStore::new(db).unwrap();

        // when
        let result = store.load("alice");

        // then
        assert!(matches!(result, Err(StorageError::Corrupt { name, .. }) if name == "alice"));
    }
}
