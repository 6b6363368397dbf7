#![allow(non_snake_case)]

use chrono::Utc;
use loud_game::{
    catalog::GameCatalog,
    ledger::InMemoryLedger,
    record::{
        AccountState,
        Item,
        ItemKind,
        Location,
        PlayerRecord,
    },
    roster::Roster,
    store::{
        PlayerStore,
        SledPlayerStore,
    },
    sync::RemoteSync,
};
use proptest::prelude::*;
use std::sync::Arc;
use tempdir::TempDir;
use tokio::runtime::Runtime;

prop_compose! {
    fn item()(id in "[a-z0-9]{1,8}", copper in any::<bool>(), level in 1u32..=2, attack in 0u32..50) -> Item {
        let kind = if copper { ItemKind::CopperSword } else { ItemKind::WoodenSword };
        Item { id, kind, level, attack }
    }
}

prop_compose! {
    fn account()(gold in any::<u64>(), pylon in any::<u64>(), items in prop::collection::vec(item(), 0..6)) -> AccountState {
        AccountState { gold, pylon, items, characters: Vec::new() }
    }
}

fn location() -> impl Strategy<Value = Location> {
    prop::sample::select(vec![
        Location::Home,
        Location::Forest,
        Location::Shop,
        Location::Market,
        Location::Develop,
        Location::Settings,
    ])
}

fn sled_store(dir: &TempDir) -> Arc<SledPlayerStore> {
    Arc::new(SledPlayerStore::open(dir.path().join("players.db")).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 16, .. ProptestConfig::default() })]
    #[test]
    fn roster_get__never_seen_name__creates_default_record_once(name in "[a-z]{1,12}") {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            _roster_get__never_seen_name__creates_default_record_once(name).await.unwrap()
        });
    }

    #[test]
    fn sled_store__reopened__returns_last_put_record(
        name in "[a-z]{1,12}",
        account in account(),
        location in location(),
    ) {
        // given
        let dir = TempDir::new("loud-store").unwrap();
        let mut record = PlayerRecord::new(name.clone());
        record.apply_account(account, Utc::now());
        record.set_location(location);
        let store = sled_store(&dir);
        store.put(&record).unwrap();
        store.close().unwrap();

        // when
        let reopened = sled_store(&dir);
        let loaded = reopened.load(&name).unwrap();

        // then
        prop_assert_eq!(loaded, Some(record));
    }

    #[test]
    fn apply_account__always_replaces_never_merges(first in account(), second in account()) {
        // given
        let mut record = PlayerRecord::new("alice");
        record.apply_account(first, Utc::now());

        // when
        record.apply_account(second.clone(), Utc::now());

        // then
        prop_assert_eq!(record.gold(), second.gold);
        prop_assert_eq!(record.pylon(), second.pylon);
        prop_assert!(record.items().iter().all(|item| second.items.contains(item)));
        let mut ids: Vec<&str> = record.items().iter().map(|item| item.id.as_str()).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), before);
    }
}

async fn _roster_get__never_seen_name__creates_default_record_once(
    name: String,
) -> Result<(), TestCaseError> {
    // given
    let dir = TempDir::new("loud-roster").unwrap();
    let store = sled_store(&dir);
    let ledger = Arc::new(InMemoryLedger::new(Arc::new(GameCatalog::default())));
    let roster = Roster::new(store.clone(), RemoteSync::new(store.clone(), ledger));

    // when
    let first = roster.get(&name).await.unwrap();
    let second = roster.get(&name).await.unwrap();

    // then
    prop_assert!(first.created);
    prop_assert!(!second.created);
    prop_assert_eq!(first.record.gold(), 0);
    prop_assert_eq!(first.record.pylon(), 0);
    prop_assert!(first.record.items().is_empty());
    prop_assert_eq!(first.record.location(), Location::Home);
    prop_assert_eq!(&first.record, &second.record);
    Ok(())
}
