#![allow(non_snake_case)]

use loud_game::{
    SessionError,
    catalog::{
        GameCatalog,
        RecipeEffect,
    },
    engine::Session,
    ledger::{
        InMemoryLedger,
        OperationId,
        Script,
    },
    market::{
        Board,
        Goods,
        Side,
    },
    orchestrator::{
        BackgroundEvent,
        Completion,
        PollSettings,
    },
    record::{
        CharacterKind,
        ItemKind,
        ItemSpec,
        Location,
    },
    session::{
        InputEvent,
        Menu,
        SessionState,
    },
    store::{
        InMemoryPlayerStore,
        PlayerStore,
    },
};
use std::{
    collections::HashMap,
    sync::Arc,
};
use tokio::sync::mpsc::UnboundedReceiver;

type TestSession = Session<InMemoryPlayerStore, InMemoryLedger>;

struct Harness {
    store: Arc<InMemoryPlayerStore>,
    ledger: Arc<InMemoryLedger>,
    catalog: Arc<GameCatalog>,
}

impl Harness {
    fn new(catalog: GameCatalog) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            store: Arc::new(InMemoryPlayerStore::new()),
            ledger: Arc::new(InMemoryLedger::new(catalog.clone())),
            catalog,
        }
    }

    async fn open(&self) -> (TestSession, UnboundedReceiver<BackgroundEvent>) {
        Session::open(
            "alice",
            self.store.clone(),
            self.ledger.clone(),
            self.catalog.clone(),
            PollSettings::default(),
        )
        .await
        .unwrap()
    }
}

fn catalog_with_wooden_sword_price(new_price: u64) -> GameCatalog {
    let defaults = GameCatalog::default();
    let recipes = defaults
        .recipes()
        .iter()
        .cloned()
        .map(|mut recipe| {
            if let RecipeEffect::BuyItem { item, price, .. } = &mut recipe.effect {
                if item.kind == ItemKind::WoodenSword {
                    *price = new_price;
                }
            }
            recipe
        })
        .collect();
    GameCatalog::new(recipes, defaults.pylon_grant())
}

fn press(session: &mut TestSession, events: &[InputEvent]) {
    for event in events {
        session.handle_input(event).unwrap();
    }
}

/// Feeds background events into the session until it shows a result.
async fn until_result(session: &mut TestSession, events: &mut UnboundedReceiver<BackgroundEvent>) {
    while !matches!(session.state(), SessionState::Result(_)) {
        let event = events.recv().await.unwrap();
        session.handle_background(event).unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn buy_item__confirmed__updates_balance_and_inventory_from_ledger() {
    // given
    let harness = Harness::new(catalog_with_wooden_sword_price(50));
    harness.ledger.fund("alice", 100, 0);
    let (mut session, mut events) = harness.open().await;
    press(&mut session, &[InputEvent::Travel(Location::Shop)]);

    // when
    press(
        &mut session,
        &[InputEvent::Open(Menu::Buy), InputEvent::Slot(0)],
    );
    assert_eq!(session.player().gold(), 100);
    until_result(&mut session, &mut events).await;

    // then
    let SessionState::Result(result) = session.state() else {
        unreachable!()
    };
    assert!(result.outcome.is_ok());
    assert_eq!(session.player().gold(), 50);
    let specs: Vec<ItemSpec> = session.player().items().iter().map(|item| item.spec()).collect();
    assert_eq!(specs, vec![ItemSpec::new(ItemKind::WoodenSword, 1)]);
    let stored = harness.store.load("alice").unwrap().unwrap();
    assert_eq!(stored.gold(), 50);
    assert_eq!(stored.location(), Location::Shop);

    // any key goes back to the shop list
    press(&mut session, &[InputEvent::Confirm]);
    assert!(matches!(session.state(), SessionState::Select(_)));
}

#[tokio::test(start_paused = true)]
async fn hunt__older_operation_finishing_last__never_overwrites_newer_result() {
    // given
    let harness = Harness::new(GameCatalog::default());
    harness.ledger.grant_character("alice", CharacterKind::Tiger);
    harness.ledger.script(Script::ConfirmAfter(2));
    harness.ledger.script(Script::Confirm);
    let (mut session, mut events) = harness.open().await;
    press(&mut session, &[InputEvent::Travel(Location::Forest)]);
    let hunt = [InputEvent::Open(Menu::Hunt), InputEvent::Confirm];

    // when
    press(&mut session, &hunt);
    press(&mut session, &[InputEvent::Cancel, InputEvent::Cancel]);
    press(&mut session, &hunt);
    let mut ids = HashMap::new();
    let mut finished = Vec::new();
    while finished.len() < 2 {
        let event = events.recv().await.unwrap();
        match &event {
            BackgroundEvent::Submitted { seq, operation_id } => {
                ids.insert(*seq, operation_id.clone());
            }
            BackgroundEvent::Finished(Completion { seq, .. }) => finished.push(*seq),
            BackgroundEvent::Refreshed { .. } => {}
        }
        session.handle_background(event).unwrap();
    }

    // then
    assert_eq!(finished, vec![2, 1]);
    let SessionState::Result(result) = session.state() else {
        panic!("expected the second hunt's result");
    };
    assert_eq!(result.operation_id.as_ref(), ids.get(&2));
    assert_ne!(result.operation_id.as_ref(), ids.get(&1));
    assert_eq!(harness.ledger.account("alice").gold, 10);

    // a refresh picks up the first hunt's reward
    session.request_refresh();
    let event = events.recv().await.unwrap();
    session.handle_background(event).unwrap();
    assert_eq!(session.player().gold(), 10);
}

#[tokio::test(start_paused = true)]
async fn create_offer__non_numeric_pylon_amount__stays_in_enter_and_submits_nothing() {
    // given
    let harness = Harness::new(GameCatalog::default());
    let (mut session, _events) = harness.open().await;
    press(&mut session, &[InputEvent::Travel(Location::Market)]);
    let board = Board::new(Goods::Item, Side::Buy);

    // when
    press(
        &mut session,
        &[
            InputEvent::Open(Menu::CreateOffer(board)),
            InputEvent::Slot(0),
            InputEvent::Char('a'),
            InputEvent::Char('b'),
            InputEvent::Char('c'),
            InputEvent::Confirm,
        ],
    );

    // then
    let SessionState::Enter(enter) = session.state() else {
        panic!("expected to stay in Enter");
    };
    assert_eq!(enter.notice.as_deref(), Some("`abc` is not a valid pylon amount"));
    assert!(harness.ledger.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn upgrade__priced_exactly_at_balance__is_submitted_and_levels_item() {
    // given
    let harness = Harness::new(GameCatalog::default());
    harness.ledger.fund("alice", 100, 0);
    harness
        .ledger
        .grant_item("alice", ItemSpec::new(ItemKind::WoodenSword, 1), 3);
    let (mut session, mut events) = harness.open().await;
    press(&mut session, &[InputEvent::Travel(Location::Shop)]);

    // when
    press(
        &mut session,
        &[InputEvent::Open(Menu::Upgrade), InputEvent::Slot(0)],
    );
    until_result(&mut session, &mut events).await;

    // then
    assert_eq!(session.player().gold(), 0);
    assert_eq!(
        session.player().items().first().map(|item| item.level),
        Some(2)
    );
}

#[tokio::test(start_paused = true)]
async fn upgrade__priced_one_above_balance__never_reaches_the_ledger() {
    // given
    let harness = Harness::new(GameCatalog::default());
    harness.ledger.fund("alice", 99, 0);
    harness
        .ledger
        .grant_item("alice", ItemSpec::new(ItemKind::WoodenSword, 1), 3);
    let (mut session, _events) = harness.open().await;
    press(&mut session, &[InputEvent::Travel(Location::Shop)]);

    // when
    press(
        &mut session,
        &[InputEvent::Open(Menu::Upgrade), InputEvent::Slot(0)],
    );

    // then
    let SessionState::Select(select) = session.state() else {
        panic!("expected to stay in Select");
    };
    assert_eq!(
        select.notice.as_deref(),
        Some("insufficient gold: need 100, have 99")
    );
    assert!(harness.ledger.submitted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn buy_item__rejected_by_ledger__shows_reason() {
    // given
    let harness = Harness::new(GameCatalog::default());
    harness.ledger.fund("alice", 500, 0);
    harness.ledger.script(Script::Reject("recipe disabled".into()));
    let (mut session, mut events) = harness.open().await;
    press(&mut session, &[InputEvent::Travel(Location::Shop)]);

    // when
    press(
        &mut session,
        &[InputEvent::Open(Menu::Buy), InputEvent::Slot(0)],
    );
    until_result(&mut session, &mut events).await;

    // then
    let SessionState::Result(result) = session.state() else {
        unreachable!()
    };
    assert_eq!(result.outcome, Err("recipe disabled".to_string()));
    assert!(result.operation_id.is_some());
    assert_eq!(session.player().gold(), 500);
}

#[tokio::test(start_paused = true)]
async fn get_pylons__refused_submission__fails_without_waiting_for_settle() {
    // given
    let harness = Harness::new(GameCatalog::default());
    harness
        .ledger
        .script(Script::FailSubmission("malformed operation".into()));
    let (mut session, mut events) = harness.open().await;
    press(&mut session, &[InputEvent::Travel(Location::Develop)]);
    let started = tokio::time::Instant::now();

    // when
    press(&mut session, &[InputEvent::Open(Menu::GetPylons)]);
    until_result(&mut session, &mut events).await;

    // then
    assert_eq!(started.elapsed(), std::time::Duration::ZERO);
    let SessionState::Result(result) = session.state() else {
        unreachable!()
    };
    assert_eq!(
        result.outcome,
        Err("submission rejected: malformed operation".to_string())
    );
    assert_eq!(result.operation_id, None::<OperationId>);
}

#[tokio::test(start_paused = true)]
async fn travel__storage_unavailable__is_fatal() {
    // given
    let harness = Harness::new(GameCatalog::default());
    let (mut session, _events) = harness.open().await;
    harness.store.set_unavailable(true);

    // when
    let moved = session.handle_input(&InputEvent::Travel(Location::Forest));

    // then
    assert!(matches!(moved, Err(SessionError::Storage(_))));
}

#[tokio::test(start_paused = true)]
async fn completion__storage_unavailable_during_sync__is_fatal() {
    // given
    let harness = Harness::new(GameCatalog::default());
    let (mut session, mut events) = harness.open().await;
    press(
        &mut session,
        &[
            InputEvent::Travel(Location::Develop),
            InputEvent::Open(Menu::GetPylons),
        ],
    );
    harness.store.set_unavailable(true);

    // when
    let mut handled = Ok(());
    while handled.is_ok() {
        let event = events.recv().await.unwrap();
        let finished = matches!(event, BackgroundEvent::Finished(_));
        handled = session.handle_background(event);
        if finished {
            break;
        }
    }

    // then
    assert!(matches!(handled, Err(SessionError::Storage(_))));
}
