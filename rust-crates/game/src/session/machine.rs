use super::state::{
    AmountField,
    EnterState,
    GameView,
    ResultState,
    SelectOption,
    SelectState,
    SelectTarget,
    SessionState,
    Task,
    WaitState,
};
use crate::{
    catalog::{
        Action,
        ActionContext,
        OperationDescriptor,
        parse_amount,
    },
    error::ActionError,
    ledger::{
        OperationId,
        OperationReport,
    },
    market::{
        Board,
        Goods,
        Side,
    },
    record::Location,
};

const MAX_INPUT_LEN: usize = 18;

/// Menus reachable from a location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Menu {
    Hunt,
    StartingFunds,
    Buy,
    Sell,
    Upgrade,
    BuyCharacter,
    GetPylons,
    Offers(Board),
    CreateOffer(Board),
}

impl Menu {
    pub fn location(&self) -> Location {
        match self {
            Menu::Hunt | Menu::StartingFunds => Location::Forest,
            Menu::Buy | Menu::Sell | Menu::Upgrade | Menu::BuyCharacter => Location::Shop,
            Menu::GetPylons => Location::Develop,
            Menu::Offers(_) | Menu::CreateOffer(_) => Location::Market,
        }
    }
}

/// Logical input, already decoded from raw keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Travel(Location),
    Open(Menu),
    /// Pick entry N (zero based) of the current list.
    Slot(usize),
    Up,
    Down,
    Confirm,
    Cancel,
    Char(char),
    Backspace,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Nothing changed.
    Ignored,
    Render,
    /// Location changed; the new location must be persisted.
    Relocate(Location),
    /// A `Wait` state was entered under `seq`; the operation must be started.
    Submit {
        seq: u64,
        descriptor: OperationDescriptor,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub effect: Effect,
}

impl Transition {
    fn ignored(state: &SessionState) -> Self {
        Self {
            next: state.clone(),
            effect: Effect::Ignored,
        }
    }

    fn render(next: SessionState) -> Self {
        Self {
            next,
            effect: Effect::Render,
        }
    }

    fn relocate(location: Location) -> Self {
        Self {
            next: SessionState::ShowLocation(location),
            effect: Effect::Relocate(location),
        }
    }
}

/// Computes the next state for an input event. `seq` is the sequence
/// number of the most recently submitted operation.
pub fn step(
    state: &SessionState,
    seq: u64,
    event: &InputEvent,
    view: &GameView<'_>,
) -> Transition {
    match state {
        SessionState::ShowLocation(location) => on_location(*location, seq, event, view),
        SessionState::Select(select) => on_select(select, seq, event, view),
        SessionState::Enter(enter) => on_enter(enter, seq, event, view),
        SessionState::Wait(wait) => match event {
            InputEvent::Cancel => Transition::render((*wait.back).clone()),
            _ => Transition::ignored(state),
        },
        SessionState::Result(result) => Transition::render((*result.back).clone()),
    }
}

/// Applies an operation outcome. Returns `None` unless the state is
/// waiting on exactly `seq`.
pub fn complete(
    state: &SessionState,
    seq: u64,
    outcome: Result<OperationReport, String>,
) -> Option<SessionState> {
    match state {
        SessionState::Wait(wait) if wait.seq == seq => {
            let operation_id = match &outcome {
                Ok(report) => Some(report.operation_id.clone()),
                Err(_) => wait.operation_id.clone(),
            };
            Some(SessionState::Result(ResultState {
                task: wait.task.clone(),
                operation_id,
                outcome,
                back: wait.back.clone(),
            }))
        }
        _ => None,
    }
}

fn on_location(
    location: Location,
    seq: u64,
    event: &InputEvent,
    view: &GameView<'_>,
) -> Transition {
    let here = SessionState::ShowLocation(location);
    match event {
        InputEvent::Travel(destination) if *destination != location => {
            Transition::relocate(*destination)
        }
        InputEvent::Cancel if location != Location::Home => {
            Transition::relocate(Location::Home)
        }
        InputEvent::Open(menu) if menu.location() == location => {
            open(*menu, here, seq, view)
        }
        _ => Transition::ignored(&here),
    }
}

fn create_action(side: Side) -> Action {
    match side {
        Side::Buy => Action::CreateBuyOffer,
        Side::Sell => Action::CreateSellOffer,
    }
}

fn open(menu: Menu, back: SessionState, seq: u64, view: &GameView<'_>) -> Transition {
    let select =
        |target| Transition::render(SessionState::Select(SelectState::new(target, back.clone())));
    match menu {
        Menu::Hunt => select(SelectTarget::HuntWeapon),
        Menu::Buy => select(SelectTarget::ShopItem),
        Menu::Sell => select(SelectTarget::SellItem),
        Menu::Upgrade => select(SelectTarget::UpgradeItem),
        Menu::BuyCharacter => select(SelectTarget::ShopCharacter),
        Menu::Offers(board) => select(SelectTarget::Offers(board)),
        Menu::StartingFunds => {
            submit_or_explain(Task::new(Action::GetStartingFunds, ActionContext::default()), back, seq, view)
        }
        Menu::GetPylons => {
            submit_or_explain(Task::new(Action::GetPylons, ActionContext::default()), back, seq, view)
        }
        Menu::CreateOffer(board) => match board.goods {
            Goods::Gold => Transition::render(SessionState::Enter(EnterState {
                field: AmountField::Gold,
                input: String::new(),
                task: Task::new(
                    create_action(board.side),
                    ActionContext {
                        goods: Some(Goods::Gold),
                        ..ActionContext::default()
                    },
                ),
                notice: None,
                back: Box::new(back),
            })),
            Goods::Item => select(SelectTarget::OfferItem(board.side)),
            Goods::Character => select(SelectTarget::OfferCharacter(board.side)),
        },
    }
}

/// Resolves the task and enters `Wait` under a fresh sequence number.
fn submit(
    task: Task,
    back: SessionState,
    seq: u64,
    view: &GameView<'_>,
) -> Result<Transition, ActionError> {
    let descriptor = view.catalog.resolve(task.action, &task.context, view.player)?;
    let seq = seq + 1;
    Ok(Transition {
        next: SessionState::Wait(WaitState {
            seq,
            task,
            operation_id: None,
            back: Box::new(back),
        }),
        effect: Effect::Submit { seq, descriptor },
    })
}

/// Actions started straight from a location have no Select state to show
/// an inline message in, so a rejection goes to a Result screen instead.
fn submit_or_explain(
    task: Task,
    back: SessionState,
    seq: u64,
    view: &GameView<'_>,
) -> Transition {
    match submit(task.clone(), back.clone(), seq, view) {
        Ok(transition) => transition,
        Err(err) => Transition::render(SessionState::Result(ResultState {
            task,
            operation_id: None,
            outcome: Err(err.to_string()),
            back: Box::new(back),
        })),
    }
}

fn on_select(
    select: &SelectState,
    seq: u64,
    event: &InputEvent,
    view: &GameView<'_>,
) -> Transition {
    let options = select.target.options(view);
    let last = options.len().saturating_sub(1);
    let moved = |cursor: usize| {
        Transition::render(SessionState::Select(SelectState {
            cursor,
            notice: None,
            ..select.clone()
        }))
    };
    match event {
        InputEvent::Up => moved(select.cursor.min(last).saturating_sub(1)),
        InputEvent::Down => moved((select.cursor + 1).min(last)),
        InputEvent::Slot(index) => match options.get(*index) {
            Some(option) => choose(select, *index, option, seq, view),
            None => with_notice(select, "no such slot"),
        },
        InputEvent::Confirm => {
            let index = select.cursor.min(last);
            match options.get(index) {
                Some(option) => choose(select, index, option, seq, view),
                None => with_notice(select, "nothing to select"),
            }
        }
        InputEvent::Cancel => Transition::render((*select.back).clone()),
        InputEvent::Open(menu @ Menu::CreateOffer(board))
            if select.target == SelectTarget::Offers(*board) =>
        {
            open(*menu, SessionState::Select(select.clone()), seq, view)
        }
        _ => Transition::ignored(&SessionState::Select(select.clone())),
    }
}

fn with_notice(select: &SelectState, notice: impl Into<String>) -> Transition {
    Transition::render(SessionState::Select(SelectState {
        notice: Some(notice.into()),
        ..select.clone()
    }))
}

fn choose(
    select: &SelectState,
    index: usize,
    option: &SelectOption,
    seq: u64,
    view: &GameView<'_>,
) -> Transition {
    let here = SelectState {
        cursor: index,
        notice: None,
        ..select.clone()
    };
    let character = view.player.default_character().cloned();
    let task = match (&select.target, option) {
        (SelectTarget::HuntWeapon, SelectOption::Unarmed) => Task::new(
            Action::Hunt,
            ActionContext {
                character,
                ..ActionContext::default()
            },
        ),
        (SelectTarget::HuntWeapon, SelectOption::Owned(item)) => Task::new(
            Action::Hunt,
            ActionContext {
                item: Some(item.clone()),
                character,
                ..ActionContext::default()
            },
        ),
        (SelectTarget::ShopItem, SelectOption::Listing { spec, .. }) => Task::new(
            Action::BuyItem,
            ActionContext {
                item_spec: Some(*spec),
                ..ActionContext::default()
            },
        ),
        (SelectTarget::ShopCharacter, SelectOption::CharacterListing { kind, .. }) => Task::new(
            Action::BuyCharacter,
            ActionContext {
                character_kind: Some(*kind),
                ..ActionContext::default()
            },
        ),
        (SelectTarget::SellItem, SelectOption::Owned(item)) => Task::new(
            Action::SellItem,
            ActionContext {
                item: Some(item.clone()),
                ..ActionContext::default()
            },
        ),
        (SelectTarget::UpgradeItem, SelectOption::Owned(item)) => Task::new(
            Action::UpgradeItem,
            ActionContext {
                item: Some(item.clone()),
                ..ActionContext::default()
            },
        ),
        (SelectTarget::Offers(_), SelectOption::Offer(offer)) => Task::new(
            Action::FulfillOffer,
            ActionContext {
                offer: Some(offer.clone()),
                ..ActionContext::default()
            },
        ),
        (SelectTarget::OfferItem(side), SelectOption::Spec(spec)) => {
            return enter_pylon(here, *side, ActionContext {
                goods: Some(Goods::Item),
                item_spec: Some(*spec),
                ..ActionContext::default()
            });
        }
        (SelectTarget::OfferItem(side), SelectOption::Owned(item)) => {
            return enter_pylon(here, *side, ActionContext {
                goods: Some(Goods::Item),
                item: Some(item.clone()),
                ..ActionContext::default()
            });
        }
        (SelectTarget::OfferCharacter(side), SelectOption::CharacterKind(kind)) => {
            return enter_pylon(here, *side, ActionContext {
                goods: Some(Goods::Character),
                character_kind: Some(*kind),
                ..ActionContext::default()
            });
        }
        (SelectTarget::OfferCharacter(side), SelectOption::Character(character)) => {
            return enter_pylon(here, *side, ActionContext {
                goods: Some(Goods::Character),
                character: Some(character.clone()),
                ..ActionContext::default()
            });
        }
        _ => return Transition::ignored(&SessionState::Select(select.clone())),
    };
    match submit(task, SessionState::Select(here.clone()), seq, view) {
        Ok(transition) => transition,
        Err(err) => with_notice(&here, err.to_string()),
    }
}

fn enter_pylon(back: SelectState, side: Side, context: ActionContext) -> Transition {
    Transition::render(SessionState::Enter(EnterState {
        field: AmountField::Pylon,
        input: String::new(),
        task: Task::new(create_action(side), context),
        notice: None,
        back: Box::new(SessionState::Select(back)),
    }))
}

fn on_enter(
    enter: &EnterState,
    seq: u64,
    event: &InputEvent,
    view: &GameView<'_>,
) -> Transition {
    let edited = |input: String| {
        Transition::render(SessionState::Enter(EnterState {
            input,
            notice: None,
            ..enter.clone()
        }))
    };
    match event {
        InputEvent::Char(c) if !c.is_control() && enter.input.chars().count() < MAX_INPUT_LEN => {
            let mut input = enter.input.clone();
            input.push(*c);
            edited(input)
        }
        InputEvent::Backspace => {
            let mut input = enter.input.clone();
            input.pop();
            edited(input)
        }
        InputEvent::Cancel => Transition::render((*enter.back).clone()),
        InputEvent::Confirm => commit(enter, seq, view),
        _ => Transition::ignored(&SessionState::Enter(enter.clone())),
    }
}

fn commit(enter: &EnterState, seq: u64, view: &GameView<'_>) -> Transition {
    let rejected = |err: ActionError| {
        Transition::render(SessionState::Enter(EnterState {
            notice: Some(err.to_string()),
            ..enter.clone()
        }))
    };
    if let Err(err) = parse_amount(enter.field.label(), Some(&enter.input)) {
        return rejected(err);
    }
    let mut task = enter.task.clone();
    match enter.field {
        AmountField::Gold => {
            task.context.gold_amount = Some(enter.input.clone());
            Transition::render(SessionState::Enter(EnterState {
                field: AmountField::Pylon,
                input: String::new(),
                task,
                notice: None,
                back: enter.back.clone(),
            }))
        }
        AmountField::Pylon => {
            task.context.pylon_amount = Some(enter.input.clone());
            submit(task, (*enter.back).clone(), seq, view).unwrap_or_else(rejected)
        }
    }
}

/// Owns the current state and the operation sequence counter.
#[derive(Clone, Debug)]
pub struct SessionMachine {
    state: SessionState,
    seq: u64,
}

impl SessionMachine {
    pub fn new(location: Location) -> Self {
        Self {
            state: SessionState::ShowLocation(location),
            seq: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Sequence number of the most recently submitted operation.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn handle_input(&mut self, event: &InputEvent, view: &GameView<'_>) -> Effect {
        let Transition { next, effect } = step(&self.state, self.seq, event, view);
        if let Effect::Submit { seq, .. } = &effect {
            self.seq = *seq;
        }
        self.state = next;
        effect
    }

    /// True while the screen waits on the operation tagged `seq`. A wait
    /// left through `Cancel` no longer counts.
    pub fn awaits(&self, seq: u64) -> bool {
        matches!(&self.state, SessionState::Wait(wait) if wait.seq == seq)
    }

    /// Returns false when the completion is stale and was discarded.
    pub fn complete(&mut self, seq: u64, outcome: Result<OperationReport, String>) -> bool {
        match complete(&self.state, seq, outcome) {
            Some(next) => {
                self.state = next;
                true
            }
            None => false,
        }
    }

    /// Records the ledger's id for the operation being waited on.
    pub fn note_submitted(&mut self, seq: u64, operation_id: &OperationId) -> bool {
        match &mut self.state {
            SessionState::Wait(wait) if wait.seq == seq => {
                wait.operation_id = Some(operation_id.clone());
                true
            }
            _ => false,
        }
    }
}
