use crate::{
    catalog::{
        Action,
        ActionContext,
        GameCatalog,
    },
    ledger::{
        OperationId,
        OperationReport,
    },
    market::{
        Board,
        MarketBook,
        Offer,
        Side,
    },
    record::{
        Character,
        CharacterKind,
        Item,
        ItemSpec,
        Location,
        PlayerRecord,
    },
};
use std::{
    fmt,
    iter,
};

/// Read-only view of everything transitions may consult.
#[derive(Clone, Copy)]
pub struct GameView<'a> {
    pub player: &'a PlayerRecord,
    pub catalog: &'a GameCatalog,
    pub market: &'a MarketBook,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    ShowLocation(Location),
    Select(SelectState),
    Enter(EnterState),
    Wait(WaitState),
    Result(ResultState),
}

impl SessionState {
    /// The location the player is in, following back links.
    pub fn location(&self) -> Location {
        match self {
            SessionState::ShowLocation(location) => *location,
            SessionState::Select(select) => select.back.location(),
            SessionState::Enter(enter) => enter.back.location(),
            SessionState::Wait(wait) => wait.back.location(),
            SessionState::Result(result) => result.back.location(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectState {
    pub target: SelectTarget,
    pub cursor: usize,
    /// Inline message from a rejected selection.
    pub notice: Option<String>,
    pub back: Box<SessionState>,
}

impl SelectState {
    pub fn new(target: SelectTarget, back: SessionState) -> Self {
        Self {
            target,
            cursor: 0,
            notice: None,
            back: Box::new(back),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectTarget {
    HuntWeapon,
    ShopItem,
    ShopCharacter,
    SellItem,
    UpgradeItem,
    Offers(Board),
    OfferItem(Side),
    OfferCharacter(Side),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectOption {
    Unarmed,
    Owned(Item),
    Listing { spec: ItemSpec, price: u64 },
    CharacterListing { kind: CharacterKind, price: u64 },
    Character(Character),
    Offer(Offer),
    Spec(ItemSpec),
    CharacterKind(CharacterKind),
}

impl SelectTarget {
    pub fn title(&self) -> &'static str {
        match self {
            SelectTarget::HuntWeapon => "Select a weapon to hunt with",
            SelectTarget::ShopItem => "Select an item to buy",
            SelectTarget::ShopCharacter => "Select a character to buy",
            SelectTarget::SellItem => "Select an item to sell",
            SelectTarget::UpgradeItem => "Select an item to upgrade",
            SelectTarget::Offers(board) => board.label(),
            SelectTarget::OfferItem(Side::Buy) => "Select the item you want",
            SelectTarget::OfferItem(Side::Sell) => "Select the item to offer",
            SelectTarget::OfferCharacter(Side::Buy) => "Select the character you want",
            SelectTarget::OfferCharacter(Side::Sell) => "Select the character to offer",
        }
    }

    pub fn options(&self, view: &GameView<'_>) -> Vec<SelectOption> {
        let owned_items = || view.player.items().iter().cloned().map(SelectOption::Owned);
        match self {
            SelectTarget::HuntWeapon => iter::once(SelectOption::Unarmed)
                .chain(owned_items())
                .collect(),
            SelectTarget::ShopItem => view
                .catalog
                .shop_items()
                .into_iter()
                .map(|(spec, price)| SelectOption::Listing { spec, price })
                .collect(),
            SelectTarget::ShopCharacter => view
                .catalog
                .shop_characters()
                .into_iter()
                .map(|(kind, price)| SelectOption::CharacterListing { kind, price })
                .collect(),
            SelectTarget::SellItem
            | SelectTarget::UpgradeItem
            | SelectTarget::OfferItem(Side::Sell) => owned_items().collect(),
            SelectTarget::Offers(board) => view
                .market
                .board(*board)
                .into_iter()
                .cloned()
                .map(SelectOption::Offer)
                .collect(),
            SelectTarget::OfferItem(Side::Buy) => view
                .catalog
                .item_specs()
                .into_iter()
                .map(SelectOption::Spec)
                .collect(),
            SelectTarget::OfferCharacter(Side::Buy) => CharacterKind::ALL
                .into_iter()
                .map(SelectOption::CharacterKind)
                .collect(),
            SelectTarget::OfferCharacter(Side::Sell) => view
                .player
                .characters()
                .iter()
                .cloned()
                .map(SelectOption::Character)
                .collect(),
        }
    }
}

impl fmt::Display for SelectOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectOption::Unarmed => f.write_str("No weapon"),
            SelectOption::Owned(item) => {
                write!(f, "{} (attack {})", item.spec(), item.attack)
            }
            SelectOption::Listing { spec, price } => write!(f, "{spec} for {price} gold"),
            SelectOption::CharacterListing { kind, price } => {
                write!(f, "{} for {price} pylon", kind.name())
            }
            SelectOption::Character(character) => write!(
                f,
                "{} Lv{} ({} xp)",
                character.kind.name(),
                character.level,
                character.xp
            ),
            SelectOption::Offer(offer) => {
                write!(f, "{} for {} by {}", offer.give, offer.want, offer.creator)
            }
            SelectOption::Spec(spec) => write!(f, "{spec}"),
            SelectOption::CharacterKind(kind) => f.write_str(kind.name()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmountField {
    Gold,
    Pylon,
}

impl AmountField {
    pub fn label(&self) -> &'static str {
        match self {
            AmountField::Gold => "gold amount",
            AmountField::Pylon => "pylon amount",
        }
    }
}

/// An action together with what has been chosen for it so far.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub action: Action,
    pub context: ActionContext,
}

impl Task {
    pub fn new(action: Action, context: ActionContext) -> Self {
        Self { action, context }
    }

    pub fn summary(&self) -> String {
        let context = &self.context;
        let item = context.item.as_ref().map(|item| item.spec().to_string());
        match self.action {
            Action::GetStartingFunds => "Requesting starting funds".to_string(),
            Action::Hunt => format!(
                "Hunting with {}",
                item.unwrap_or_else(|| "bare hands".to_string())
            ),
            Action::BuyItem => format!(
                "Buying {}",
                context
                    .item_spec
                    .map(|spec| spec.to_string())
                    .unwrap_or_default()
            ),
            Action::SellItem => format!("Selling {}", item.unwrap_or_default()),
            Action::UpgradeItem => format!("Upgrading {}", item.unwrap_or_default()),
            Action::BuyCharacter => format!(
                "Buying {}",
                context
                    .character_kind
                    .map(|kind| kind.name())
                    .unwrap_or("a character")
            ),
            Action::CreateBuyOffer => "Creating buy order".to_string(),
            Action::CreateSellOffer => "Creating sell order".to_string(),
            Action::FulfillOffer => format!(
                "Fulfilling order {}",
                context
                    .offer
                    .as_ref()
                    .map(|offer| offer.id.as_str())
                    .unwrap_or_default()
            ),
            Action::GetPylons => "Requesting pylons".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnterState {
    pub field: AmountField,
    /// Raw text as typed.
    pub input: String,
    pub task: Task,
    pub notice: Option<String>,
    pub back: Box<SessionState>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitState {
    pub seq: u64,
    pub task: Task,
    pub operation_id: Option<OperationId>,
    pub back: Box<SessionState>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultState {
    pub task: Task,
    pub operation_id: Option<OperationId>,
    /// Confirmation, or a short reason why the operation failed.
    pub outcome: Result<OperationReport, String>,
    pub back: Box<SessionState>,
}
