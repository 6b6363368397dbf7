//! Player-to-player offers listed on the ledger.
use crate::record::{
    Character,
    CharacterKind,
    Item,
    ItemSpec,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    cmp::Ordering,
    fmt,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Gold,
    Pylon,
}

impl Currency {
    /// Coin denomination on the ledger.
    pub fn denom(&self) -> &'static str {
        match self {
            Currency::Gold => "loudcoin",
            Currency::Pylon => "pylon",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Currency::Gold => "gold",
            Currency::Pylon => "pylon",
        }
    }
}

/// One side of an offer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OfferLeg {
    Coins { currency: Currency, amount: u64 },
    /// Any item of this kind and level.
    Item { spec: ItemSpec },
    /// A specific item taken from the creator's inventory.
    OwnedItem { item: Item },
    Character { kind: CharacterKind },
    OwnedCharacter { character: Character },
}

impl OfferLeg {
    pub fn coins(currency: Currency, amount: u64) -> Self {
        OfferLeg::Coins { currency, amount }
    }

    fn pylon(&self) -> Option<u64> {
        match self {
            OfferLeg::Coins {
                currency: Currency::Pylon,
                amount,
            } => Some(*amount),
            _ => None,
        }
    }
}

impl fmt::Display for OfferLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferLeg::Coins { currency, amount } => {
                write!(f, "{amount} {}", currency.label())
            }
            OfferLeg::Item { spec } => write!(f, "{spec}"),
            OfferLeg::OwnedItem { item } => {
                write!(f, "{} (attack {})", item.spec(), item.attack)
            }
            OfferLeg::Character { kind } => f.write_str(kind.name()),
            OfferLeg::OwnedCharacter { character } => {
                write!(f, "{} Lv{}", character.kind.name(), character.level)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Goods {
    Gold,
    Item,
    Character,
}

/// From the creator's point of view: `Buy` pays pylon for goods, `Sell`
/// hands over goods for pylon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    pub goods: Goods,
    pub side: Side,
}

impl Board {
    pub const ALL: [Board; 6] = [
        Board::new(Goods::Gold, Side::Buy),
        Board::new(Goods::Gold, Side::Sell),
        Board::new(Goods::Item, Side::Buy),
        Board::new(Goods::Item, Side::Sell),
        Board::new(Goods::Character, Side::Buy),
        Board::new(Goods::Character, Side::Sell),
    ];

    pub const fn new(goods: Goods, side: Side) -> Self {
        Self { goods, side }
    }

    pub fn label(&self) -> &'static str {
        match (self.goods, self.side) {
            (Goods::Gold, Side::Buy) => "Buy gold orders",
            (Goods::Gold, Side::Sell) => "Sell gold orders",
            (Goods::Item, Side::Buy) => "Buy item orders",
            (Goods::Item, Side::Sell) => "Sell item orders",
            (Goods::Character, Side::Buy) => "Buy character orders",
            (Goods::Character, Side::Sell) => "Sell character orders",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub creator: String,
    /// What the creator hands over on fulfillment.
    pub give: OfferLeg,
    /// What the fulfiller must provide.
    pub want: OfferLeg,
}

impl Offer {
    pub fn board(&self) -> Option<Board> {
        let gives_pylon = self.give.pylon().is_some();
        let wants_pylon = self.want.pylon().is_some();
        let board = match (&self.give, &self.want) {
            (
                _,
                OfferLeg::Coins {
                    currency: Currency::Gold,
                    ..
                },
            ) if gives_pylon => Board::new(Goods::Gold, Side::Buy),
            (
                OfferLeg::Coins {
                    currency: Currency::Gold,
                    ..
                },
                _,
            ) if wants_pylon => Board::new(Goods::Gold, Side::Sell),
            (_, OfferLeg::Item { .. }) if gives_pylon => {
                Board::new(Goods::Item, Side::Buy)
            }
            (OfferLeg::OwnedItem { .. }, _) if wants_pylon => {
                Board::new(Goods::Item, Side::Sell)
            }
            (_, OfferLeg::Character { .. }) if gives_pylon => {
                Board::new(Goods::Character, Side::Buy)
            }
            (OfferLeg::OwnedCharacter { .. }, _) if wants_pylon => {
                Board::new(Goods::Character, Side::Sell)
            }
            _ => return None,
        };
        Some(board)
    }

    /// Pylon paid or asked for the goods.
    pub fn pylon_amount(&self) -> u64 {
        self.give.pylon().or(self.want.pylon()).unwrap_or(0)
    }

    fn goods_quantity(&self) -> u64 {
        match (&self.give, &self.want) {
            (
                OfferLeg::Coins {
                    currency: Currency::Gold,
                    amount,
                },
                _,
            )
            | (
                _,
                OfferLeg::Coins {
                    currency: Currency::Gold,
                    amount,
                },
            ) => *amount,
            _ => 1,
        }
    }

    /// Orders by pylon per unit of goods without going through floats.
    fn cmp_unit_price(&self, other: &Offer) -> Ordering {
        let lhs = u128::from(self.pylon_amount()) * u128::from(other.goods_quantity());
        let rhs = u128::from(other.pylon_amount()) * u128::from(self.goods_quantity());
        lhs.cmp(&rhs)
    }
}

/// Snapshot of the open offers, grouped by board on read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MarketBook {
    offers: Vec<Offer>,
}

impl MarketBook {
    pub fn from_offers(offers: Vec<Offer>) -> Self {
        Self { offers }
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    /// Offers on `board`, cheapest first.
    pub fn board(&self, board: Board) -> Vec<&Offer> {
        let mut offers: Vec<&Offer> = self
            .offers
            .iter()
            .filter(|offer| offer.board() == Some(board))
            .collect();
        offers.sort_by(|a, b| a.cmp_unit_price(b).then_with(|| a.id.cmp(&b.id)));
        offers
    }
}
