//! Static recipe table and the mapping from player actions to ledger
//! operations. Resolution is a pure function of the action, its context,
//! the catalog and the player's current record.
use crate::{
    error::ActionError,
    market::{
        Currency,
        Goods,
        Offer,
        OfferLeg,
        Side,
    },
    record::{
        Character,
        CharacterKind,
        Item,
        ItemKind,
        ItemSpec,
        PlayerRecord,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeSet;

const RECIPE_VERSION: &str = "v0.0.0-1579053457";
const DEFAULT_PYLON_GRANT: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    GetStartingFunds,
    Hunt,
    BuyItem,
    SellItem,
    UpgradeItem,
    BuyCharacter,
    CreateBuyOffer,
    CreateSellOffer,
    FulfillOffer,
    GetPylons,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::GetStartingFunds => "Get starting funds",
            Action::Hunt => "Hunt",
            Action::BuyItem => "Buy item",
            Action::SellItem => "Sell item",
            Action::UpgradeItem => "Upgrade item",
            Action::BuyCharacter => "Buy character",
            Action::CreateBuyOffer => "Create buy order",
            Action::CreateSellOffer => "Create sell order",
            Action::FulfillOffer => "Fulfill order",
            Action::GetPylons => "Get pylons",
        }
    }
}

/// Whatever the player picked or typed on the way to an action. Amounts are
/// kept as the raw strings the player entered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionContext {
    pub item: Option<Item>,
    pub item_spec: Option<ItemSpec>,
    pub character: Option<Character>,
    pub character_kind: Option<CharacterKind>,
    pub goods: Option<Goods>,
    pub gold_amount: Option<String>,
    pub pylon_amount: Option<String>,
    pub offer: Option<Offer>,
}

/// A fully resolved operation, ready to be signed and submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationDescriptor {
    ExecuteRecipe {
        recipe_id: String,
        item_ids: Vec<String>,
    },
    CreateOffer {
        give: OfferLeg,
        want: OfferLeg,
    },
    FulfillOffer {
        offer_id: String,
        item_ids: Vec<String>,
    },
    GetPylons {
        amount: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub effect: RecipeEffect,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecipeEffect {
    StartingFunds {
        reward: u64,
    },
    Hunt {
        weapon: Option<ItemSpec>,
        reward: u64,
    },
    BuyItem {
        item: ItemSpec,
        price: u64,
        attack: u32,
    },
    SellItem {
        item: ItemSpec,
        reward: u64,
    },
    UpgradeItem {
        item: ItemSpec,
        price: u64,
    },
    BuyCharacter {
        character: CharacterKind,
        price: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameCatalog {
    recipes: Vec<Recipe>,
    #[serde(default = "default_pylon_grant")]
    pylon_grant: u64,
}

fn default_pylon_grant() -> u64 {
    DEFAULT_PYLON_GRANT
}

fn recipe(slug: &str, name: &str, effect: RecipeEffect) -> Recipe {
    Recipe {
        id: format!("LOUD-{slug}-recipe-{RECIPE_VERSION}"),
        name: format!("LOUD's {name}"),
        effect,
    }
}

impl Default for GameCatalog {
    fn default() -> Self {
        use ItemKind::{
            CopperSword,
            WoodenSword,
        };
        let wooden = |level| ItemSpec::new(WoodenSword, level);
        let copper = |level| ItemSpec::new(CopperSword, level);
        let recipes = vec![
            recipe(
                "get-initial-coin",
                "get initial coin recipe",
                RecipeEffect::StartingFunds { reward: 500 },
            ),
            recipe(
                "hunt-with-no-weapon",
                "hunt without sword recipe",
                RecipeEffect::Hunt {
                    weapon: None,
                    reward: 5,
                },
            ),
            recipe(
                "hunt-with-wooden-sword-lv1",
                "hunt with lv1 wooden sword recipe",
                RecipeEffect::Hunt {
                    weapon: Some(wooden(1)),
                    reward: 10,
                },
            ),
            recipe(
                "hunt-with-wooden-sword-lv2",
                "hunt with lv2 wooden sword recipe",
                RecipeEffect::Hunt {
                    weapon: Some(wooden(2)),
                    reward: 20,
                },
            ),
            recipe(
                "hunt-with-copper-sword-lv1",
                "hunt with lv1 copper sword recipe",
                RecipeEffect::Hunt {
                    weapon: Some(copper(1)),
                    reward: 25,
                },
            ),
            recipe(
                "hunt-with-copper-sword-lv2",
                "hunt with lv2 copper sword recipe",
                RecipeEffect::Hunt {
                    weapon: Some(copper(2)),
                    reward: 40,
                },
            ),
            recipe(
                "wooden-sword-lv1-buy",
                "Wooden sword lv1 buy recipe",
                RecipeEffect::BuyItem {
                    item: wooden(1),
                    price: 100,
                    attack: 3,
                },
            ),
            recipe(
                "copper-sword-lv1-buy",
                "Copper sword lv1 buy recipe",
                RecipeEffect::BuyItem {
                    item: copper(1),
                    price: 250,
                    attack: 6,
                },
            ),
            recipe(
                "sell-wooden-sword-lv1",
                "Lv1 wooden sword sell recipe",
                RecipeEffect::SellItem {
                    item: wooden(1),
                    reward: 80,
                },
            ),
            recipe(
                "sell-wooden-sword-lv2",
                "Lv2 wooden sword sell recipe",
                RecipeEffect::SellItem {
                    item: wooden(2),
                    reward: 160,
                },
            ),
            recipe(
                "sell-copper-sword-lv1",
                "Lv1 copper sword sell recipe",
                RecipeEffect::SellItem {
                    item: copper(1),
                    reward: 200,
                },
            ),
            recipe(
                "sell-copper-sword-lv2",
                "Lv2 copper sword sell recipe",
                RecipeEffect::SellItem {
                    item: copper(2),
                    reward: 400,
                },
            ),
            recipe(
                "upgrade-wooden-sword-lv1-to-lv2",
                "Wooden sword lv1 to lv2 upgrade recipe",
                RecipeEffect::UpgradeItem {
                    item: wooden(1),
                    price: 100,
                },
            ),
            recipe(
                "upgrade-copper-sword-lv1-to-lv2",
                "Copper sword lv1 to lv2 upgrade recipe",
                RecipeEffect::UpgradeItem {
                    item: copper(1),
                    price: 250,
                },
            ),
            recipe(
                "get-character",
                "get character recipe",
                RecipeEffect::BuyCharacter {
                    character: CharacterKind::Tiger,
                    price: 10,
                },
            ),
        ];
        Self {
            recipes,
            pylon_grant: DEFAULT_PYLON_GRANT,
        }
    }
}

/// Parses a numeric amount typed by the player.
pub fn parse_amount(field: &'static str, raw: Option<&str>) -> Result<u64, ActionError> {
    let raw = raw.unwrap_or_default();
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ActionError::InvalidInput {
            field,
            raw: raw.to_string(),
        })
}

fn ensure_funds(
    currency: Currency,
    needed: u64,
    player: &PlayerRecord,
) -> Result<(), ActionError> {
    let available = match currency {
        Currency::Gold => player.gold(),
        Currency::Pylon => player.pylon(),
    };
    if needed > available {
        return Err(ActionError::InsufficientFunds {
            currency: currency.label(),
            needed,
            available,
        });
    }
    Ok(())
}

impl GameCatalog {
    pub fn new(recipes: Vec<Recipe>, pylon_grant: u64) -> Self {
        Self {
            recipes,
            pylon_grant,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn recipe(&self, id: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|recipe| recipe.id == id)
    }

    pub fn pylon_grant(&self) -> u64 {
        self.pylon_grant
    }

    /// Items for sale in the shop with their gold price.
    pub fn shop_items(&self) -> Vec<(ItemSpec, u64)> {
        self.recipes
            .iter()
            .filter_map(|recipe| match recipe.effect {
                RecipeEffect::BuyItem { item, price, .. } => Some((item, price)),
                _ => None,
            })
            .collect()
    }

    /// Characters for sale with their pylon price.
    pub fn shop_characters(&self) -> Vec<(CharacterKind, u64)> {
        self.recipes
            .iter()
            .filter_map(|recipe| match recipe.effect {
                RecipeEffect::BuyCharacter { character, price } => {
                    Some((character, price))
                }
                _ => None,
            })
            .collect()
    }

    /// Every item kind and level the catalog knows about.
    pub fn item_specs(&self) -> Vec<ItemSpec> {
        let specs: BTreeSet<ItemSpec> = self
            .recipes
            .iter()
            .filter_map(|recipe| match recipe.effect {
                RecipeEffect::BuyItem { item, .. }
                | RecipeEffect::SellItem { item, .. }
                | RecipeEffect::UpgradeItem { item, .. } => Some(item),
                RecipeEffect::Hunt { weapon, .. } => weapon,
                _ => None,
            })
            .collect();
        specs.into_iter().collect()
    }

    fn find(&self, matches: impl Fn(&RecipeEffect) -> bool) -> Option<&Recipe> {
        self.recipes.iter().find(|recipe| matches(&recipe.effect))
    }

    fn hunt_recipe(&self, weapon: Option<ItemSpec>) -> Option<&Recipe> {
        self.find(|effect| {
            matches!(effect, RecipeEffect::Hunt { weapon: w, .. } if *w == weapon)
        })
    }

    pub fn resolve(
        &self,
        action: Action,
        context: &ActionContext,
        player: &PlayerRecord,
    ) -> Result<OperationDescriptor, ActionError> {
        match action {
            Action::GetStartingFunds => {
                let recipe = self
                    .find(|effect| matches!(effect, RecipeEffect::StartingFunds { .. }))
                    .ok_or_else(|| ActionError::catalog("starting funds unavailable"))?;
                Ok(execute(recipe, Vec::new()))
            }
            Action::Hunt => self.resolve_hunt(context),
            Action::BuyItem => {
                let spec = context
                    .item_spec
                    .ok_or_else(|| ActionError::catalog("no item selected"))?;
                let (recipe, price) = self
                    .recipes
                    .iter()
                    .find_map(|recipe| match recipe.effect {
                        RecipeEffect::BuyItem { item, price, .. } if item == spec => {
                            Some((recipe, price))
                        }
                        _ => None,
                    })
                    .ok_or_else(|| ActionError::catalog("not purchasable"))?;
                ensure_funds(Currency::Gold, price, player)?;
                Ok(execute(recipe, Vec::new()))
            }
            Action::SellItem => {
                let item = selected_item(context)?;
                let recipe = self
                    .find(|effect| {
                        matches!(effect, RecipeEffect::SellItem { item: spec, .. } if *spec == item.spec())
                    })
                    .ok_or_else(|| ActionError::catalog("not sellable"))?;
                Ok(execute(recipe, vec![item.id.clone()]))
            }
            Action::UpgradeItem => {
                let item = selected_item(context)?;
                let (recipe, price) = self
                    .recipes
                    .iter()
                    .find_map(|recipe| match recipe.effect {
                        RecipeEffect::UpgradeItem { item: spec, price }
                            if spec == item.spec() =>
                        {
                            Some((recipe, price))
                        }
                        _ => None,
                    })
                    .ok_or_else(|| ActionError::catalog("not upgradable"))?;
                ensure_funds(Currency::Gold, price, player)?;
                Ok(execute(recipe, vec![item.id.clone()]))
            }
            Action::BuyCharacter => {
                let kind = context
                    .character_kind
                    .ok_or_else(|| ActionError::catalog("no character selected"))?;
                let (recipe, price) = self
                    .recipes
                    .iter()
                    .find_map(|recipe| match recipe.effect {
                        RecipeEffect::BuyCharacter { character, price }
                            if character == kind =>
                        {
                            Some((recipe, price))
                        }
                        _ => None,
                    })
                    .ok_or_else(|| ActionError::catalog("not purchasable"))?;
                ensure_funds(Currency::Pylon, price, player)?;
                Ok(execute(recipe, Vec::new()))
            }
            Action::CreateBuyOffer => offer_terms(Side::Buy, context, player),
            Action::CreateSellOffer => offer_terms(Side::Sell, context, player),
            Action::FulfillOffer => fulfill_terms(context, player),
            Action::GetPylons => Ok(OperationDescriptor::GetPylons {
                amount: self.pylon_grant,
            }),
        }
    }

    fn resolve_hunt(
        &self,
        context: &ActionContext,
    ) -> Result<OperationDescriptor, ActionError> {
        let character = context
            .character
            .as_ref()
            .ok_or_else(|| ActionError::catalog("character required"))?;
        let armed = context.item.as_ref().and_then(|item| {
            self.hunt_recipe(Some(item.spec()))
                .map(|recipe| (recipe, item))
        });
        match armed {
            Some((recipe, item)) => {
                Ok(execute(recipe, vec![character.id.clone(), item.id.clone()]))
            }
            None => {
                let recipe = self
                    .hunt_recipe(None)
                    .ok_or_else(|| ActionError::catalog("hunting unavailable"))?;
                Ok(execute(recipe, vec![character.id.clone()]))
            }
        }
    }
}

fn execute(recipe: &Recipe, item_ids: Vec<String>) -> OperationDescriptor {
    OperationDescriptor::ExecuteRecipe {
        recipe_id: recipe.id.clone(),
        item_ids,
    }
}

fn selected_item(context: &ActionContext) -> Result<&Item, ActionError> {
    context
        .item
        .as_ref()
        .ok_or_else(|| ActionError::catalog("no item selected"))
}

fn offer_terms(
    side: Side,
    context: &ActionContext,
    player: &PlayerRecord,
) -> Result<OperationDescriptor, ActionError> {
    let goods = context
        .goods
        .ok_or_else(|| ActionError::catalog("no order kind selected"))?;
    let goods_leg = match (goods, side) {
        (Goods::Gold, _) => OfferLeg::coins(
            Currency::Gold,
            parse_amount("gold amount", context.gold_amount.as_deref())?,
        ),
        (Goods::Item, Side::Buy) => OfferLeg::Item {
            spec: context
                .item_spec
                .ok_or_else(|| ActionError::catalog("no item selected"))?,
        },
        (Goods::Item, Side::Sell) => OfferLeg::OwnedItem {
            item: selected_item(context)?.clone(),
        },
        (Goods::Character, Side::Buy) => OfferLeg::Character {
            kind: context
                .character_kind
                .ok_or_else(|| ActionError::catalog("no character selected"))?,
        },
        (Goods::Character, Side::Sell) => OfferLeg::OwnedCharacter {
            character: context
                .character
                .clone()
                .ok_or_else(|| ActionError::catalog("no character selected"))?,
        },
    };
    let pylon_leg = OfferLeg::coins(
        Currency::Pylon,
        parse_amount("pylon amount", context.pylon_amount.as_deref())?,
    );
    let (give, want) = match side {
        Side::Buy => (pylon_leg, goods_leg),
        Side::Sell => (goods_leg, pylon_leg),
    };
    if let OfferLeg::Coins { currency, amount } = &give {
        ensure_funds(*currency, *amount, player)?;
    }
    Ok(OperationDescriptor::CreateOffer { give, want })
}

fn fulfill_terms(
    context: &ActionContext,
    player: &PlayerRecord,
) -> Result<OperationDescriptor, ActionError> {
    let offer = context
        .offer
        .as_ref()
        .ok_or_else(|| ActionError::catalog("you haven't selected any order"))?;
    if offer.creator == player.name() {
        return Err(ActionError::catalog("cannot fulfill your own order"));
    }
    let item_ids = match &offer.want {
        OfferLeg::Coins { currency, amount } => {
            ensure_funds(*currency, *amount, player)?;
            Vec::new()
        }
        OfferLeg::Item { spec } => {
            let item = player
                .items()
                .iter()
                .find(|item| item.spec() == *spec)
                .ok_or_else(|| ActionError::catalog(format!("you don't own a {spec}")))?;
            vec![item.id.clone()]
        }
        OfferLeg::Character { kind } => {
            let character = player
                .characters()
                .iter()
                .find(|character| character.kind == *kind)
                .ok_or_else(|| {
                    ActionError::catalog(format!("you don't own a {}", kind.name()))
                })?;
            vec![character.id.clone()]
        }
        OfferLeg::OwnedItem { .. } | OfferLeg::OwnedCharacter { .. } => {
            return Err(ActionError::catalog("order cannot be fulfilled"));
        }
    };
    Ok(OperationDescriptor::FulfillOffer {
        offer_id: offer.id.clone(),
        item_ids,
    })
}
