//! In-process ledger simulation. Executes catalog recipes and offers
//! against local accounts; used for offline play and as the test fake.
use super::{
    Confirmation,
    Ledger,
    OperationId,
    PollStatus,
    Signer,
};
use crate::{
    catalog::{
        GameCatalog,
        OperationDescriptor,
        RecipeEffect,
    },
    error::LedgerError,
    market::{
        Currency,
        Offer,
        OfferLeg,
    },
    record::{
        AccountState,
        Character,
        CharacterKind,
        Credential,
        Item,
        ItemSpec,
        PlayerRecord,
    },
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

/// Scripted behaviour for the next submitted operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Script {
    /// Confirm on the first poll.
    Confirm,
    /// Report `Pending` for this many polls, then confirm.
    ConfirmAfter(u32),
    Reject(String),
    FailSubmission(String),
    NeverConfirm,
}

#[derive(Default)]
struct Account {
    credential: Option<Credential>,
    state: AccountState,
}

struct PendingOperation {
    player: String,
    descriptor: OperationDescriptor,
    script: Script,
    polls: u32,
    result: Option<PollStatus>,
}

#[derive(Default)]
struct Chain {
    accounts: HashMap<String, Account>,
    offers: Vec<Offer>,
    operations: HashMap<OperationId, PendingOperation>,
    scripts: VecDeque<Script>,
    submitted: Vec<OperationDescriptor>,
    outage: Option<String>,
    starting_pylon: u64,
    counter: u64,
}

#[derive(Clone)]
pub struct InMemoryLedger {
    chain: Arc<Mutex<Chain>>,
    catalog: Arc<GameCatalog>,
}

impl InMemoryLedger {
    pub fn new(catalog: Arc<GameCatalog>) -> Self {
        Self {
            chain: Arc::new(Mutex::new(Chain::default())),
            catalog,
        }
    }

    /// Pylon credited to every newly provisioned account.
    pub fn with_starting_pylon(self, amount: u64) -> Self {
        if let Ok(mut chain) = self.chain.lock() {
            chain.starting_pylon = amount;
        }
        self
    }

    fn chain(&self) -> Result<MutexGuard<'_, Chain>, LedgerError> {
        self.chain
            .lock()
            .map_err(|_| LedgerError::Network("ledger state poisoned".to_string()))
    }

    fn with_chain<T>(&self, f: impl FnOnce(&mut Chain) -> T) -> T {
        let mut chain = self
            .chain
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut chain)
    }

    /// Seeds an account from a cached record, credential included, so a
    /// simulated ledger can pick up where a previous run left off.
    pub fn restore(&self, record: &PlayerRecord) {
        self.with_chain(|chain| {
            let highest = record
                .items()
                .iter()
                .map(|item| item.id.as_str())
                .chain(record.characters().iter().map(|character| character.id.as_str()))
                .filter_map(|id| id.rsplit('-').next()?.parse::<u64>().ok())
                .max()
                .unwrap_or_default();
            chain.counter = chain.counter.max(highest);
            let account = chain.accounts.entry(record.name().to_string()).or_default();
            account.credential = record.credential().cloned();
            account.state = AccountState {
                gold: record.gold(),
                pylon: record.pylon(),
                items: record.items().to_vec(),
                characters: record.characters().to_vec(),
            };
        });
    }

    /// Queues the behaviour of the next submissions, in order.
    pub fn script(&self, script: Script) {
        self.with_chain(|chain| chain.scripts.push_back(script));
    }

    /// While set, account queries, offer listings and provisioning fail.
    pub fn set_outage(&self, reason: Option<&str>) {
        self.with_chain(|chain| chain.outage = reason.map(str::to_string));
    }

    pub fn fund(&self, player: &str, gold: u64, pylon: u64) {
        self.with_chain(|chain| {
            let state = &mut chain.accounts.entry(player.to_string()).or_default().state;
            state.gold += gold;
            state.pylon += pylon;
        });
    }

    pub fn grant_item(&self, player: &str, spec: ItemSpec, attack: u32) -> Item {
        self.with_chain(|chain| {
            let item = Item {
                id: chain.next_id("item"),
                kind: spec.kind,
                level: spec.level,
                attack,
            };
            chain
                .accounts
                .entry(player.to_string())
                .or_default()
                .state
                .items
                .push(item.clone());
            item
        })
    }

    pub fn grant_character(&self, player: &str, kind: CharacterKind) -> Character {
        self.with_chain(|chain| {
            let character = new_character(chain.next_id("character"), kind);
            chain
                .accounts
                .entry(player.to_string())
                .or_default()
                .state
                .characters
                .push(character.clone());
            character
        })
    }

    pub fn account(&self, player: &str) -> AccountState {
        self.with_chain(|chain| {
            chain
                .accounts
                .get(player)
                .map(|account| account.state.clone())
                .unwrap_or_default()
        })
    }

    pub fn offers(&self) -> Vec<Offer> {
        self.with_chain(|chain| chain.offers.clone())
    }

    /// Every descriptor accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<OperationDescriptor> {
        self.with_chain(|chain| chain.submitted.clone())
    }
}

fn new_character(id: String, kind: CharacterKind) -> Character {
    Character {
        id,
        kind,
        level: 1,
        xp: 0,
    }
}

impl Chain {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}-{}", self.counter)
    }

    fn check_outage(&self) -> Result<(), LedgerError> {
        match &self.outage {
            Some(reason) => Err(LedgerError::Network(reason.clone())),
            None => Ok(()),
        }
    }

    fn state(&self, player: &str) -> AccountState {
        self.accounts
            .get(player)
            .map(|account| account.state.clone())
            .unwrap_or_default()
    }

    fn commit(&mut self, player: &str, state: AccountState) {
        self.accounts.entry(player.to_string()).or_default().state = state;
    }

    fn execute(
        &mut self,
        catalog: &GameCatalog,
        player: &str,
        descriptor: &OperationDescriptor,
    ) -> Result<Confirmation, String> {
        match descriptor {
            OperationDescriptor::ExecuteRecipe {
                recipe_id,
                item_ids,
            } => {
                let recipe = catalog
                    .recipe(recipe_id)
                    .ok_or_else(|| format!("unknown recipe {recipe_id}"))?;
                self.run_recipe(player, &recipe.effect, item_ids)
            }
            OperationDescriptor::CreateOffer { give, want } => {
                let mut state = self.state(player);
                take_leg(&mut state, give)?;
                let id = self.next_id("offer");
                self.commit(player, state);
                self.offers.push(Offer {
                    id: id.clone(),
                    creator: player.to_string(),
                    give: give.clone(),
                    want: want.clone(),
                });
                Ok(confirmed(format!("order {id} created"), None))
            }
            OperationDescriptor::FulfillOffer { offer_id, item_ids } => {
                let index = self
                    .offers
                    .iter()
                    .position(|offer| &offer.id == offer_id)
                    .ok_or_else(|| format!("order {offer_id} no longer exists"))?;
                let offer = self.offers[index].clone();
                if offer.creator == player {
                    return Err("cannot fulfill own order".to_string());
                }
                let mut fulfiller = self.state(player);
                let mut creator = self.state(&offer.creator);
                let delivered = deliver(&mut fulfiller, &offer.want, item_ids)?;
                receive(&mut creator, delivered);
                receive(&mut fulfiller, offer.give.clone());
                self.commit(player, fulfiller);
                self.commit(&offer.creator, creator);
                self.offers.remove(index);
                Ok(confirmed(format!("order {offer_id} fulfilled"), None))
            }
            OperationDescriptor::GetPylons { amount } => {
                let mut state = self.state(player);
                state.pylon += amount;
                self.commit(player, state);
                Ok(confirmed(format!("received {amount} pylon"), Some(*amount)))
            }
        }
    }

    fn run_recipe(
        &mut self,
        player: &str,
        effect: &RecipeEffect,
        item_ids: &[String],
    ) -> Result<Confirmation, String> {
        let mut state = self.state(player);
        let confirmation = match *effect {
            RecipeEffect::StartingFunds { reward } => {
                state.gold += reward;
                confirmed(format!("received {reward} gold"), Some(reward))
            }
            RecipeEffect::Hunt { weapon, reward } => {
                let character_id = item_ids.first().ok_or("character required")?;
                let character = state
                    .characters
                    .iter_mut()
                    .find(|character| &character.id == character_id)
                    .ok_or("character not owned")?;
                character.xp += 1;
                if let Some(spec) = weapon {
                    let weapon_id = item_ids.get(1).ok_or("weapon required")?;
                    if !state
                        .items
                        .iter()
                        .any(|item| &item.id == weapon_id && item.spec() == spec)
                    {
                        return Err("weapon not owned".to_string());
                    }
                }
                state.gold += reward;
                confirmed(format!("hunted and earned {reward} gold"), Some(reward))
            }
            RecipeEffect::BuyItem {
                item,
                price,
                attack,
            } => {
                take_coins(&mut state, Currency::Gold, price)?;
                state.items.push(Item {
                    id: self.next_id("item"),
                    kind: item.kind,
                    level: item.level,
                    attack,
                });
                confirmed(format!("bought {item}"), None)
            }
            RecipeEffect::SellItem { item, reward } => {
                let id = item_ids.first().ok_or("item required")?;
                take_item(&mut state, id, Some(item))?;
                state.gold += reward;
                confirmed(format!("sold {item} for {reward} gold"), Some(reward))
            }
            RecipeEffect::UpgradeItem { item, price } => {
                let id = item_ids.first().ok_or("item required")?;
                take_coins(&mut state, Currency::Gold, price)?;
                let owned = state
                    .items
                    .iter_mut()
                    .find(|owned| &owned.id == id && owned.spec() == item)
                    .ok_or("item not owned")?;
                owned.level += 1;
                owned.attack *= 2;
                confirmed(format!("upgraded {item}"), None)
            }
            RecipeEffect::BuyCharacter { character, price } => {
                take_coins(&mut state, Currency::Pylon, price)?;
                state
                    .characters
                    .push(new_character(self.next_id("character"), character));
                confirmed(format!("bought a {}", character.name()), None)
            }
        };
        self.commit(player, state);
        Ok(confirmation)
    }
}

fn confirmed(message: String, amount: Option<u64>) -> Confirmation {
    Confirmation { message, amount }
}

fn take_coins(state: &mut AccountState, currency: Currency, amount: u64) -> Result<(), String> {
    let balance = match currency {
        Currency::Gold => &mut state.gold,
        Currency::Pylon => &mut state.pylon,
    };
    *balance = balance
        .checked_sub(amount)
        .ok_or_else(|| format!("insufficient {}", currency.label()))?;
    Ok(())
}

fn take_item(state: &mut AccountState, id: &str, spec: Option<ItemSpec>) -> Result<Item, String> {
    let index = state
        .items
        .iter()
        .position(|item| item.id == id && spec.is_none_or(|spec| item.spec() == spec))
        .ok_or("item not owned")?;
    Ok(state.items.remove(index))
}

fn take_character(
    state: &mut AccountState,
    id: &str,
    kind: Option<CharacterKind>,
) -> Result<Character, String> {
    let index = state
        .characters
        .iter()
        .position(|character| character.id == id && kind.is_none_or(|kind| character.kind == kind))
        .ok_or("character not owned")?;
    Ok(state.characters.remove(index))
}

/// Removes an escrowed leg from its owner.
fn take_leg(state: &mut AccountState, leg: &OfferLeg) -> Result<(), String> {
    match leg {
        OfferLeg::Coins { currency, amount } => take_coins(state, *currency, *amount),
        OfferLeg::OwnedItem { item } => take_item(state, &item.id, Some(item.spec())).map(drop),
        OfferLeg::OwnedCharacter { character } => {
            take_character(state, &character.id, Some(character.kind)).map(drop)
        }
        OfferLeg::Item { .. } | OfferLeg::Character { .. } => {
            Err("cannot escrow an unspecified asset".to_string())
        }
    }
}

/// Takes what an offer wants from the fulfiller and returns it as a
/// concrete leg for the creator.
fn deliver(
    state: &mut AccountState,
    want: &OfferLeg,
    item_ids: &[String],
) -> Result<OfferLeg, String> {
    match want {
        OfferLeg::Coins { currency, amount } => {
            take_coins(state, *currency, *amount)?;
            Ok(want.clone())
        }
        OfferLeg::Item { spec } => {
            let id = item_ids.first().ok_or("item required")?;
            let item = take_item(state, id, Some(*spec))?;
            Ok(OfferLeg::OwnedItem { item })
        }
        OfferLeg::Character { kind } => {
            let id = item_ids.first().ok_or("character required")?;
            let character = take_character(state, id, Some(*kind))?;
            Ok(OfferLeg::OwnedCharacter { character })
        }
        OfferLeg::OwnedItem { .. } | OfferLeg::OwnedCharacter { .. } => {
            Err("order cannot be fulfilled".to_string())
        }
    }
}

fn receive(state: &mut AccountState, leg: OfferLeg) {
    match leg {
        OfferLeg::Coins {
            currency: Currency::Gold,
            amount,
        } => state.gold += amount,
        OfferLeg::Coins {
            currency: Currency::Pylon,
            amount,
        } => state.pylon += amount,
        OfferLeg::OwnedItem { item } => state.items.push(item),
        OfferLeg::OwnedCharacter { character } => state.characters.push(character),
        OfferLeg::Item { .. } | OfferLeg::Character { .. } => {}
    }
}

impl Ledger for InMemoryLedger {
    async fn submit_operation(
        &self,
        signer: &Signer,
        descriptor: &OperationDescriptor,
    ) -> Result<OperationId, LedgerError> {
        let mut chain = self.chain()?;
        let registered = chain
            .accounts
            .get(&signer.player)
            .and_then(|account| account.credential.as_ref());
        if registered != Some(&signer.credential) {
            return Err(LedgerError::Submission(format!(
                "unknown signer {}",
                signer.player
            )));
        }
        let script = chain.scripts.pop_front().unwrap_or(Script::Confirm);
        if let Script::FailSubmission(reason) = script {
            return Err(LedgerError::Submission(reason));
        }
        chain.counter += 1;
        let digest = Sha256::digest(format!("{}:{}", signer.player, chain.counter));
        let id = OperationId::new(hex::encode(digest).to_uppercase());
        chain.submitted.push(descriptor.clone());
        chain.operations.insert(
            id.clone(),
            PendingOperation {
                player: signer.player.clone(),
                descriptor: descriptor.clone(),
                script,
                polls: 0,
                result: None,
            },
        );
        Ok(id)
    }

    async fn poll_operation(&self, id: &OperationId) -> Result<PollStatus, LedgerError> {
        let mut guard = self.chain()?;
        let chain = &mut *guard;
        let operation = chain
            .operations
            .get_mut(id)
            .ok_or_else(|| LedgerError::Protocol(format!("unknown operation {id}")))?;
        if let Some(result) = &operation.result {
            return Ok(result.clone());
        }
        operation.polls += 1;
        let ready = match &operation.script {
            Script::ConfirmAfter(pending) => operation.polls > *pending,
            Script::NeverConfirm => false,
            _ => true,
        };
        if !ready {
            return Ok(PollStatus::Pending);
        }
        let rejection = match &operation.script {
            Script::Reject(reason) => Some(reason.clone()),
            _ => None,
        };
        let player = operation.player.clone();
        let descriptor = operation.descriptor.clone();
        let status = match rejection {
            Some(reason) => PollStatus::Rejected(reason),
            None => match chain.execute(&self.catalog, &player, &descriptor) {
                Ok(confirmation) => PollStatus::Confirmed(confirmation),
                Err(reason) => PollStatus::Rejected(reason),
            },
        };
        if let Some(operation) = chain.operations.get_mut(id) {
            operation.result = Some(status.clone());
        }
        Ok(status)
    }

    async fn query_account(&self, player: &str) -> Result<AccountState, LedgerError> {
        let chain = self.chain()?;
        chain.check_outage()?;
        Ok(chain.state(player))
    }

    async fn provision_credential(&self, player: &str) -> Result<Credential, LedgerError> {
        let mut chain = self.chain()?;
        chain.check_outage()?;
        let starting_pylon = chain.starting_pylon;
        let account = chain.accounts.entry(player.to_string()).or_default();
        if let Some(credential) = &account.credential {
            return Ok(credential.clone());
        }
        let secret: [u8; 32] = rand::random();
        let credential = Credential::new(hex::encode(secret));
        account.credential = Some(credential.clone());
        account.state.pylon += starting_pylon;
        Ok(credential)
    }

    async fn list_offers(&self) -> Result<Vec<Offer>, LedgerError> {
        let chain = self.chain()?;
        chain.check_outage()?;
        Ok(chain.offers.clone())
    }
}
