//! Cached player state as persisted in the player store.
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    collections::HashSet,
    fmt,
};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Location {
    #[default]
    Home,
    Forest,
    Shop,
    Market,
    Develop,
    Settings,
}

impl Location {
    pub fn label(&self) -> &'static str {
        match self {
            Location::Home => "Home",
            Location::Forest => "Forest",
            Location::Shop => "Shop",
            Location::Market => "Market",
            Location::Develop => "Develop",
            Location::Settings => "Settings",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    WoodenSword,
    CopperSword,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::WoodenSword, ItemKind::CopperSword];

    pub fn name(&self) -> &'static str {
        match self {
            ItemKind::WoodenSword => "Wooden sword",
            ItemKind::CopperSword => "Copper sword",
        }
    }

    /// Parses the display name the ledger reports for an item.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// An item kind at a given level; catalog entries are keyed by it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ItemSpec {
    pub kind: ItemKind,
    pub level: u32,
}

impl ItemSpec {
    pub const fn new(kind: ItemKind, level: u32) -> Self {
        Self { kind, level }
    }
}

impl fmt::Display for ItemSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Lv{}", self.kind.name(), self.level)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub level: u32,
    pub attack: u32,
}

impl Item {
    pub fn spec(&self) -> ItemSpec {
        ItemSpec::new(self.kind, self.level)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CharacterKind {
    Tiger,
}

impl CharacterKind {
    pub const ALL: [CharacterKind; 1] = [CharacterKind::Tiger];

    pub fn name(&self) -> &'static str {
        match self {
            CharacterKind::Tiger => "Tiger",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub kind: CharacterKind,
    pub level: u32,
    pub xp: u64,
}

/// Signing secret handed out by the ledger's account provisioning.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short public digest, safe to show and log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

/// Authoritative account contents as reported by the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub gold: u64,
    pub pylon: u64,
    pub items: Vec<Item>,
    pub characters: Vec<Character>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    name: String,
    gold: u64,
    pylon: u64,
    location: Location,
    items: Vec<Item>,
    characters: Vec<Character>,
    credential: Option<Credential>,
    last_operation: Option<String>,
    synced_at: Option<DateTime<Utc>>,
}

impl PlayerRecord {
    /// A fresh record: no funds, empty inventory, at home.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gold: 0,
            pylon: 0,
            location: Location::Home,
            items: Vec::new(),
            characters: Vec::new(),
            credential: None,
            last_operation: None,
            synced_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gold(&self) -> u64 {
        self.gold
    }

    pub fn pylon(&self) -> u64 {
        self.pylon
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    /// The character used for hunting.
    pub fn default_character(&self) -> Option<&Character> {
        self.characters.first()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn last_operation(&self) -> Option<&str> {
        self.last_operation.as_deref()
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    pub fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    /// Stores the signing credential. Returns false and keeps the existing
    /// one if a credential was already present.
    pub fn set_credential(&mut self, credential: Credential) -> bool {
        if self.credential.is_some() {
            return false;
        }
        self.credential = Some(credential);
        true
    }

    pub fn record_operation(&mut self, operation_id: impl Into<String>) {
        self.last_operation = Some(operation_id.into());
    }

    /// Replaces balances, inventory and characters with the ledger's view.
    /// Entries with an id already seen earlier in the list are dropped.
    pub fn apply_account(&mut self, account: AccountState, at: DateTime<Utc>) {
        let AccountState {
            gold,
            pylon,
            items,
            characters,
        } = account;
        self.gold = gold;
        self.pylon = pylon;
        let mut seen = HashSet::new();
        self.items = items
            .into_iter()
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        seen.clear();
        self.characters = characters
            .into_iter()
            .filter(|character| seen.insert(character.id.clone()))
            .collect();
        self.synced_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn sword(id: &str, level: u32) -> Item {
        Item {
            id: id.to_string(),
            kind: ItemKind::WoodenSword,
            level,
            attack: 3 * level,
        }
    }

    #[test]
    fn new__defaults_to_empty_record_at_home() {
        // when
        let record = PlayerRecord::new("alice");

        // then
        assert_eq!(record.name(), "alice");
        assert_eq!(record.gold(), 0);
        assert_eq!(record.pylon(), 0);
        assert_eq!(record.location(), Location::Home);
        assert!(record.items().is_empty());
        assert!(record.credential().is_none());
    }

    #[test]
    fn apply_account__replaces_inventory_and_drops_duplicate_ids() {
        // given
        let mut record = PlayerRecord::new("alice");
        record.apply_account(
            AccountState {
                gold: 10,
                items: vec![sword("old", 1)],
                ..AccountState::default()
            },
            Utc::now(),
        );

        // when
        record.apply_account(
            AccountState {
                gold: 40,
                pylon: 2,
                items: vec![sword("a", 1), sword("b", 2), sword("a", 2)],
                characters: vec![],
            },
            Utc::now(),
        );

        // then
        assert_eq!(record.gold(), 40);
        assert_eq!(record.pylon(), 2);
        assert_eq!(record.items(), &[sword("a", 1), sword("b", 2)]);
    }

    #[test]
    fn set_credential__when_already_present__keeps_first() {
        // given
        let mut record = PlayerRecord::new("alice");
        assert!(record.set_credential(Credential::new("first")));

        // when
        let replaced = record.set_credential(Credential::new("second"));

        // then
        assert!(!replaced);
        assert_eq!(record.credential().map(Credential::expose), Some("first"));
    }

    #[test]
    fn credential_debug__does_not_leak_secret() {
        let credential = Credential::new("super-secret");
        let shown = format!("{credential:?}");
        assert!(!shown.contains("super-secret"));
        assert_eq!(shown, format!("Credential({})", credential.fingerprint()));
    }

    #[test]
    fn item_kind_from_name__accepts_ledger_spelling() {
        assert_eq!(ItemKind::from_name("Copper sword"), Some(ItemKind::CopperSword));
        assert_eq!(ItemKind::from_name(" wooden SWORD "), Some(ItemKind::WoodenSword));
        assert_eq!(ItemKind::from_name("Iron sword"), None);
    }
}
