//! Game world data model.
//!
//! Everything the narrator is allowed to talk about lives here: the
//! player's stats and resource pools, the inventory, the known cast of
//! characters and locations, and the append-only event ledger. The types
//! are plain data; all mutation goes through [`crate::store::GameStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Whether `s` is usable as an entity id (`[a-z0-9_]+`).
pub fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

macro_rules! slug_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Parse a narrator-supplied token, rejecting anything that is not a slug.
            pub fn parse(token: &str) -> Option<Self> {
                is_valid_slug(token).then(|| Self(token.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

slug_id!(
    /// Identifier for items in the catalogue.
    ItemId
);
slug_id!(
    /// Identifier for non-player characters.
    CharacterId
);
slug_id!(
    /// Identifier for locations.
    LocationId
);

/// Unique identifier for a playthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub Uuid);

impl GameId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Player Stats
// ============================================================================

/// A bounded resource such as health or mana.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub current: i64,
    pub max: i64,
}

impl Pool {
    pub fn full(max: i64) -> Self {
        Self { current: max, max }
    }

    /// How much the pool can still gain before hitting its ceiling.
    pub fn headroom(&self) -> i64 {
        (self.max - self.current).max(0)
    }
}

/// Named integer attributes plus bounded resource pools.
///
/// Attributes and pools share one namespace; a stat name refers to exactly
/// one of them. Every value has a floor of zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub attributes: BTreeMap<String, i64>,
    pub pools: BTreeMap<String, Pool>,
}

impl PlayerStats {
    /// Current value of an attribute, or the current fill of a pool.
    pub fn value(&self, stat: &str) -> Option<i64> {
        self.attributes
            .get(stat)
            .copied()
            .or_else(|| self.pools.get(stat).map(|p| p.current))
    }

    pub fn has(&self, stat: &str) -> bool {
        self.attributes.contains_key(stat) || self.pools.contains_key(stat)
    }

    pub fn pool(&self, stat: &str) -> Option<&Pool> {
        self.pools.get(stat)
    }
}

impl Default for PlayerStats {
    fn default() -> Self {
        let attributes = [("strength", 1), ("wisdom", 1), ("charisma", 0), ("gold", 0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let pools = [("health", Pool::full(100)), ("mana", Pool::full(100))]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self { attributes, pools }
    }
}

// ============================================================================
// Items & Inventory
// ============================================================================

/// An item definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub equippable: bool,
    #[serde(default)]
    pub consumable: bool,
}

impl Item {
    pub fn new(id: &str, name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(id),
            name: name.into(),
            description: String::new(),
            equippable: false,
            consumable: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn consumable(mut self) -> Self {
        self.consumable = true;
        self
    }

    pub fn equippable(mut self) -> Self {
        self.equippable = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item: Item,
    pub quantity: u32,
}

/// The player's possessions.
///
/// Entries with quantity zero are items the world knows about but the
/// player does not currently hold; the narrator may only offer items that
/// have an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    entries: BTreeMap<ItemId, InventoryEntry>,
    #[serde(default)]
    equipped: BTreeSet<ItemId>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item definition with a starting quantity.
    pub fn with_item(mut self, item: Item, quantity: u32) -> Self {
        self.entries
            .insert(item.id.clone(), InventoryEntry { item, quantity });
        self
    }

    pub fn get(&self, id: &ItemId) -> Option<&InventoryEntry> {
        self.entries.get(id)
    }

    pub fn knows(&self, id: &ItemId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn quantity(&self, id: &ItemId) -> u32 {
        self.entries.get(id).map(|e| e.quantity).unwrap_or(0)
    }

    pub fn is_equipped(&self, id: &ItemId) -> bool {
        self.equipped.contains(id)
    }

    /// Every known entry, held or not.
    pub fn entries(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.values()
    }

    /// Entries the player actually holds.
    pub fn held(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.values().filter(|e| e.quantity > 0)
    }

    pub(crate) fn set_quantity(&mut self, id: &ItemId, quantity: u32) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.quantity = quantity;
        }
        if quantity == 0 {
            self.equipped.remove(id);
        }
    }

    pub(crate) fn equip(&mut self, id: &ItemId) {
        self.equipped.insert(id.clone());
    }
}

// ============================================================================
// Characters & Locations
// ============================================================================

/// Where and when a character was last encountered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sighting {
    pub location: LocationId,
    pub event: u64,
}

/// A non-player character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Things this character has learned from or about the player.
    #[serde(default)]
    pub known_facts: BTreeSet<String>,
    #[serde(default)]
    pub relationship: i64,
    #[serde(default)]
    pub last_seen: Option<Sighting>,
}

impl Character {
    pub fn new(id: &str, name: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(id),
            name: name.into(),
            description: String::new(),
            known_facts: BTreeSet::new(),
            relationship: 0,
            last_seen: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn seen_at(mut self, location: &LocationId, event: u64) -> Self {
        self.last_seen = Some(Sighting {
            location: location.clone(),
            event,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    /// Seed text the narrator expands on.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visited: bool,
    #[serde(default)]
    pub connections: Vec<LocationId>,
}

impl Location {
    pub fn new(id: &str, name: impl Into<String>) -> Self {
        Self {
            id: LocationId::new(id),
            name: name.into(),
            description: String::new(),
            visited: false,
            connections: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn connected_to(mut self, ids: &[&str]) -> Self {
        self.connections = ids.iter().map(|id| LocationId::new(*id)).collect();
        self
    }
}

// ============================================================================
// Events
// ============================================================================

/// A reference from an event to something in the world.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Item(ItemId),
    Character(CharacterId),
    Location(LocationId),
    Stat(String),
}

impl EntityRef {
    /// The bare id, used for keyword matching.
    pub fn key(&self) -> &str {
        match self {
            EntityRef::Item(id) => id.as_str(),
            EntityRef::Character(id) => id.as_str(),
            EntityRef::Location(id) => id.as_str(),
            EntityRef::Stat(name) => name,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Item(id) => write!(f, "item:{id}"),
            EntityRef::Character(id) => write!(f, "character:{id}"),
            EntityRef::Location(id) => write!(f, "location:{id}"),
            EntityRef::Stat(name) => write!(f, "stat:{name}"),
        }
    }
}

/// One entry of the ledger. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub summary: String,
    #[serde(default)]
    pub refs: Vec<EntityRef>,
}

impl Event {
    pub fn mentions(&self, entity: &EntityRef) -> bool {
        self.refs.contains(entity)
    }
}

/// Running account of the events that have left the narrator's window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySummary {
    pub text: String,
    /// Sequence of the last event folded into `text`; 0 when nothing is.
    pub through: u64,
}

impl StorySummary {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

// ============================================================================
// Game State
// ============================================================================

/// The aggregate root of everything persisted about a playthrough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub game_id: GameId,
    pub player_name: String,
    pub current_location: LocationId,
    pub stats: PlayerStats,
    pub inventory: Inventory,
    pub characters: BTreeMap<CharacterId, Character>,
    pub locations: BTreeMap<LocationId, Location>,
    pub events: Vec<Event>,
    pub summary: StorySummary,
}

impl GameState {
    /// An empty world with a single starting location.
    pub fn new(player_name: impl Into<String>, start: Location) -> Self {
        let current_location = start.id.clone();
        let mut locations = BTreeMap::new();
        locations.insert(start.id.clone(), Location { visited: true, ..start });

        Self {
            game_id: GameId::new(),
            player_name: player_name.into(),
            current_location,
            stats: PlayerStats::default(),
            inventory: Inventory::new(),
            characters: BTreeMap::new(),
            locations,
            events: Vec::new(),
            summary: StorySummary::default(),
        }
    }

    pub fn with_inventory(mut self, inventory: Inventory) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn with_stats(mut self, stats: PlayerStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_character(mut self, character: Character) -> Self {
        self.characters.insert(character.id.clone(), character);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.insert(location.id.clone(), location);
        self
    }

    pub fn location(&self) -> Option<&Location> {
        self.locations.get(&self.current_location)
    }

    pub fn character(&self, id: &CharacterId) -> Option<&Character> {
        self.characters.get(id)
    }

    /// Characters whose last sighting was at the current location.
    pub fn characters_here(&self) -> impl Iterator<Item = &Character> {
        self.characters.values().filter(move |c| {
            c.last_seen
                .as_ref()
                .is_some_and(|s| s.location == self.current_location)
        })
    }

    /// Whether the referenced entity exists in this world.
    pub fn knows(&self, entity: &EntityRef) -> bool {
        match entity {
            EntityRef::Item(id) => self.inventory.knows(id),
            EntityRef::Character(id) => self.characters.contains_key(id),
            EntityRef::Location(id) => self.locations.contains_key(id),
            EntityRef::Stat(name) => self.stats.has(name),
        }
    }

    pub fn next_sequence(&self) -> u64 {
        self.events.last().map(|e| e.sequence + 1).unwrap_or(1)
    }

    /// Display name for an entity reference.
    pub fn display_name(&self, entity: &EntityRef) -> String {
        match entity {
            EntityRef::Item(id) => self
                .inventory
                .get(id)
                .map(|e| e.item.name.clone())
                .unwrap_or_else(|| id.to_string()),
            EntityRef::Character(id) => self
                .characters
                .get(id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| id.to_string()),
            EntityRef::Location(id) => self
                .locations
                .get(id)
                .map(|l| l.name.clone())
                .unwrap_or_else(|| id.to_string()),
            EntityRef::Stat(name) => name.clone(),
        }
    }
}
