//! Choice resolution: the Intent/Delta pipeline.
//!
//! The narrator never changes numbers directly. It offers [`Choice`]s, each
//! declaring an [`Intent`] and optional [`Requirement`]s. When the player
//! picks one:
//! 1. The store checks the requirements (explicit and implied by the intent)
//! 2. [`RulesEngine::resolve`] computes a [`Delta`] from the intent
//! 3. The delta is applied atomically and recorded as one ledger event
//!
//! All arithmetic lives here, so a given choice against a given state always
//! produces the same delta.

use crate::config::RulesConfig;
use crate::store::{InvariantViolation, Unmet};
use crate::world::{CharacterId, EntityRef, GameState, ItemId, LocationId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Actor name recorded for player-driven events.
pub const PLAYER_ACTOR: &str = "player";

/// Actor name recorded for events the engine writes on its own behalf.
pub const NARRATOR_ACTOR: &str = "narrator";

// ============================================================================
// Requirements
// ============================================================================

/// A resource-sufficiency condition attached to a choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    /// An attribute, or a pool's current value, is at least `amount`.
    StatAtLeast { stat: String, amount: i64 },
    /// The player holds at least `quantity` of an item.
    ItemAtLeast { item: ItemId, quantity: u32 },
}

impl Requirement {
    /// What the player currently has toward this requirement.
    pub fn held(&self, state: &GameState) -> i64 {
        match self {
            Requirement::StatAtLeast { stat, .. } => state.stats.value(stat).unwrap_or(0),
            Requirement::ItemAtLeast { item, .. } => i64::from(state.inventory.quantity(item)),
        }
    }

    pub fn needed(&self) -> i64 {
        match self {
            Requirement::StatAtLeast { amount, .. } => *amount,
            Requirement::ItemAtLeast { quantity, .. } => i64::from(*quantity),
        }
    }

    /// Check against `state`, reporting the shortfall on failure.
    pub fn check(&self, state: &GameState) -> Result<(), Unmet> {
        let held = self.held(state);
        if held >= self.needed() {
            Ok(())
        } else {
            Err(Unmet {
                requirement: self.clone(),
                held,
            })
        }
    }

    pub fn entity(&self) -> EntityRef {
        match self {
            Requirement::StatAtLeast { stat, .. } => EntityRef::Stat(stat.clone()),
            Requirement::ItemAtLeast { item, .. } => EntityRef::Item(item.clone()),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::StatAtLeast { stat, amount } => write!(f, "{stat} >= {amount}"),
            Requirement::ItemAtLeast { item, quantity } => write!(f, "item {item} >= {quantity}"),
        }
    }
}

// ============================================================================
// Intents
// ============================================================================

/// What a choice does, mechanically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// Purely narrative; no resource changes.
    Act,
    Travel {
        location: LocationId,
    },
    Use {
        item: ItemId,
    },
    Take {
        item: ItemId,
        quantity: u32,
    },
    Give {
        item: ItemId,
        quantity: u32,
        character: CharacterId,
    },
    Spend {
        stat: String,
        amount: i64,
    },
    Gain {
        stat: String,
        amount: i64,
    },
    Rest,
    Talk {
        character: CharacterId,
        topic: Option<String>,
    },
    /// Free text typed during dialogue. Never produced by the wire codec.
    Speak {
        character: CharacterId,
        text: String,
    },
}

impl Intent {
    /// Entities this intent touches.
    pub fn refs(&self) -> Vec<EntityRef> {
        match self {
            Intent::Act | Intent::Rest => Vec::new(),
            Intent::Travel { location } => vec![EntityRef::Location(location.clone())],
            Intent::Use { item } | Intent::Take { item, .. } => vec![EntityRef::Item(item.clone())],
            Intent::Give {
                item, character, ..
            } => vec![
                EntityRef::Item(item.clone()),
                EntityRef::Character(character.clone()),
            ],
            Intent::Spend { stat, .. } | Intent::Gain { stat, .. } => {
                vec![EntityRef::Stat(stat.clone())]
            }
            Intent::Talk { character, .. } | Intent::Speak { character, .. } => {
                vec![EntityRef::Character(character.clone())]
            }
        }
    }

    /// Requirements that follow from the intent itself.
    pub fn implied_requirements(&self) -> Vec<Requirement> {
        match self {
            Intent::Use { item } => vec![Requirement::ItemAtLeast {
                item: item.clone(),
                quantity: 1,
            }],
            Intent::Give { item, quantity, .. } => vec![Requirement::ItemAtLeast {
                item: item.clone(),
                quantity: *quantity,
            }],
            Intent::Spend { stat, amount } => vec![Requirement::StatAtLeast {
                stat: stat.clone(),
                amount: *amount,
            }],
            _ => Vec::new(),
        }
    }
}

/// Renders in the same syntax the narrator writes inside `{intent: ...}`.
impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Act => f.write_str("act"),
            Intent::Travel { location } => write!(f, "travel {location}"),
            Intent::Use { item } => write!(f, "use {item}"),
            Intent::Take { item, quantity } => write!(f, "take {item} {quantity}"),
            Intent::Give {
                item,
                quantity,
                character,
            } => write!(f, "give {item} {quantity} to {character}"),
            Intent::Spend { stat, amount } => write!(f, "spend {stat} {amount}"),
            Intent::Gain { stat, amount } => write!(f, "gain {stat} {amount}"),
            Intent::Rest => f.write_str("rest"),
            Intent::Talk {
                character,
                topic: Some(topic),
            } => write!(f, "talk {character} about {topic}"),
            Intent::Talk {
                character,
                topic: None,
            } => write!(f, "talk {character}"),
            Intent::Speak { character, text } => write!(f, "say to {character}: {text}"),
        }
    }
}

// ============================================================================
// Choices
// ============================================================================

/// One option offered to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    pub intent: Intent,
}

impl Choice {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            requirements: Vec::new(),
            intent: Intent::Act,
        }
    }

    /// Wrap dialogue free text. Speech carries no requirements and no resources.
    pub fn speech(character: CharacterId, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            label: text.clone(),
            requirements: Vec::new(),
            intent: Intent::Speak { character, text },
        }
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    /// Explicit requirements followed by the ones implied by the intent.
    pub fn all_requirements(&self) -> impl Iterator<Item = Requirement> + '_ {
        self.requirements
            .iter()
            .cloned()
            .chain(self.intent.implied_requirements())
    }

    /// Every entity the choice mentions.
    pub fn refs(&self) -> Vec<EntityRef> {
        let mut refs: Vec<EntityRef> = self.requirements.iter().map(Requirement::entity).collect();
        for r in self.intent.refs() {
            if !refs.contains(&r) {
                refs.push(r);
            }
        }
        refs
    }

    /// The choice as a wire-format line (without the leading number).
    pub fn to_wire(&self) -> String {
        let mut line = self.label.clone();
        if !self.requirements.is_empty() {
            let reqs: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
            line.push_str(&format!(" {{requires: {}}}", reqs.join(", ")));
        }
        if self.intent != Intent::Act {
            line.push_str(&format!(" {{intent: {}}}", self.intent));
        }
        line
    }
}

// ============================================================================
// Deltas
// ============================================================================

/// A single state change inside a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    /// Add to an attribute or pool (negative to subtract).
    Stat { stat: String, amount: i64 },
    /// Add to an item's quantity (negative to remove).
    Item { item: ItemId, amount: i64 },
    Equip { item: ItemId },
    MoveTo { location: LocationId },
    Relationship { character: CharacterId, amount: i64 },
    LearnFact { character: CharacterId, fact: String },
    /// Record that the player is with this character now.
    Meet { character: CharacterId },
}

impl Change {
    pub fn entity(&self) -> EntityRef {
        match self {
            Change::Stat { stat, .. } => EntityRef::Stat(stat.clone()),
            Change::Item { item, .. } | Change::Equip { item } => EntityRef::Item(item.clone()),
            Change::MoveTo { location } => EntityRef::Location(location.clone()),
            Change::Relationship { character, .. }
            | Change::LearnFact { character, .. }
            | Change::Meet { character } => EntityRef::Character(character.clone()),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Stat { stat, amount } => write!(f, "{stat} {amount:+}"),
            Change::Item { item, amount } => write!(f, "{item} {amount:+}"),
            Change::Equip { item } => write!(f, "equipped {item}"),
            Change::MoveTo { location } => write!(f, "moved to {location}"),
            Change::Relationship { character, amount } => {
                write!(f, "{character} relationship {amount:+}")
            }
            Change::LearnFact { character, fact } => write!(f, "{character} learned: {fact}"),
            Change::Meet { character } => write!(f, "met {character}"),
        }
    }
}

/// A fully computed state change, ready to be applied as one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub actor: String,
    pub summary: String,
    pub changes: Vec<Change>,
    pub refs: Vec<EntityRef>,
}

impl Delta {
    /// A delta that only records something happening.
    pub fn note(actor: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            summary: summary.into(),
            changes: Vec::new(),
            refs: Vec::new(),
        }
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_ref(mut self, entity: EntityRef) -> Self {
        if !self.refs.contains(&entity) {
            self.refs.push(entity);
        }
        self
    }

    pub fn is_mechanical(&self) -> bool {
        !self.changes.is_empty()
    }
}

// ============================================================================
// Rules Engine
// ============================================================================

/// Turns chosen intents into deltas.
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    config: RulesConfig,
}

impl RulesEngine {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// Compute the delta for `choice` against `state`.
    ///
    /// Fails if the choice mentions something the world does not contain, if
    /// a requirement is unmet, or if the intent exceeds a rule limit.
    pub fn resolve(&self, state: &GameState, choice: &Choice) -> Result<Delta, InvariantViolation> {
        for entity in choice.refs() {
            if !state.knows(&entity) {
                return Err(InvariantViolation::UnknownEntity(entity));
            }
        }
        for requirement in choice.all_requirements() {
            requirement.check(state).map_err(InvariantViolation::Unmet)?;
        }

        let mut delta = Delta::note(PLAYER_ACTOR, choice.label.clone());
        let changes = self.changes_for(state, &choice.intent)?;
        delta.changes = changes;

        delta = delta.with_ref(EntityRef::Location(state.current_location.clone()));
        for entity in choice.refs() {
            delta = delta.with_ref(entity);
        }

        delta.summary = match &choice.intent {
            Intent::Speak { character, text } => {
                let name = state.display_name(&EntityRef::Character(character.clone()));
                format!("Said to {name}: \"{text}\"")
            }
            _ if delta.changes.is_empty() => choice.label.clone(),
            _ => {
                let effects: Vec<String> = delta.changes.iter().map(|c| c.to_string()).collect();
                format!("{} ({})", choice.label, effects.join(", "))
            }
        };

        Ok(delta)
    }

    fn changes_for(&self, state: &GameState, intent: &Intent) -> Result<Vec<Change>, InvariantViolation> {
        let changes = match intent {
            Intent::Act => Vec::new(),

            Intent::Travel { location } => vec![Change::MoveTo {
                location: location.clone(),
            }],

            Intent::Use { item } => match state.inventory.get(item) {
                Some(entry) if entry.item.consumable => vec![Change::Item {
                    item: item.clone(),
                    amount: -1,
                }],
                Some(entry) if entry.item.equippable => vec![Change::Equip { item: item.clone() }],
                _ => Vec::new(),
            },

            Intent::Take { item, quantity } => {
                self.check_limit("item grant", i64::from(*quantity), i64::from(self.config.max_item_grant))?;
                vec![Change::Item {
                    item: item.clone(),
                    amount: i64::from(*quantity),
                }]
            }

            Intent::Give {
                item,
                quantity,
                character,
            } => vec![
                Change::Item {
                    item: item.clone(),
                    amount: -i64::from(*quantity),
                },
                Change::Relationship {
                    character: character.clone(),
                    amount: i64::from(*quantity),
                },
                Change::Meet {
                    character: character.clone(),
                },
            ],

            Intent::Spend { stat, amount } => vec![Change::Stat {
                stat: stat.clone(),
                amount: -*amount,
            }],

            Intent::Gain { stat, amount } => {
                self.check_limit("stat gain", *amount, self.config.max_stat_gain)?;
                let amount = match state.stats.pool(stat) {
                    Some(pool) => (*amount).min(pool.headroom()),
                    None => *amount,
                };
                if amount > 0 {
                    vec![Change::Stat {
                        stat: stat.clone(),
                        amount,
                    }]
                } else {
                    Vec::new()
                }
            }

            Intent::Rest => state
                .stats
                .pools
                .iter()
                .filter_map(|(name, pool)| {
                    let amount = self.config.rest_recovery.min(pool.headroom());
                    (amount > 0).then(|| Change::Stat {
                        stat: name.clone(),
                        amount,
                    })
                })
                .collect(),

            Intent::Talk { character, topic } => {
                let mut changes = vec![Change::Meet {
                    character: character.clone(),
                }];
                if let Some(topic) = topic {
                    changes.push(Change::LearnFact {
                        character: character.clone(),
                        fact: format!("discussed {topic}"),
                    });
                }
                changes
            }

            Intent::Speak { character, .. } => vec![Change::Meet {
                character: character.clone(),
            }],
        };
        Ok(changes)
    }

    fn check_limit(&self, what: &'static str, requested: i64, limit: i64) -> Result<(), InvariantViolation> {
        if requested > limit {
            Err(InvariantViolation::ExceedsLimit {
                what,
                requested,
                limit,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::new_adventure;

    fn engine() -> RulesEngine {
        RulesEngine::new(RulesConfig::default())
    }

    #[test]
    fn test_spend_computes_negative_stat_change() {
        let state = new_adventure("Ada");
        let choice = Choice::new("Bribe the guard").with_intent(Intent::Spend {
            stat: "gold".into(),
            amount: 5,
        });

        let delta = engine().resolve(&state, &choice).unwrap();
        assert_eq!(
            delta.changes,
            vec![Change::Stat {
                stat: "gold".into(),
                amount: -5
            }]
        );
        assert_eq!(delta.actor, PLAYER_ACTOR);
        assert!(delta.summary.starts_with("Bribe the guard"));
        assert!(delta.refs.contains(&EntityRef::Stat("gold".into())));
    }

    #[test]
    fn test_spend_beyond_holdings_is_unmet() {
        let state = new_adventure("Ada");
        let choice = Choice::new("Lift the cart").with_intent(Intent::Spend {
            stat: "strength".into(),
            amount: 5,
        });

        match engine().resolve(&state, &choice) {
            Err(InvariantViolation::Unmet(unmet)) => {
                assert_eq!(unmet.held, 1);
                assert_eq!(unmet.requirement.needed(), 5);
            }
            other => panic!("expected unmet requirement, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let state = new_adventure("Ada");
        let choice = Choice::new("Take the crown").with_intent(Intent::Take {
            item: ItemId::new("golden_crown"),
            quantity: 1,
        });
        assert!(matches!(
            engine().resolve(&state, &choice),
            Err(InvariantViolation::UnknownEntity(EntityRef::Item(_)))
        ));
    }

    #[test]
    fn test_take_over_grant_limit() {
        let state = new_adventure("Ada");
        let choice = Choice::new("Grab all the rope").with_intent(Intent::Take {
            item: ItemId::new("rope"),
            quantity: 50,
        });
        assert!(matches!(
            engine().resolve(&state, &choice),
            Err(InvariantViolation::ExceedsLimit { what: "item grant", .. })
        ));
    }

    #[test]
    fn test_gain_on_full_pool_is_noop() {
        let state = new_adventure("Ada");
        let choice = Choice::new("Pray").with_intent(Intent::Gain {
            stat: "health".into(),
            amount: 5,
        });
        let delta = engine().resolve(&state, &choice).unwrap();
        assert!(!delta.is_mechanical());
        assert_eq!(delta.summary, "Pray");
    }

    #[test]
    fn test_use_consumable_and_equippable() {
        let state = new_adventure("Ada");
        let potion = Choice::new("Drink").with_intent(Intent::Use {
            item: ItemId::new("healing_potion"),
        });
        assert_eq!(
            engine().resolve(&state, &potion).unwrap().changes,
            vec![Change::Item {
                item: ItemId::new("healing_potion"),
                amount: -1
            }]
        );

        let staff = Choice::new("Ready the staff").with_intent(Intent::Use {
            item: ItemId::new("walking_staff"),
        });
        assert_eq!(
            engine().resolve(&state, &staff).unwrap().changes,
            vec![Change::Equip {
                item: ItemId::new("walking_staff")
            }]
        );
    }

    #[test]
    fn test_speech_has_no_resource_changes() {
        let state = new_adventure("Ada");
        let choice = Choice::speech(CharacterId::new("mira"), "I demand your sword");
        let delta = engine().resolve(&state, &choice).unwrap();
        assert_eq!(
            delta.changes,
            vec![Change::Meet {
                character: CharacterId::new("mira")
            }]
        );
        assert_eq!(delta.summary, "Said to Mira: \"I demand your sword\"");
    }

    #[test]
    fn test_choice_to_wire() {
        let choice = Choice::new("Bribe the guard")
            .requires(Requirement::StatAtLeast {
                stat: "gold".into(),
                amount: 5,
            })
            .with_intent(Intent::Spend {
                stat: "gold".into(),
                amount: 5,
            });
        assert_eq!(
            choice.to_wire(),
            "Bribe the guard {requires: gold >= 5} {intent: spend gold 5}"
        );
        assert_eq!(Choice::new("Wait").to_wire(), "Wait");
    }

    #[test]
    fn test_refs_are_deduplicated() {
        let choice = Choice::new("Drink")
            .requires(Requirement::ItemAtLeast {
                item: ItemId::new("healing_potion"),
                quantity: 1,
            })
            .with_intent(Intent::Use {
                item: ItemId::new("healing_potion"),
            });
        assert_eq!(choice.refs().len(), 1);
    }
}
