//! The game state store.
//!
//! [`GameStore`] is the only thing allowed to mutate a [`GameState`]. Every
//! mutation arrives as a [`Delta`], is checked in full before anything is
//! touched, and leaves exactly one new event in the ledger.

use crate::config::RulesConfig;
use crate::rules::{Change, Choice, Delta, Requirement, RulesEngine};
use crate::world::{EntityRef, Event, GameState, ItemId, Sighting, StorySummary};
use chrono::Utc;
use std::collections::BTreeMap;
use thiserror::Error;

/// A requirement the player does not meet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("requires {requirement}, but only {held} available")]
pub struct Unmet {
    pub requirement: Requirement,
    pub held: i64,
}

/// A state change that would break a world invariant. Nothing is applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("unknown {0}")]
    UnknownEntity(EntityRef),

    #[error("{entity} would drop to {value}, below zero")]
    BelowFloor { entity: EntityRef, value: i64 },

    #[error("{entity} would reach {value}, above its maximum of {max}")]
    AboveCeiling {
        entity: EntityRef,
        value: i64,
        max: i64,
    },

    #[error("{what} of {requested} exceeds the limit of {limit}")]
    ExceedsLimit {
        what: &'static str,
        requested: i64,
        limit: i64,
    },

    #[error("cannot equip {0}: not held or not equippable")]
    NotEquippable(ItemId),

    #[error("event ledger broken: expected sequence {expected}, found {found}")]
    BrokenLedger { expected: u64, found: u64 },

    #[error("story summary covers event {through}, but the ledger ends at {last}")]
    SummaryAhead { through: u64, last: u64 },

    #[error(transparent)]
    Unmet(#[from] Unmet),
}

/// Check that a whole state satisfies the store's invariants.
///
/// Used when adopting a state that did not come from the store itself,
/// such as one read from a save file.
pub fn check_invariants(state: &GameState) -> Result<(), InvariantViolation> {
    for (name, value) in &state.stats.attributes {
        if *value < 0 {
            return Err(InvariantViolation::BelowFloor {
                entity: EntityRef::Stat(name.clone()),
                value: *value,
            });
        }
    }
    for (name, pool) in &state.stats.pools {
        let entity = EntityRef::Stat(name.clone());
        if pool.current < 0 || pool.max < 0 {
            return Err(InvariantViolation::BelowFloor {
                entity,
                value: pool.current.min(pool.max),
            });
        }
        if pool.current > pool.max {
            return Err(InvariantViolation::AboveCeiling {
                entity,
                value: pool.current,
                max: pool.max,
            });
        }
    }

    let location = EntityRef::Location(state.current_location.clone());
    if !state.knows(&location) {
        return Err(InvariantViolation::UnknownEntity(location));
    }

    for (expected, event) in (1u64..).zip(&state.events) {
        if event.sequence != expected {
            return Err(InvariantViolation::BrokenLedger {
                expected,
                found: event.sequence,
            });
        }
    }

    let last = state.next_sequence() - 1;
    if state.summary.through > last {
        return Err(InvariantViolation::SummaryAhead {
            through: state.summary.through,
            last,
        });
    }
    Ok(())
}

/// Exclusive owner of the game state.
#[derive(Debug, Clone)]
pub struct GameStore {
    state: GameState,
    rules: RulesEngine,
}

impl GameStore {
    /// Adopt `state` after checking its invariants.
    pub fn new(state: GameState, rules: RulesConfig) -> Result<Self, InvariantViolation> {
        check_invariants(&state)?;
        Ok(Self {
            state,
            rules: RulesEngine::new(rules),
        })
    }

    /// Read-only view of the current state.
    pub fn snapshot(&self) -> &GameState {
        &self.state
    }

    pub fn rules(&self) -> &RulesEngine {
        &self.rules
    }

    /// Check a choice's requirements, including those its intent implies.
    pub fn validate_choice(&self, choice: &Choice) -> Result<(), Unmet> {
        choice
            .all_requirements()
            .try_for_each(|r| r.check(&self.state))
    }

    /// Compute the delta a choice would produce, without applying it.
    pub fn resolve(&self, choice: &Choice) -> Result<Delta, InvariantViolation> {
        self.rules.resolve(&self.state, choice)
    }

    /// Whether a choice can be offered right now.
    pub fn is_offerable(&self, choice: &Choice) -> bool {
        self.validate_choice(choice).is_ok() && self.resolve(choice).is_ok()
    }

    /// Apply a delta atomically and append its event to the ledger.
    pub fn apply_delta(&mut self, delta: Delta) -> Result<&Event, InvariantViolation> {
        self.check_delta(&delta)?;

        let sequence = self.state.next_sequence();
        for change in &delta.changes {
            self.apply_change(change, sequence);
        }

        let index = self.state.events.len();
        self.state.events.push(Event {
            sequence,
            timestamp: Utc::now(),
            actor: delta.actor,
            summary: delta.summary,
            refs: delta.refs,
        });

        tracing::debug!(sequence, changes = delta.changes.len(), "applied delta");
        Ok(&self.state.events[index])
    }

    /// Replace the story summary. It may only move forward through the
    /// ledger; resources and events are untouched.
    pub fn record_summary(&mut self, summary: StorySummary) -> Result<(), InvariantViolation> {
        let last = self.state.next_sequence() - 1;
        if summary.through > last {
            return Err(InvariantViolation::SummaryAhead {
                through: summary.through,
                last,
            });
        }
        if summary.through < self.state.summary.through {
            return Err(InvariantViolation::BrokenLedger {
                expected: self.state.summary.through,
                found: summary.through,
            });
        }
        tracing::debug!(through = summary.through, "story summary updated");
        self.state.summary = summary;
        Ok(())
    }

    /// Walk the changes against running totals; nothing is mutated.
    fn check_delta(&self, delta: &Delta) -> Result<(), InvariantViolation> {
        for entity in &delta.refs {
            if !self.state.knows(entity) {
                return Err(InvariantViolation::UnknownEntity(entity.clone()));
            }
        }

        let mut stats: BTreeMap<&str, i64> = BTreeMap::new();
        let mut items: BTreeMap<&ItemId, i64> = BTreeMap::new();

        for change in &delta.changes {
            let entity = change.entity();
            if !self.state.knows(&entity) {
                return Err(InvariantViolation::UnknownEntity(entity));
            }

            match change {
                Change::Stat { stat, amount } => {
                    let current = stats
                        .get(stat.as_str())
                        .copied()
                        .or_else(|| self.state.stats.value(stat))
                        .unwrap_or(0);
                    let value = current.checked_add(*amount).ok_or_else(|| {
                        InvariantViolation::AboveCeiling {
                            entity: entity.clone(),
                            value: i64::MAX,
                            max: i64::MAX,
                        }
                    })?;
                    if value < 0 {
                        return Err(InvariantViolation::BelowFloor { entity, value });
                    }
                    if let Some(pool) = self.state.stats.pool(stat) {
                        if value > pool.max {
                            return Err(InvariantViolation::AboveCeiling {
                                entity,
                                value,
                                max: pool.max,
                            });
                        }
                    }
                    stats.insert(stat.as_str(), value);
                }
                Change::Item { item, amount } => {
                    let current = items
                        .get(item)
                        .copied()
                        .unwrap_or_else(|| i64::from(self.state.inventory.quantity(item)));
                    // Quantities are u32, so only a negative overflow is possible here.
                    let value = current.saturating_add(*amount);
                    if value < 0 {
                        return Err(InvariantViolation::BelowFloor { entity, value });
                    }
                    if value > i64::from(u32::MAX) {
                        return Err(InvariantViolation::AboveCeiling {
                            entity,
                            value,
                            max: i64::from(u32::MAX),
                        });
                    }
                    items.insert(item, value);
                }
                Change::Equip { item } => {
                    let held = items
                        .get(item)
                        .copied()
                        .unwrap_or_else(|| i64::from(self.state.inventory.quantity(item)));
                    let equippable = self
                        .state
                        .inventory
                        .get(item)
                        .is_some_and(|e| e.item.equippable);
                    if held < 1 || !equippable {
                        return Err(InvariantViolation::NotEquippable(item.clone()));
                    }
                }
                Change::MoveTo { .. }
                | Change::Relationship { .. }
                | Change::LearnFact { .. }
                | Change::Meet { .. } => {}
            }
        }
        Ok(())
    }

    /// Infallible once `check_delta` has passed.
    fn apply_change(&mut self, change: &Change, sequence: u64) {
        let state = &mut self.state;
        match change {
            Change::Stat { stat, amount } => {
                if let Some(value) = state.stats.attributes.get_mut(stat) {
                    *value = value.saturating_add(*amount);
                } else if let Some(pool) = state.stats.pools.get_mut(stat) {
                    pool.current = pool.current.saturating_add(*amount);
                }
            }
            Change::Item { item, amount } => {
                let value = i64::from(state.inventory.quantity(item)).saturating_add(*amount);
                let quantity = u32::try_from(value).unwrap_or(0);
                state.inventory.set_quantity(item, quantity);
            }
            Change::Equip { item } => state.inventory.equip(item),
            Change::MoveTo { location } => {
                state.current_location = location.clone();
                if let Some(loc) = state.locations.get_mut(location) {
                    loc.visited = true;
                }
            }
            Change::Relationship { character, amount } => {
                if let Some(c) = state.characters.get_mut(character) {
                    c.relationship = c.relationship.saturating_add(*amount);
                }
            }
            Change::LearnFact { character, fact } => {
                if let Some(c) = state.characters.get_mut(character) {
                    c.known_facts.insert(fact.clone());
                }
            }
            Change::Meet { character } => {
                let location = state.current_location.clone();
                if let Some(c) = state.characters.get_mut(character) {
                    c.last_seen = Some(Sighting {
                        location,
                        event: sequence,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Intent, NARRATOR_ACTOR};
    use crate::seed::new_adventure;
    use crate::world::{CharacterId, LocationId};

    fn store() -> GameStore {
        GameStore::new(new_adventure("Ada"), RulesConfig::default()).unwrap()
    }

    #[test]
    fn test_apply_delta_appends_one_event() {
        let mut store = store();
        let choice = Choice::new("Pay Mira for a room").with_intent(Intent::Spend {
            stat: "gold".into(),
            amount: 4,
        });
        let delta = store.resolve(&choice).unwrap();
        let event = store.apply_delta(delta).unwrap();

        assert_eq!(event.sequence, 1);
        assert_eq!(event.actor, "player");
        assert_eq!(store.snapshot().stats.value("gold"), Some(6));
        assert_eq!(store.snapshot().events.len(), 1);
    }

    #[test]
    fn test_below_floor_rejected_atomically() {
        let mut store = store();
        let before = store.snapshot().clone();

        let delta = Delta::note("player", "Spend everything twice")
            .with_change(Change::Stat {
                stat: "gold".into(),
                amount: -6,
            })
            .with_change(Change::Stat {
                stat: "gold".into(),
                amount: -6,
            });

        let err = store.apply_delta(delta).unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::BelowFloor {
                entity: EntityRef::Stat("gold".into()),
                value: -2
            }
        );
        assert_eq!(store.snapshot(), &before);
    }

    #[test]
    fn test_pool_ceiling_rejected() {
        let mut store = store();
        let delta = Delta::note("player", "Overheal").with_change(Change::Stat {
            stat: "health".into(),
            amount: 1,
        });
        assert!(matches!(
            store.apply_delta(delta),
            Err(InvariantViolation::AboveCeiling { max: 100, .. })
        ));
    }

    #[test]
    fn test_attribute_overflow_rejected() {
        let mut state = new_adventure("Ada");
        state.stats.attributes.insert("gold".into(), i64::MAX - 1);
        assert!(check_invariants(&state).is_ok());
        let mut store = GameStore::new(state, RulesConfig::default()).unwrap();
        let before = store.snapshot().clone();

        let choice = Choice::new("Find a purse").with_intent(Intent::Gain {
            stat: "gold".into(),
            amount: 5,
        });
        let delta = store.resolve(&choice).unwrap();
        assert_eq!(
            store.apply_delta(delta),
            Err(InvariantViolation::AboveCeiling {
                entity: EntityRef::Stat("gold".into()),
                value: i64::MAX,
                max: i64::MAX
            })
        );
        assert_eq!(store.snapshot(), &before);

        let exact = Delta::note("player", "Top up").with_change(Change::Stat {
            stat: "gold".into(),
            amount: 1,
        });
        store.apply_delta(exact).unwrap();
        assert_eq!(store.snapshot().stats.value("gold"), Some(i64::MAX));
    }

    #[test]
    fn test_unknown_entity_in_delta_rejected() {
        let mut store = store();
        let delta = Delta::note("player", "Pick up a crown").with_change(Change::Item {
            item: ItemId::new("crown"),
            amount: 1,
        });
        assert!(matches!(
            store.apply_delta(delta),
            Err(InvariantViolation::UnknownEntity(EntityRef::Item(_)))
        ));
        assert!(store.snapshot().events.is_empty());
    }

    #[test]
    fn test_validate_choice_reports_unmet_predicate() {
        let store = store();
        let choice = Choice::new("Wrestle the ox").with_intent(Intent::Spend {
            stat: "strength".into(),
            amount: 5,
        });
        let unmet = store.validate_choice(&choice).unwrap_err();
        assert_eq!(unmet.held, 1);
        assert_eq!(unmet.to_string(), "requires strength >= 5, but only 1 available");
    }

    #[test]
    fn test_travel_and_meet() {
        let mut store = store();
        let travel = Choice::new("Head for the forest").with_intent(Intent::Travel {
            location: LocationId::new("forest_edge"),
        });
        store.apply_delta(store.resolve(&travel).unwrap()).unwrap();

        let talk = Choice::new("Greet the hermit").with_intent(Intent::Talk {
            character: CharacterId::new("tomas"),
            topic: Some("the watchtower".into()),
        });
        store.apply_delta(store.resolve(&talk).unwrap()).unwrap();

        let state = store.snapshot();
        assert_eq!(state.current_location.as_str(), "forest_edge");
        assert!(state.locations[&LocationId::new("forest_edge")].visited);
        let tomas = &state.characters[&CharacterId::new("tomas")];
        assert_eq!(
            tomas.last_seen,
            Some(Sighting {
                location: LocationId::new("forest_edge"),
                event: 2
            })
        );
        assert!(tomas.known_facts.contains("discussed the watchtower"));
    }

    #[test]
    fn test_give_moves_item_and_improves_relationship() {
        let mut store = store();
        let give = Choice::new("Share rations with Bram").with_intent(Intent::Give {
            item: ItemId::new("travel_rations"),
            quantity: 2,
            character: CharacterId::new("bram"),
        });
        store.apply_delta(store.resolve(&give).unwrap()).unwrap();

        let state = store.snapshot();
        assert_eq!(state.inventory.quantity(&ItemId::new("travel_rations")), 1);
        assert_eq!(state.characters[&CharacterId::new("bram")].relationship, 2);
    }

    #[test]
    fn test_equip_requires_holding() {
        let mut store = store();
        let delta = Delta::note("player", "Draw sword").with_change(Change::Equip {
            item: ItemId::new("iron_sword"),
        });
        assert_eq!(
            store.apply_delta(delta),
            Err(InvariantViolation::NotEquippable(ItemId::new("iron_sword")))
        );
    }

    #[test]
    fn test_note_delta() {
        let mut store = store();
        let event = store
            .apply_delta(Delta::note(NARRATOR_ACTOR, "The adventure begins"))
            .unwrap();
        assert_eq!(event.actor, NARRATOR_ACTOR);
        assert_eq!(store.snapshot().next_sequence(), 2);
    }

    #[test]
    fn test_check_invariants() {
        let mut state = new_adventure("Ada");
        assert!(check_invariants(&state).is_ok());

        state.stats.attributes.insert("gold".into(), -1);
        assert!(matches!(
            check_invariants(&state),
            Err(InvariantViolation::BelowFloor { .. })
        ));

        let mut state = new_adventure("Ada");
        state.current_location = LocationId::new("atlantis");
        assert!(matches!(
            check_invariants(&state),
            Err(InvariantViolation::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_record_summary_moves_forward_only() {
        let mut store = store();
        store.apply_delta(Delta::note("player", "one")).unwrap();
        store.apply_delta(Delta::note("player", "two")).unwrap();

        let summary = |text: &str, through| StorySummary {
            text: text.into(),
            through,
        };
        store.record_summary(summary("Ada did two things.", 2)).unwrap();
        assert_eq!(store.snapshot().summary.through, 2);

        assert_eq!(
            store.record_summary(summary("Ahead of time.", 3)),
            Err(InvariantViolation::SummaryAhead { through: 3, last: 2 })
        );
        assert!(matches!(
            store.record_summary(summary("Going back.", 1)),
            Err(InvariantViolation::BrokenLedger { .. })
        ));
        assert_eq!(store.snapshot().summary.text, "Ada did two things.");
        assert_eq!(store.snapshot().events.len(), 2);
    }

    #[test]
    fn test_broken_ledger_detected() {
        let mut store = store();
        store.apply_delta(Delta::note("player", "one")).unwrap();
        store.apply_delta(Delta::note("player", "two")).unwrap();

        let mut state = store.snapshot().clone();
        state.events[1].sequence = 5;
        assert_eq!(
            check_invariants(&state),
            Err(InvariantViolation::BrokenLedger {
                expected: 2,
                found: 5
            })
        );
    }
}
