//! The starting world for a new game.

use crate::world::{Character, GameState, Inventory, Item, Location, LocationId, PlayerStats};

pub const STARTING_LOCATION: &str = "starting_village";

/// Build a fresh world around the starting village.
pub fn new_adventure(player_name: impl Into<String>) -> GameState {
    let village = LocationId::new(STARTING_LOCATION);

    let start = Location::new(STARTING_LOCATION, "Starting Village")
        .with_description(
            "A peaceful village at the edge of the wilderness, where your adventure begins.",
        )
        .connected_to(&["forest_edge", "old_mill"]);

    let mut stats = PlayerStats::default();
    stats.attributes.insert("gold".to_string(), 10);

    let inventory = Inventory::new()
        .with_item(
            Item::new("healing_potion", "Healing Potion")
                .with_description("A small vial of red liquid that mends wounds.")
                .consumable(),
            2,
        )
        .with_item(
            Item::new("torch", "Torch")
                .with_description("Pitch-soaked wood that burns for an hour.")
                .consumable(),
            1,
        )
        .with_item(
            Item::new("travel_rations", "Travel Rations")
                .with_description("Hard bread, cheese and dried meat.")
                .consumable(),
            3,
        )
        .with_item(
            Item::new("walking_staff", "Walking Staff")
                .with_description("A sturdy ash staff.")
                .equippable(),
            1,
        )
        .with_item(
            Item::new("iron_sword", "Iron Sword")
                .with_description("Plain, heavy and reliable.")
                .equippable(),
            0,
        )
        .with_item(Item::new("rope", "Coil of Rope"), 0)
        .with_item(
            Item::new("silver_key", "Silver Key")
                .with_description("Small and tarnished, with a mill-wheel stamped on the bow."),
            0,
        );

    GameState::new(player_name, start)
        .with_stats(stats)
        .with_inventory(inventory)
        .with_location(
            Location::new("forest_edge", "Forest Edge")
                .with_description("Old oaks crowd a narrow path that disappears into shadow.")
                .connected_to(&[STARTING_LOCATION, "ruined_watchtower"]),
        )
        .with_location(
            Location::new("old_mill", "Old Mill")
                .with_description("A mill whose wheel has not turned in years. The door is locked.")
                .connected_to(&[STARTING_LOCATION]),
        )
        .with_location(
            Location::new("ruined_watchtower", "Ruined Watchtower")
                .with_description("A broken tower on a hill, said to be haunted.")
                .connected_to(&["forest_edge"]),
        )
        .with_character(
            Character::new("mira", "Mira")
                .with_description("Innkeeper of the Crooked Lantern, sharp-eyed and kind.")
                .seen_at(&village, 0),
        )
        .with_character(
            Character::new("bram", "Bram")
                .with_description("The village blacksmith. Gruff, honest, always short on coal.")
                .seen_at(&village, 0),
        )
        .with_character(
            Character::new("tomas", "Old Tomas")
                .with_description("A hermit who knows the forest paths better than anyone."),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ItemId;

    #[test]
    fn test_new_adventure() {
        let state = new_adventure("Ada");
        assert_eq!(state.player_name, "Ada");
        assert_eq!(state.current_location.as_str(), STARTING_LOCATION);
        assert_eq!(state.stats.value("gold"), Some(10));
        assert_eq!(state.inventory.quantity(&ItemId::new("healing_potion")), 2);
        assert!(state.inventory.knows(&ItemId::new("iron_sword")));
        assert!(state.events.is_empty());
        assert_eq!(state.characters_here().count(), 2);
    }

    #[test]
    fn test_connections_point_at_known_locations() {
        let state = new_adventure("Ada");
        for location in state.locations.values() {
            for target in &location.connections {
                assert!(state.locations.contains_key(target), "dangling {target}");
            }
        }
    }
}
