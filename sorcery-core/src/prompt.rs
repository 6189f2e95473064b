//! Narrator prompt assembly.
//!
//! The system prompt is the fixed narrator instructions followed by a view
//! of the game state derived fresh from the store on every call, so the
//! narrator never works from a stale copy of the numbers.

use crate::config::RulesConfig;
use crate::protocol::ParseFailure;
use crate::rules::{Choice, Intent};
use crate::world::{EntityRef, Event, GameState, StorySummary};

const NARRATOR_PROMPT: &str = include_str!("prompts/narrator.txt");

/// Instructions for condensing evicted events.
pub const SUMMARY_PROMPT: &str = include_str!("prompts/summary.txt");

/// Scene used when the narrator cannot produce a usable turn.
pub const FALLBACK_SCENE: &str = "The moment stretches, quiet and uncertain, as if the world is \
catching its breath. Nothing has changed. You gather your thoughts and consider what to do.";

/// Everything the system prompt is built from.
pub struct PromptContext<'a> {
    pub state: &'a GameState,
    pub rules: &'a RulesConfig,
    /// Account of events older than the window, if any were condensed.
    pub summary: Option<&'a str>,
    /// Events still in the context window, oldest first.
    pub recent: Vec<&'a Event>,
    /// Older events recalled by search.
    pub recalled: Vec<&'a Event>,
    /// Events that have left the window.
    pub evicted: usize,
    /// Text of the scene the player is responding to.
    pub previous_scene: Option<&'a str>,
}

pub fn system_prompt(ctx: &PromptContext<'_>) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        &NARRATOR_PROMPT
            .replace("{max_item_grant}", &ctx.rules.max_item_grant.to_string())
            .replace("{max_stat_gain}", &ctx.rules.max_stat_gain.to_string()),
    );

    prompt.push_str("\n\n## Game State\n");
    prompt.push_str(&state_view(ctx.state));

    if let Some(scene) = ctx.previous_scene {
        prompt.push_str("\n## Current Scene\n");
        prompt.push_str(scene.trim());
        prompt.push('\n');
    }

    if let Some(summary) = ctx.summary.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n## Story So Far\n");
        prompt.push_str(summary.trim());
        prompt.push('\n');
    }

    prompt.push_str("\n## Recent Events\n");
    if ctx.evicted > 0 {
        prompt.push_str(&format!(
            "({} earlier events are not shown.)\n",
            ctx.evicted
        ));
    }
    if ctx.recent.is_empty() {
        prompt.push_str("Nothing has happened yet.\n");
    }
    for event in &ctx.recent {
        prompt.push_str(&event_line(event));
    }

    if !ctx.recalled.is_empty() {
        prompt.push_str("\n## Recalled History\n");
        for event in &ctx.recalled {
            prompt.push_str(&event_line(event));
        }
    }

    prompt
}

fn event_line(event: &Event) -> String {
    format!("- #{} [{}] {}\n", event.sequence, event.actor, event.summary)
}

/// Markdown view of the state, listing every id the narrator may use.
pub fn state_view(state: &GameState) -> String {
    let mut view = String::new();

    view.push_str(&format!("**Player:** {}\n", state.player_name));
    if let Some(location) = state.location() {
        view.push_str(&format!(
            "**Location:** {} (`{}`): {}\n",
            location.name, location.id, location.description
        ));
        if !location.connections.is_empty() {
            let exits: Vec<String> = location
                .connections
                .iter()
                .map(|id| {
                    format!(
                        "{} (`{id}`)",
                        state.display_name(&EntityRef::Location(id.clone()))
                    )
                })
                .collect();
            view.push_str(&format!("**Paths lead to:** {}\n", exits.join(", ")));
        }
    }

    view.push_str("\n### Stats\n");
    for (name, value) in &state.stats.attributes {
        view.push_str(&format!("- `{name}`: {value}\n"));
    }
    for (name, pool) in &state.stats.pools {
        view.push_str(&format!("- `{name}`: {}/{}\n", pool.current, pool.max));
    }

    view.push_str("\n### Inventory\n");
    let mut held = state.inventory.held().peekable();
    if held.peek().is_none() {
        view.push_str("- (empty)\n");
    }
    for entry in held {
        let mut tags = Vec::new();
        if entry.item.consumable {
            tags.push("consumable");
        }
        if state.inventory.is_equipped(&entry.item.id) {
            tags.push("equipped");
        } else if entry.item.equippable {
            tags.push("equippable");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        view.push_str(&format!(
            "- `{}` {} x{}{tags}\n",
            entry.item.id, entry.item.name, entry.quantity
        ));
    }

    let unheld: Vec<String> = state
        .inventory
        .entries()
        .filter(|e| e.quantity == 0)
        .map(|e| format!("`{}` {}", e.item.id, e.item.name))
        .collect();
    if !unheld.is_empty() {
        view.push_str(&format!(
            "Other items that exist in this world: {}\n",
            unheld.join(", ")
        ));
    }

    view.push_str("\n### Characters\n");
    for character in state.characters.values() {
        view.push_str(&format!("- `{}` {}", character.id, character.name));
        if !character.description.is_empty() {
            view.push_str(&format!(": {}", character.description));
        }
        view.push_str(&format!(" (relationship {}", character.relationship));
        if let Some(seen) = &character.last_seen {
            view.push_str(&format!(
                ", last seen at `{}`",
                seen.location
            ));
        }
        view.push_str(")\n");
        if !character.known_facts.is_empty() {
            let facts: Vec<&str> = character.known_facts.iter().map(String::as_str).collect();
            view.push_str(&format!("  Knows: {}\n", facts.join("; ")));
        }
    }

    view.push_str("\n### Locations\n");
    for location in state.locations.values() {
        let marker = if location.id == state.current_location {
            "here"
        } else if location.visited {
            "visited"
        } else {
            "unvisited"
        };
        view.push_str(&format!("- `{}` {} ({marker})\n", location.id, location.name));
    }

    view
}

/// First message of a new game or of a resumed one.
pub fn opening_message(state: &GameState, resumed: bool) -> String {
    if resumed {
        format!(
            "The player {} returns to the story. Briefly remind them where they are and what \
             was happening, then offer choices.",
            state.player_name
        )
    } else {
        format!(
            "Begin a new adventure for {}. Set the opening scene at their current location \
             and offer the first choices.",
            state.player_name
        )
    }
}

/// Tell the narrator what the player just did and what it cost.
pub fn action_message(state: &GameState, choice: &Choice, outcome: &Event) -> String {
    match &choice.intent {
        Intent::Speak { character, text } => format!(
            "The player says to {}: \"{text}\"\nRespond in character and continue.",
            state.display_name(&EntityRef::Character(character.clone()))
        ),
        _ => format!(
            "The player chose: {}\nRecorded outcome: {}\nContinue the story from here.",
            choice.label, outcome.summary
        ),
    }
}

/// Ask for `events` to be folded into the existing summary.
pub fn summary_message(state: &GameState, previous: &StorySummary, events: &[&Event]) -> String {
    let mut message = format!("Player: {}\n\n## Story So Far\n", state.player_name);
    if previous.is_empty() {
        message.push_str("(nothing yet)\n");
    } else {
        message.push_str(previous.text.trim());
        message.push('\n');
    }
    message.push_str("\n## Events Since\n");
    for event in events {
        message.push_str(&event_line(event));
    }
    message
}

/// Follow-up sent after a reply that could not be decoded.
pub fn corrective_message(failure: &ParseFailure) -> String {
    let location = failure
        .line
        .map(|line| format!(" (line {line})"))
        .unwrap_or_default();
    format!(
        "Your previous reply could not be used: {failure}{location} [{}]. Reply again with \
         exactly the [SCENE], [CHOICES] and [MODE] sections, using only ids from the game \
         state and at least one choice the player can afford.",
        failure.code()
    )
}
