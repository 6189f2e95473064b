//! Line-oriented terminal front end.
//!
//! Lines starting with `/` are commands; everything else is handed to the
//! orchestrator as a choice number or, in dialogue, as speech.

use anyhow::Result;
use colored::Colorize;
use sorcery_core::interaction::Mode;
use sorcery_core::orchestrator::{Orchestrator, TurnError, TurnOutcome};
use sorcery_core::persist::with_json_extension;
use sorcery_core::world::{EntityRef, GameState};
use sorcery_core::Narrator;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

const RESUMED_SCENE: &str = "You pick up where you left off.";

/// A slash command typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Save(Option<PathBuf>),
    Exit,
    Help,
    Stats,
    Inventory,
    Look,
    Map,
    Unknown(String),
}

/// Parse a `/command`. Returns `None` for ordinary input.
pub fn parse_command(line: &str) -> Option<Command> {
    let rest = line.trim().strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();

    Some(match name.as_str() {
        "save" => Command::Save(parts.next().map(with_json_extension)),
        "exit" | "quit" => Command::Exit,
        "help" => Command::Help,
        "stats" => Command::Stats,
        "inventory" | "inv" => Command::Inventory,
        "look" => Command::Look,
        "map" => Command::Map,
        _ => Command::Unknown(name),
    })
}

pub fn help_text() -> String {
    [
        "Commands:",
        "  /save [path]   Save the game (default location if no path)",
        "  /exit, /quit   Save and leave",
        "  /stats         Show your stats",
        "  /inventory     Show what you carry (/inv)",
        "  /look          Describe where you are",
        "  /map           List the places you have been",
        "  /help          Show this help",
        "",
        "Type a choice number to act. In a conversation, type freely to speak.",
        "Ctrl-C while the narrator is thinking abandons that turn.",
    ]
    .join("\n")
}

pub fn stats_view(state: &GameState) -> String {
    let mut out = format!("{}\n", state.player_name);
    for (name, value) in &state.stats.attributes {
        out.push_str(&format!("  {name:<10} {value}\n"));
    }
    for (name, pool) in &state.stats.pools {
        out.push_str(&format!("  {name:<10} {}/{}\n", pool.current, pool.max));
    }
    out
}

pub fn inventory_view(state: &GameState) -> String {
    let mut out = String::new();
    for entry in state.inventory.held() {
        let equipped = if state.inventory.is_equipped(&entry.item.id) {
            " (equipped)"
        } else {
            ""
        };
        out.push_str(&format!(
            "  {} x{}{equipped}\n",
            entry.item.name, entry.quantity
        ));
    }
    if out.is_empty() {
        out.push_str("  You carry nothing.\n");
    }
    out
}

pub fn look_view(state: &GameState) -> String {
    let Some(location) = state.location() else {
        return format!("  You are somewhere called {}.\n", state.current_location);
    };

    let mut out = format!("{}\n  {}\n", location.name, location.description);
    let here: Vec<&str> = state.characters_here().map(|c| c.name.as_str()).collect();
    if !here.is_empty() {
        out.push_str(&format!("  Last seen here: {}\n", here.join(", ")));
    }
    if !location.connections.is_empty() {
        let exits: Vec<String> = location
            .connections
            .iter()
            .map(|id| state.display_name(&EntityRef::Location(id.clone())))
            .collect();
        out.push_str(&format!("  Paths lead to: {}\n", exits.join(", ")));
    }
    out
}

pub fn map_view(state: &GameState) -> String {
    let mut out = String::new();
    for location in state.locations.values().filter(|l| l.visited) {
        let marker = if location.id == state.current_location {
            "*"
        } else {
            " "
        };
        out.push_str(&format!(" {marker} {}\n", location.name));
    }
    out
}

fn print_turn<N: Narrator>(game: &Orchestrator<N>, outcome: &TurnOutcome) {
    if outcome.fallback.is_some() {
        println!("{}", "(The narrator lost the thread for a moment.)".dimmed());
    }
    print_screen(game, &outcome.turn.scene);
}

/// The scene, the dialogue hint and the numbered choices.
fn print_screen<N: Narrator>(game: &Orchestrator<N>, scene: &str) {
    println!("\n{}\n", scene.trim());

    if let Mode::Dialogue { character } = game.mode() {
        let name = game
            .snapshot()
            .display_name(&EntityRef::Character(character.clone()));
        println!(
            "{}",
            format!("You are speaking with {name}. Type to talk, or pick a number.").italic()
        );
    }
    for (i, choice) in game.offered().iter().enumerate() {
        println!("  {} {}", format!("{}.", i + 1).bold().cyan(), choice.label);
    }
    println!();
}

fn prompt() -> std::io::Result<()> {
    print!("{} ", ">".bold());
    std::io::stdout().flush()
}

async fn save<N: Narrator>(game: &Orchestrator<N>, path: &Path) {
    match game.to_save().save_json(path).await {
        Ok(()) => println!("{}", format!("Saved to {}", path.display()).green()),
        Err(e) => println!("{}", format!("Save failed: {e}").red()),
    }
}

/// Run the interactive loop until the player leaves or input ends.
pub async fn run<N: Narrator>(mut game: Orchestrator<N>, save_path: PathBuf) -> Result<()> {
    println!(
        "{} Type /help for commands.\n",
        format!("Welcome, {}.", game.snapshot().player_name).bold()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if !game.needs_turn() {
        print_screen(&game, game.scene().unwrap_or(RESUMED_SCENE));
    }

    loop {
        if game.needs_turn() {
            println!("{}", "The narrator gathers the threads...".dimmed());
            let opening = tokio::select! {
                result = game.begin() => result,
                _ = tokio::signal::ctrl_c() => {
                    println!("{}", "Interrupted.".yellow());
                    break;
                }
            };
            match opening {
                Ok(outcome) => print_turn(&game, &outcome),
                Err(e) => {
                    println!("{}", format!("The narrator is silent: {e}").red());
                    println!("Press Enter to try again, or /exit to leave.");
                }
            }
        }

        prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();

        if let Some(command) = parse_command(input) {
            match command {
                Command::Save(path) => {
                    let path = path.unwrap_or_else(|| save_path.clone());
                    save(&game, &path).await;
                }
                Command::Exit => break,
                Command::Help => println!("{}\n", help_text()),
                Command::Stats => println!("{}", stats_view(game.snapshot())),
                Command::Inventory => println!("{}", inventory_view(game.snapshot())),
                Command::Look => println!("{}", look_view(game.snapshot())),
                Command::Map => println!("{}", map_view(game.snapshot())),
                Command::Unknown(name) => {
                    println!("{}", format!("Unknown command /{name}. Try /help.").yellow())
                }
            }
            continue;
        }

        if game.needs_turn() {
            continue;
        }
        if input.is_empty() {
            continue;
        }

        let result = tokio::select! {
            result = game.play(input) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };
        match result {
            Some(Ok(outcome)) => print_turn(&game, &outcome),
            Some(Err(TurnError::Narrator(e))) => {
                tracing::warn!(error = %e, "turn abandoned");
                println!(
                    "{}",
                    format!("The narrator is silent ({e}). Nothing happened; try again.").red()
                );
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "input rejected");
                println!("{}", e.to_string().yellow());
            }
            None => println!("{}", "Turn abandoned. Nothing happened.".yellow()),
        }
    }

    save(&game, &save_path).await;
    println!("Farewell.");
    Ok(())
}
