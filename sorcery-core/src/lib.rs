//! Turn engine for a text adventure narrated by a language model.
//!
//! The model writes the story; this crate keeps the score. Every reply is
//! decoded against a strict grammar, every choice is checked against the
//! player's actual resources, and the game state only ever changes through
//! validated deltas that leave one event each in an append-only ledger.
//!
//! # Quick Start
//!
//! ```ignore
//! use sorcery_core::{ClaudeNarrator, GameConfig, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GameConfig::from_env()?.with_player_name("Ada");
//!     let mut game = Orchestrator::new(ClaudeNarrator::from_env()?, config)?;
//!
//!     let opening = game.begin().await?;
//!     println!("{}", opening.turn.scene);
//!
//!     let next = game.play("1").await?;
//!     println!("{}", next.turn.scene);
//!
//!     game.to_save().save_json("save.json").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod interaction;
pub mod narrator;
pub mod orchestrator;
pub mod persist;
pub mod prompt;
pub mod protocol;
pub mod rules;
pub mod seed;
pub mod store;
pub mod testing;
pub mod world;

// Primary public API
pub use config::{ConfigError, GameConfig, RulesConfig};
pub use context::{ContextWindow, HistorySearch};
pub use interaction::{InteractionError, InteractionMachine, Mode};
pub use narrator::{ClaudeNarrator, NarrationRequest, Narrator, NarratorError};
pub use orchestrator::{Orchestrator, ProtocolExhausted, TurnError, TurnOutcome};
pub use persist::{default_save_path, PersistError, Resume, SaveFile};
pub use protocol::{decode, ModeDirective, ParseFailure, ParseFailureReason, Turn};
pub use rules::{Choice, Delta, Intent, Requirement};
pub use store::{GameStore, InvariantViolation, Unmet};
pub use testing::{reply, ScriptedNarrator};
pub use world::{EntityRef, Event, GameState, StorySummary};
