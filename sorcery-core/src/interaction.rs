//! Interaction modes and the transitions between them.
//!
//! ```text
//! Narration --turn(normal)------> ChoiceSelection --valid selection--> Narration
//! Narration --turn(dialogue c)--> Dialogue{c} ------free text--------> Narration
//! any       --fallback----------> Narration
//! ```
//!
//! The machine decides what player input *means* in the current mode. It
//! never touches game state: a selection or a line of speech comes out as a
//! [`Choice`] that still has to pass the store's validation.

use crate::protocol::{ModeDirective, Turn};
use crate::rules::Choice;
use crate::world::CharacterId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The current interaction mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Waiting on the narrator.
    #[default]
    Narration,
    /// A numbered list of choices is on offer.
    ChoiceSelection,
    /// Talking with one character. Free text is speech only.
    Dialogue { character: CharacterId },
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Narration => f.write_str("narration"),
            Mode::ChoiceSelection => f.write_str("choice selection"),
            Mode::Dialogue { character } => write!(f, "dialogue with {character}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteractionError {
    #[error("cannot {action} during {mode}")]
    InvalidTransition { action: &'static str, mode: Mode },

    #[error("there is no choice {given}; pick 1 to {available}")]
    OutOfRange { given: usize, available: usize },

    #[error("'{0}' is not a choice number")]
    NotANumber(String),

    #[error("nothing was entered")]
    EmptyInput,
}

/// Tracks the mode and the choices currently on offer.
#[derive(Debug, Clone)]
pub struct InteractionMachine {
    mode: Mode,
    offered: Vec<Choice>,
}

impl Default for InteractionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionMachine {
    pub fn new() -> Self {
        Self {
            mode: Mode::Narration,
            offered: Vec::new(),
        }
    }

    /// Resume in a previously saved mode with the choices that were on
    /// offer. Narration never has anything on offer.
    pub fn restore(mode: Mode, offered: Vec<Choice>) -> Self {
        let offered = if mode == Mode::Narration {
            Vec::new()
        } else {
            offered
        };
        Self { mode, offered }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn offered(&self) -> &[Choice] {
        &self.offered
    }

    /// Whether the narrator must produce a turn before input is accepted.
    pub fn needs_turn(&self) -> bool {
        self.mode == Mode::Narration || self.offered.is_empty()
    }

    /// Drop back to narration when a restored mode has nothing on offer.
    pub fn resume(&mut self) {
        if self.mode != Mode::Narration && self.offered.is_empty() {
            self.mode = Mode::Narration;
        }
    }

    /// Show a decoded turn: `Narration -> ChoiceSelection | Dialogue`.
    pub fn present(&mut self, turn: &Turn) -> Result<&Mode, InteractionError> {
        if self.mode != Mode::Narration {
            return Err(InteractionError::InvalidTransition {
                action: "present a new turn",
                mode: self.mode.clone(),
            });
        }
        self.offered = turn.choices.clone();
        self.mode = match &turn.directive {
            ModeDirective::Normal => Mode::ChoiceSelection,
            ModeDirective::Dialogue(character) => Mode::Dialogue {
                character: character.clone(),
            },
        };
        Ok(&self.mode)
    }

    /// Turn raw player input into the choice it stands for.
    ///
    /// In dialogue, a number naming an offered choice selects it; any other
    /// text becomes speech addressed to the dialogue partner.
    pub fn interpret(&self, input: &str) -> Result<Choice, InteractionError> {
        let input = input.trim();
        match &self.mode {
            Mode::Narration => Err(InteractionError::InvalidTransition {
                action: "accept input",
                mode: self.mode.clone(),
            }),
            Mode::ChoiceSelection => {
                if input.is_empty() {
                    return Err(InteractionError::EmptyInput);
                }
                let given: usize = input
                    .parse()
                    .map_err(|_| InteractionError::NotANumber(input.to_string()))?;
                self.select(given)
            }
            Mode::Dialogue { character } => {
                if input.is_empty() {
                    return Err(InteractionError::EmptyInput);
                }
                match input.parse::<usize>() {
                    Ok(given) => self.select(given),
                    Err(_) => Ok(Choice::speech(character.clone(), input)),
                }
            }
        }
    }

    fn select(&self, given: usize) -> Result<Choice, InteractionError> {
        given
            .checked_sub(1)
            .and_then(|index| self.offered.get(index))
            .cloned()
            .ok_or(InteractionError::OutOfRange {
                given,
                available: self.offered.len(),
            })
    }

    /// The accepted input was applied: back to `Narration`.
    pub fn complete(&mut self) -> Result<(), InteractionError> {
        if self.mode == Mode::Narration {
            return Err(InteractionError::InvalidTransition {
                action: "complete a selection",
                mode: Mode::Narration,
            });
        }
        self.mode = Mode::Narration;
        self.offered.clear();
        Ok(())
    }

    /// Abandon whatever was on offer. Valid from any mode.
    pub fn fallback(&mut self) {
        self.mode = Mode::Narration;
        self.offered.clear();
    }
}
