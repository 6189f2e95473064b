//! Save files.
//!
//! A save is one JSON document holding the whole game state plus what was
//! on screen: the interaction mode, the scene and the choices on offer.
//! Loading checks the same invariants the store enforces, so a hand-edited
//! or truncated save is refused rather than half-loaded.

use crate::interaction::Mode;
use crate::rules::Choice;
use crate::store::{check_invariants, InvariantViolation};
use crate::world::{
    Character, CharacterId, Event, GameId, GameState, Inventory, Location, LocationId, PlayerStats,
    StorySummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

const SAVE_DIR: &str = ".sorcery";
const SAVE_FILE: &str = "save.json";

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Corrupt save: {0}")]
    Corrupt(#[from] InvariantViolation),
}

/// Where play stood when the game was saved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resume {
    pub mode: Mode,
    /// Scene the player was looking at.
    pub scene: Option<String>,
    /// Choices on offer. Empty means the narrator has to be asked again.
    pub offered: Vec<Choice>,
}

/// A saved game with everything needed to resume play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFile {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub game_id: GameId,
    pub player_name: String,
    pub current_location: LocationId,
    pub stats: PlayerStats,
    pub inventory: Inventory,
    pub characters: BTreeMap<CharacterId, Character>,
    pub locations: BTreeMap<LocationId, Location>,
    pub events: Vec<Event>,
    #[serde(default)]
    pub summary: StorySummary,
    pub mode: Mode,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default)]
    pub offered: Vec<Choice>,
}

impl SaveFile {
    pub fn new(state: GameState, mode: Mode) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: Utc::now(),
            game_id: state.game_id,
            player_name: state.player_name,
            current_location: state.current_location,
            stats: state.stats,
            inventory: state.inventory,
            characters: state.characters,
            locations: state.locations,
            events: state.events,
            summary: state.summary,
            mode,
            scene: None,
            offered: Vec::new(),
        }
    }

    /// Record the turn on screen so loading can continue it.
    pub fn with_turn(mut self, scene: Option<String>, offered: Vec<Choice>) -> Self {
        self.scene = scene;
        self.offered = offered;
        self
    }

    /// Split back into a checked state and where play stood.
    pub fn into_parts(self) -> Result<(GameState, Resume), PersistError> {
        if self.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: self.version,
            });
        }

        let state = GameState {
            game_id: self.game_id,
            player_name: self.player_name,
            current_location: self.current_location,
            stats: self.stats,
            inventory: self.inventory,
            characters: self.characters,
            locations: self.locations,
            events: self.events,
            summary: self.summary,
        };
        check_invariants(&state)?;
        let resume = Resume {
            mode: self.mode,
            scene: self.scene,
            offered: self.offered,
        };
        Ok((state, resume))
    }

    /// Save to a JSON file, creating its directory if needed.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        tracing::info!(path = %path.display(), events = self.events.len(), "game saved");
        Ok(())
    }

    /// Load from a JSON file. The version is checked here; invariants are
    /// checked by [`into_parts`](Self::into_parts).
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }
}

/// `~/.sorcery/save.json`, or `./.sorcery/save.json` without a home directory.
pub fn default_save_path() -> PathBuf {
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(SAVE_DIR).join(SAVE_FILE)
}

/// Add a `.json` extension when the path has none.
pub fn with_json_extension(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    if path.extension().is_some() {
        path
    } else {
        path.with_extension("json")
    }
}
