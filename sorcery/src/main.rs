//! Terminal text adventure narrated by Claude.
//!
//! ```bash
//! sorcery                         # continue ~/.sorcery/save.json, or start fresh
//! sorcery --new-game --player-name Ada
//! sorcery --save-file slot2.json --debug
//! ```
//!
//! Exit codes: 0 on a normal exit, 2 when the save file cannot be loaded,
//! 1 for any other startup failure.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use sorcery_core::persist::{default_save_path, with_json_extension, PersistError, SaveFile};
use sorcery_core::{ClaudeNarrator, GameConfig, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sorcery",
    about = "A text adventure where Claude narrates and the rules keep score",
    version
)]
struct Args {
    /// Model to narrate with (overrides SORCERY_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Anthropic API key (defaults to ANTHROPIC_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Save file to load from and write to
    #[arg(long)]
    save_file: Option<PathBuf>,

    /// Start a new game even if the save file exists
    #[arg(long)]
    new_game: bool,

    /// Verbose logging to stderr
    #[arg(long)]
    debug: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Name for a new character
    #[arg(long)]
    player_name: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.debug);
    if args.no_color {
        colored::control::set_override(false);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_status(&e))
        }
    }
}

/// 2 when the save file is the problem, 1 otherwise.
fn exit_status(error: &anyhow::Error) -> u8 {
    if error.downcast_ref::<PersistError>().is_some() {
        2
    } else {
        1
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let mut config = GameConfig::from_env()?;
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(name) = args.player_name {
        config = config.with_player_name(name);
    }

    let narrator = match args.api_key {
        Some(key) => ClaudeNarrator::with_api_key(key),
        None => ClaudeNarrator::from_env(),
    }
    .context("set ANTHROPIC_API_KEY in the environment or .env file, or pass --api-key")?;

    let save_path = args
        .save_file
        .map(with_json_extension)
        .unwrap_or_else(default_save_path);

    let game = if !args.new_game && tokio::fs::try_exists(&save_path).await.unwrap_or(false) {
        let (state, resume) = SaveFile::load_json(&save_path)
            .await
            .and_then(SaveFile::into_parts)
            .with_context(|| format!("cannot load {}", save_path.display()))?;
        tracing::info!(path = %save_path.display(), "resuming saved game");
        Orchestrator::restore(narrator, config, state, resume)?
    } else {
        Orchestrator::new(narrator, config)?
    };

    cli::run(game, save_path).await
}
