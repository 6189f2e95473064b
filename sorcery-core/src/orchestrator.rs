//! The turn pipeline.
//!
//! One player turn runs: interpret input, validate the choice, resolve it
//! into a delta, apply the delta, ask the narrator for the next turn,
//! decode it, filter its choices against the new state, and present them.
//!
//! Events pushed out of the context window are folded into the story
//! summary once enough of them have gathered, before the narrator is asked
//! for the next turn.
//!
//! Every step works on staged copies of the store, the context window and
//! the interaction machine. They replace the live values together once the
//! turn is complete, so a turn that fails or whose future is dropped
//! part-way leaves the game exactly as it was.

use crate::config::GameConfig;
use crate::context::{fold_summary, ContextWindow};
use crate::interaction::{InteractionError, InteractionMachine, Mode};
use crate::narrator::{NarrationMessage, NarrationRequest, Narrator, NarratorError};
use crate::persist::{Resume, SaveFile};
use crate::prompt::{self, PromptContext, FALLBACK_SCENE};
use crate::protocol::{decode, ModeDirective, ParseFailure, ParseFailureReason, Turn};
use crate::rules::{Choice, Delta, Intent, NARRATOR_ACTOR};
use crate::seed::new_adventure;
use crate::store::{GameStore, InvariantViolation};
use crate::world::{EntityRef, Event, GameState, StorySummary};
use thiserror::Error;

/// Label of the choice offered when nothing else survives a fallback.
pub const LOOK_AROUND: &str = "Look around";

const SUMMARY_TEMPERATURE: f32 = 0.3;

/// The narrator never produced a usable reply within the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("narrator reply rejected {attempts} times, last: {last}")]
pub struct ProtocolExhausted {
    pub attempts: u32,
    pub last: ParseFailure,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Interaction(#[from] InteractionError),

    #[error("choice rejected: {0}")]
    Rejected(#[from] InvariantViolation),

    #[error(transparent)]
    Narrator(#[from] NarratorError),
}

/// What a completed turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The turn now on screen. Only offerable choices remain.
    pub turn: Turn,
    /// Narrator calls made for this turn.
    pub attempts: u32,
    /// Set when the fallback turn was used.
    pub fallback: Option<ProtocolExhausted>,
    /// The event the player's choice (or the game start) added.
    pub event: Option<Event>,
    /// Choices the narrator offered that the player cannot take, with why.
    pub discarded: Vec<(Choice, String)>,
}

/// Result of the narrate-decode-retry loop, before commit.
struct Narrated {
    turn: Turn,
    attempts: u32,
    fallback: Option<ProtocolExhausted>,
    discarded: Vec<(Choice, String)>,
}

/// Drives a game: owns the store, the context window and the mode machine.
pub struct Orchestrator<N> {
    narrator: N,
    store: GameStore,
    window: ContextWindow,
    machine: InteractionMachine,
    config: GameConfig,
    last_scene: Option<String>,
    last_choices: Vec<Choice>,
}

impl<N: Narrator> Orchestrator<N> {
    /// Start a fresh adventure for `config.player_name`.
    pub fn new(narrator: N, config: GameConfig) -> Result<Self, InvariantViolation> {
        let state = new_adventure(config.player_name.clone());
        Self::restore(narrator, config, state, Resume::default())
    }

    /// Continue a saved game where it stood.
    ///
    /// Saved choices the player can no longer take are dropped. When none
    /// remain, [`begin`](Self::begin) has to narrate a recap first.
    pub fn restore(
        narrator: N,
        config: GameConfig,
        state: GameState,
        resume: Resume,
    ) -> Result<Self, InvariantViolation> {
        let window = ContextWindow::from_ledger(config.context_window, &state.events);
        let store = GameStore::new(state, config.rules.clone())?;
        let offered: Vec<Choice> = resume
            .offered
            .into_iter()
            .filter(|c| store.is_offerable(c))
            .collect();
        let mut machine = InteractionMachine::restore(resume.mode, offered);
        machine.resume();

        tracing::info!(
            events = store.snapshot().events.len(),
            window = window.len(),
            mode = %machine.mode(),
            "game ready"
        );

        let last_choices = machine.offered().to_vec();
        Ok(Self {
            narrator,
            store,
            window,
            machine,
            config,
            last_scene: resume.scene,
            last_choices,
        })
    }

    pub fn snapshot(&self) -> &GameState {
        self.store.snapshot()
    }

    pub fn mode(&self) -> &Mode {
        self.machine.mode()
    }

    /// Choices the player can pick right now.
    pub fn offered(&self) -> &[Choice] {
        self.machine.offered()
    }

    pub fn window(&self) -> &ContextWindow {
        &self.window
    }

    pub fn narrator(&self) -> &N {
        &self.narrator
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Text of the scene currently on screen.
    pub fn scene(&self) -> Option<&str> {
        self.last_scene.as_deref()
    }

    /// Whether [`begin`](Self::begin) must run before input is accepted.
    pub fn needs_turn(&self) -> bool {
        self.machine.needs_turn()
    }

    pub fn to_save(&self) -> SaveFile {
        SaveFile::new(self.store.snapshot().clone(), self.machine.mode().clone())
            .with_turn(self.last_scene.clone(), self.machine.offered().to_vec())
    }

    /// Narrate the opening scene, or a recap when resuming a saved game.
    pub async fn begin(&mut self) -> Result<TurnOutcome, TurnError> {
        if !self.machine.needs_turn() {
            return Err(InteractionError::InvalidTransition {
                action: "begin",
                mode: self.machine.mode().clone(),
            }
            .into());
        }

        let mut store = self.store.clone();
        let mut window = self.window.clone();
        let resumed = !store.snapshot().events.is_empty();

        let event = if resumed {
            None
        } else {
            let state = store.snapshot();
            let here = EntityRef::Location(state.current_location.clone());
            let delta = Delta::note(
                NARRATOR_ACTOR,
                format!("The adventure begins at {}", state.display_name(&here)),
            )
            .with_ref(here);
            let event = store.apply_delta(delta)?.clone();
            window.push(event.clone());
            Some(event)
        };

        let message = prompt::opening_message(store.snapshot(), resumed);
        let query = store.snapshot().display_name(&EntityRef::Location(
            store.snapshot().current_location.clone(),
        ));
        let narrated = self.narrate(&store, &window, message, &query).await?;

        let mut machine = self.machine.clone();
        machine.fallback();
        machine.present(&narrated.turn)?;

        tracing::info!(resumed, attempts = narrated.attempts, "opening scene ready");
        Ok(self.commit(store, window, machine, narrated, event))
    }

    /// Play one turn from raw player input.
    pub async fn play(&mut self, input: &str) -> Result<TurnOutcome, TurnError> {
        let choice = self.machine.interpret(input)?;
        let checked = self
            .store
            .validate_choice(&choice)
            .map_err(InvariantViolation::from)
            .and_then(|()| self.store.resolve(&choice));
        let delta = match checked {
            Ok(delta) => delta,
            Err(violation) => {
                tracing::warn!(label = %choice.label, error = %violation, "choice rejected");
                return Err(violation.into());
            }
        };

        let query = recall_query(self.store.snapshot(), &self.window, &choice);
        let mut store = self.store.clone();
        let mut window = self.window.clone();
        let event = store.apply_delta(delta)?.clone();
        if let Some(evicted) = window.push(event.clone()) {
            tracing::debug!(sequence = evicted.sequence, "event left the context window");
            self.summarize(&mut store, &window).await?;
        }

        let message = prompt::action_message(store.snapshot(), &choice, &event);
        let narrated = self.narrate(&store, &window, message, &query).await?;

        let mut machine = self.machine.clone();
        machine.complete()?;
        machine.present(&narrated.turn)?;

        tracing::info!(
            sequence = event.sequence,
            attempts = narrated.attempts,
            fallback = narrated.fallback.is_some(),
            "turn complete"
        );
        Ok(self.commit(store, window, machine, narrated, Some(event)))
    }

    fn commit(
        &mut self,
        store: GameStore,
        window: ContextWindow,
        machine: InteractionMachine,
        narrated: Narrated,
        event: Option<Event>,
    ) -> TurnOutcome {
        self.store = store;
        self.window = window;
        self.machine = machine;
        self.last_scene = Some(narrated.turn.scene.clone());
        if narrated.fallback.is_none() {
            self.last_choices = narrated.turn.choices.clone();
        }

        TurnOutcome {
            turn: narrated.turn,
            attempts: narrated.attempts,
            fallback: narrated.fallback,
            event,
            discarded: narrated.discarded,
        }
    }

    /// Fold evicted events into the story summary once a batch has gathered.
    /// A failed or empty summary keeps the event lines as they are.
    async fn summarize(
        &self,
        store: &mut GameStore,
        window: &ContextWindow,
    ) -> Result<(), InvariantViolation> {
        let state = store.snapshot();
        let pending = window.unsummarized(&state.events, &state.summary);
        if pending.len() < self.config.summary_batch {
            return Ok(());
        }
        let Some(through) = pending.last().map(|e| e.sequence) else {
            return Ok(());
        };

        let request = NarrationRequest {
            system: prompt::SUMMARY_PROMPT.to_string(),
            messages: vec![NarrationMessage::player(prompt::summary_message(
                state,
                &state.summary,
                &pending,
            ))],
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: SUMMARY_TEMPERATURE,
        };

        let summary = match self.narrator.summarize(request).await {
            Ok(text) if !text.trim().is_empty() => StorySummary {
                text: text.trim().to_string(),
                through,
            },
            Ok(_) => {
                tracing::warn!(through, "empty story summary, keeping event lines");
                fold_summary(&state.summary, &pending)
            }
            Err(e) => {
                tracing::warn!(error = %e, through, "story summary failed, keeping event lines");
                fold_summary(&state.summary, &pending)
            }
        };
        store.record_summary(summary)
    }

    /// Ask for the next turn until one decodes and has something to offer.
    async fn narrate(
        &self,
        store: &GameStore,
        window: &ContextWindow,
        message: String,
        query: &str,
    ) -> Result<Narrated, NarratorError> {
        let state = store.snapshot();
        let recalled: Vec<&Event> = window
            .search_evicted(&state.events, query, self.config.search_limit)
            .iter()
            .collect();
        if !recalled.is_empty() {
            tracing::debug!(count = recalled.len(), query, "recalled older events");
        }

        let system = prompt::system_prompt(&PromptContext {
            state,
            rules: store.rules().config(),
            summary: Some(state.summary.text.as_str()),
            recent: window.recent_context().collect(),
            recalled,
            evicted: window.evicted(),
            previous_scene: self.last_scene.as_deref(),
        });

        let allowed = self.config.max_retries.saturating_add(1);
        let mut messages = vec![NarrationMessage::player(message)];
        let mut last = ParseFailure::new(ParseFailureReason::MissingScene);

        for attempt in 1..=allowed {
            let request = NarrationRequest {
                system: system.clone(),
                messages: messages.clone(),
                model: self.config.model.clone(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };
            let raw = self.narrator.narrate(request).await?;

            match accept(&raw, store) {
                Ok((turn, discarded)) => {
                    for (choice, reason) in &discarded {
                        tracing::warn!(label = %choice.label, %reason, "dropped choice");
                    }
                    return Ok(Narrated {
                        turn,
                        attempts: attempt,
                        fallback: None,
                        discarded,
                    });
                }
                Err(failure) => {
                    tracing::warn!(
                        attempt,
                        code = failure.code(),
                        line = ?failure.line,
                        "narrator reply rejected"
                    );
                    messages.push(NarrationMessage::narrator(raw));
                    messages.push(NarrationMessage::player(prompt::corrective_message(
                        &failure,
                    )));
                    last = failure;
                }
            }
        }

        let exhausted = ProtocolExhausted {
            attempts: allowed,
            last,
        };
        tracing::warn!(error = %exhausted, "using fallback turn");
        Ok(Narrated {
            turn: self.fallback_turn(store),
            attempts: allowed,
            fallback: Some(exhausted),
            discarded: Vec::new(),
        })
    }

    /// Neutral scene with the last good choices that still apply.
    fn fallback_turn(&self, store: &GameStore) -> Turn {
        let mut choices: Vec<Choice> = self
            .last_choices
            .iter()
            .filter(|c| store.is_offerable(c))
            .cloned()
            .collect();
        if choices.is_empty() {
            choices.push(Choice::new(LOOK_AROUND));
        }
        Turn {
            scene: FALLBACK_SCENE.to_string(),
            choices,
            directive: ModeDirective::Normal,
        }
    }
}

/// Decode a reply and keep only the choices the player can take.
fn accept(raw: &str, store: &GameStore) -> Result<(Turn, Vec<(Choice, String)>), ParseFailure> {
    let mut turn = decode(raw, store.snapshot())?;

    let mut discarded = Vec::new();
    let mut offered = Vec::with_capacity(turn.choices.len());
    for choice in turn.choices.drain(..) {
        let verdict = match store.validate_choice(&choice) {
            Ok(()) => store.resolve(&choice).map(|_| ()),
            Err(unmet) => Err(unmet.into()),
        };
        match verdict {
            Ok(()) => offered.push(choice),
            Err(reason) => discarded.push((choice, reason.to_string())),
        }
    }

    if offered.is_empty() {
        return Err(ParseFailure::new(ParseFailureReason::NoOfferableChoices));
    }
    turn.choices = offered;
    Ok((turn, discarded))
}

/// Search terms for older events related to a choice: its label, plus the
/// entities it names that no event in the window mentions.
fn recall_query(state: &GameState, window: &ContextWindow, choice: &Choice) -> String {
    let mut query = choice.label.clone();
    if let Intent::Speak { text, .. } = &choice.intent {
        query.push(' ');
        query.push_str(text);
    }
    for entity in choice.refs() {
        if window.recent_context().any(|e| e.mentions(&entity)) {
            continue;
        }
        query.push(' ');
        query.push_str(&state.display_name(&entity));
        query.push(' ');
        query.push_str(entity.key());
    }
    query
}
