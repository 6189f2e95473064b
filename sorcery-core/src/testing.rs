//! Testing utilities.
//!
//! - [`ScriptedNarrator`] replays canned replies so turns are deterministic
//!   without API calls, and records every request it was sent. Summaries
//!   have a script of their own.
//! - [`PendingNarrator`] never answers, for cancellation tests.
//! - [`reply`] builds a well-formed narrator reply.
//! - Assertion helpers for checking game state.

use crate::narrator::{NarrationRequest, Narrator, NarratorError};
use crate::world::{GameState, ItemId};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// A narrator that returns scripted replies in order.
///
/// Once the script runs out every call fails with
/// [`NarratorError::Unavailable`], or never returns after
/// [`then_hang`](Self::then_hang). Summary requests never consume turn
/// replies; without a scripted summary they fail.
#[derive(Default)]
pub struct ScriptedNarrator {
    replies: Mutex<VecDeque<Result<String, NarratorError>>>,
    requests: Mutex<Vec<NarrationRequest>>,
    summaries: Mutex<VecDeque<String>>,
    summary_requests: Mutex<Vec<NarrationRequest>>,
    hang_when_empty: bool,
}

impl ScriptedNarrator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// Script the replies to summary requests, in order.
    pub fn with_summaries<I, S>(self, summaries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            summaries: Mutex::new(summaries.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    /// Block forever instead of failing once the script is used up.
    pub fn then_hang(mut self) -> Self {
        self.hang_when_empty = true;
        self
    }

    /// Queue another reply.
    pub async fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().await.push_back(Ok(reply.into()));
    }

    /// Queue a transport failure.
    pub async fn push_error(&self, error: NarratorError) {
        self.replies.lock().await.push_back(Err(error));
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<NarrationRequest> {
        self.requests.lock().await.clone()
    }

    /// Every summary request received so far.
    pub async fn summary_requests(&self) -> Vec<NarrationRequest> {
        self.summary_requests.lock().await.clone()
    }

    pub async fn calls(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Replies not yet consumed.
    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait]
impl Narrator for ScriptedNarrator {
    async fn narrate(&self, request: NarrationRequest) -> Result<String, NarratorError> {
        self.requests.lock().await.push(request);
        let next = self.replies.lock().await.pop_front();
        match next {
            Some(reply) => reply,
            None if self.hang_when_empty => std::future::pending().await,
            None => Err(NarratorError::Unavailable("script exhausted".to_string())),
        }
    }

    async fn summarize(&self, request: NarrationRequest) -> Result<String, NarratorError> {
        self.summary_requests.lock().await.push(request);
        self.summaries
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| NarratorError::Unavailable("no summary scripted".to_string()))
    }
}

/// A narrator whose replies never arrive.
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingNarrator;

#[async_trait]
impl Narrator for PendingNarrator {
    async fn narrate(&self, _request: NarrationRequest) -> Result<String, NarratorError> {
        std::future::pending().await
    }
}

/// Build a reply in wire format. Choices are written as given, numbered
/// from 1, so they may carry `{requires: ...}` and `{intent: ...}` tags.
pub fn reply(scene: &str, choices: &[&str], mode: &str) -> String {
    let mut out = format!("[SCENE]\n{scene}\n[CHOICES]\n");
    for (i, choice) in choices.iter().enumerate() {
        out.push_str(&format!("{}. {choice}\n", i + 1));
    }
    out.push_str(&format!("[MODE]\n{mode}\n"));
    out
}

#[track_caller]
pub fn assert_stat(state: &GameState, stat: &str, expected: i64) {
    let actual = state.stats.value(stat);
    assert_eq!(actual, Some(expected), "Expected {stat} = {expected}, got {actual:?}");
}

#[track_caller]
pub fn assert_quantity(state: &GameState, item: &str, expected: u32) {
    let actual = state.inventory.quantity(&ItemId::new(item));
    assert_eq!(actual, expected, "Expected {expected} x {item}, got {actual}");
}

#[track_caller]
pub fn assert_at(state: &GameState, location: &str) {
    assert_eq!(
        state.current_location.as_str(),
        location,
        "Expected player at {location}"
    );
}

#[track_caller]
pub fn assert_event_count(state: &GameState, expected: usize) {
    assert_eq!(
        state.events.len(),
        expected,
        "Expected {expected} events in the ledger"
    );
}
