//! The language-model narrator.
//!
//! The engine only ever asks the narrator for text; everything it says is
//! decoded and checked before it can affect the game.

use async_trait::async_trait;
use claude::{Claude, Message, Request};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NarratorError {
    #[error("Claude API error: {0}")]
    Claude(#[from] claude::Error),

    #[error("narrator unavailable: {0}")]
    Unavailable(String),
}

/// Who said a line of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Player,
    Narrator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationMessage {
    pub speaker: Speaker,
    pub text: String,
}

impl NarrationMessage {
    pub fn player(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Player,
            text: text.into(),
        }
    }

    pub fn narrator(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Narrator,
            text: text.into(),
        }
    }
}

/// Everything needed for one narrator call.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationRequest {
    pub system: String,
    pub messages: Vec<NarrationMessage>,
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// A source of narrator replies.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Produce the raw text of the next turn.
    async fn narrate(&self, request: NarrationRequest) -> Result<String, NarratorError>;

    /// Condense older events into a short account of the story so far.
    async fn summarize(&self, request: NarrationRequest) -> Result<String, NarratorError> {
        self.narrate(request).await
    }
}

/// Narrator backed by the Claude Messages API.
#[derive(Clone)]
pub struct ClaudeNarrator {
    client: Claude,
}

impl ClaudeNarrator {
    pub fn new(client: Claude) -> Self {
        Self { client }
    }

    /// Build from ANTHROPIC_API_KEY.
    pub fn from_env() -> Result<Self, NarratorError> {
        Ok(Self::new(Claude::from_env()?))
    }

    /// Build with an explicit key. ANTHROPIC_BASE_URL is still honored.
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self, NarratorError> {
        let mut client = Claude::new(api_key)?;
        if let Ok(base_url) = std::env::var("ANTHROPIC_BASE_URL") {
            client = client.with_base_url(base_url);
        }
        Ok(Self::new(client))
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }
}

#[async_trait]
impl Narrator for ClaudeNarrator {
    async fn narrate(&self, request: NarrationRequest) -> Result<String, NarratorError> {
        let messages = request
            .messages
            .into_iter()
            .map(|m| match m.speaker {
                Speaker::Player => Message::user(m.text),
                Speaker::Narrator => Message::assistant(m.text),
            })
            .collect();

        let mut api_request = Request::new(messages)
            .with_system(request.system)
            .with_max_tokens(request.max_tokens)
            .with_temperature(request.temperature);
        if let Some(model) = request.model {
            api_request = api_request.with_model(model);
        }

        let response = self.client.complete(api_request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(NarratorError::Unavailable("empty reply".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            ClaudeNarrator::with_api_key("  "),
            Err(NarratorError::Claude(claude::Error::NoApiKey))
        ));
    }

    #[test]
    fn test_explicit_key_uses_default_model() {
        let narrator = ClaudeNarrator::with_api_key("sk-test").unwrap();
        assert!(narrator.model().starts_with("claude-"));
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(NarrationMessage::player("hi").speaker, Speaker::Player);
        assert_eq!(NarrationMessage::narrator("hello").speaker, Speaker::Narrator);
    }
}
