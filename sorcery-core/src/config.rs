//! Game configuration.

use thiserror::Error;

/// Default name for the player when none is given.
pub const DEFAULT_PLAYER_NAME: &str = "Adventurer";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Limits the rules engine enforces when resolving intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesConfig {
    /// Largest amount a single `gain` intent may add.
    pub max_stat_gain: i64,
    /// Largest quantity a single `take` intent may grant.
    pub max_item_grant: u32,
    /// How much each pool recovers on `rest`.
    pub rest_recovery: i64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            max_stat_gain: 5,
            max_item_grant: 3,
            rest_recovery: 10,
        }
    }
}

/// Configuration for a game.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub player_name: String,
    /// Model override; the narrator's default is used when `None`.
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    /// How many recent events stay in the narrator's context (K).
    pub context_window: usize,
    /// Corrective re-prompts after a malformed narrator reply.
    pub max_retries: u32,
    /// How many older events are recalled per turn.
    pub search_limit: usize,
    /// Evicted events to collect before folding them into the story summary.
    pub summary_batch: usize,
    pub rules: RulesConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player_name: DEFAULT_PLAYER_NAME.to_string(),
            model: None,
            max_tokens: 1000,
            temperature: 0.8,
            context_window: 12,
            max_retries: 1,
            search_limit: 3,
            summary_batch: 4,
            rules: RulesConfig::default(),
        }
    }
}

impl GameConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SORCERY_MODEL`, `SORCERY_CONTEXT_WINDOW`,
    /// `SORCERY_MAX_RETRIES` and `SORCERY_SUMMARY_BATCH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_overrides(|var| std::env::var(var).ok())
    }

    fn apply_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(model) = lookup("SORCERY_MODEL").filter(|m| !m.trim().is_empty()) {
            self.model = Some(model);
        }
        if let Some(raw) = lookup("SORCERY_CONTEXT_WINDOW") {
            let k = parse_var::<usize>("SORCERY_CONTEXT_WINDOW", &raw)?;
            if k == 0 {
                return Err(ConfigError::Invalid {
                    var: "SORCERY_CONTEXT_WINDOW",
                    value: raw,
                });
            }
            self.context_window = k;
        }
        if let Some(raw) = lookup("SORCERY_MAX_RETRIES") {
            self.max_retries = parse_var("SORCERY_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("SORCERY_SUMMARY_BATCH") {
            let batch = parse_var::<usize>("SORCERY_SUMMARY_BATCH", &raw)?;
            if batch == 0 {
                return Err(ConfigError::Invalid {
                    var: "SORCERY_SUMMARY_BATCH",
                    value: raw,
                });
            }
            self.summary_batch = batch;
        }
        Ok(self)
    }

    pub fn with_player_name(mut self, name: impl Into<String>) -> Self {
        self.player_name = name.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_context_window(mut self, k: usize) -> Self {
        self.context_window = k.max(1);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_summary_batch(mut self, batch: usize) -> Self {
        self.summary_batch = batch.max(1);
        self
    }

    pub fn with_rules(mut self, rules: RulesConfig) -> Self {
        self.rules = rules;
        self
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.player_name, DEFAULT_PLAYER_NAME);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.context_window, 12);
        assert_eq!(config.rules.max_item_grant, 3);
    }

    #[test]
    fn test_env_overrides() {
        let config = GameConfig::default()
            .apply_overrides(lookup(&[
                ("SORCERY_MODEL", "claude-3-haiku-20240307"),
                ("SORCERY_CONTEXT_WINDOW", "4"),
                ("SORCERY_MAX_RETRIES", " 3 "),
                ("SORCERY_SUMMARY_BATCH", "6"),
            ]))
            .unwrap();
        assert_eq!(config.summary_batch, 6);
        assert_eq!(config.model.as_deref(), Some("claude-3-haiku-20240307"));
        assert_eq!(config.context_window, 4);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_invalid_env_values() {
        let err = GameConfig::default()
            .apply_overrides(lookup(&[("SORCERY_CONTEXT_WINDOW", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SORCERY_CONTEXT_WINDOW", .. }));

        let err = GameConfig::default()
            .apply_overrides(lookup(&[("SORCERY_MAX_RETRIES", "lots")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for SORCERY_MAX_RETRIES: 'lots'"
        );
    }

    #[test]
    fn test_builder() {
        let config = GameConfig::new()
            .with_player_name("Ada")
            .with_context_window(0)
            .with_max_retries(2)
            .with_search_limit(5)
            .with_summary_batch(0);
        assert_eq!(config.player_name, "Ada");
        assert_eq!(config.context_window, 1);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.search_limit, 5);
        assert_eq!(config.summary_batch, 1);
    }
}
