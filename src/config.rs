//! Configuration types for the mention engine.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the mention engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Canonical agent name as announced to the meeting (e.g. "Steve Jones").
    pub agent_name: String,
    /// Explicit name variations. When empty, variations are derived from
    /// `agent_name` (full name, individual words, first-name + last-initial).
    pub variations: Vec<String>,
    /// Name matching settings.
    pub matcher: MatcherConfig,
    /// Caption aggregation settings.
    pub aggregator: AggregatorConfig,
    /// Hybrid LLM escalation settings.
    pub escalation: EscalationConfig,
    /// Pending response queue settings.
    pub queue: QueueConfig,
}

/// Name matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum per-word Levenshtein similarity for a fuzzy match.
    ///
    /// Similarity is `1 - distance/max_len`. Typical values:
    ///   - 0.70: tolerant (catches heavier speech-to-text mangling)
    ///   - 0.75: default, one edit in a four-letter name
    ///   - 0.85: strict (near-exact words only)
    pub fuzzy_match_threshold: f32,
    /// Words shorter than this are skipped by fuzzy matching.
    pub min_word_len: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_match_threshold: 0.75,
            min_word_len: 3,
        }
    }
}

/// Caption aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Sliding window in ms within which consecutive same-speaker captions
    /// are merged into one utterance.
    pub aggregation_window_ms: u64,
    /// How long in ms to hold a bare name mention waiting for a follow-up
    /// question before giving up and processing what was captured.
    pub pending_mention_timeout_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            aggregation_window_ms: 3000,
            pending_mention_timeout_ms: 3500,
        }
    }
}

/// Hybrid LLM escalation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Whether escalation may be used at all. With `false` (or no LLM client
    /// injected) the engine runs on local matching alone.
    pub enabled: bool,
    /// Local confidence at or above which the LLM is never consulted.
    pub ambiguous_threshold: f32,
    /// Minimum local confidence for the validation path. Local matches below
    /// this are treated as "no confident match" and only the
    /// indirect-reference check runs.
    pub min_confidence_threshold: f32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ambiguous_threshold: 0.85,
            min_confidence_threshold: 0.50,
        }
    }
}

/// Pending response queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Soft capacity of the pending response queue. When exceeded, the
    /// oldest terminal-state entry is evicted; in-flight entries are never
    /// evicted implicitly.
    pub max_pending_responses: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending_responses: 20,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::EngineError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot
    /// be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::EngineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration before engine construction.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.agent_name.trim().is_empty() {
            return Err(crate::error::EngineError::Config(
                "agent_name must not be empty".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&self.matcher.fuzzy_match_threshold) {
            return Err(crate::error::EngineError::Config(format!(
                "matcher.fuzzy_match_threshold must be in [0, 1], got {}",
                self.matcher.fuzzy_match_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.escalation.ambiguous_threshold) {
            return Err(crate::error::EngineError::Config(format!(
                "escalation.ambiguous_threshold must be in [0, 1], got {}",
                self.escalation.ambiguous_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.escalation.min_confidence_threshold) {
            return Err(crate::error::EngineError::Config(format!(
                "escalation.min_confidence_threshold must be in [0, 1], got {}",
                self.escalation.min_confidence_threshold
            )));
        }
        if self.aggregator.aggregation_window_ms == 0 {
            return Err(crate::error::EngineError::Config(
                "aggregator.aggregation_window_ms must be > 0".to_owned(),
            ));
        }
        if self.aggregator.pending_mention_timeout_ms == 0 {
            return Err(crate::error::EngineError::Config(
                "aggregator.pending_mention_timeout_ms must be > 0".to_owned(),
            ));
        }
        if self.queue.max_pending_responses == 0 {
            return Err(crate::error::EngineError::Config(
                "queue.max_pending_responses must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}
