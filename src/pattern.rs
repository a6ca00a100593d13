//! Behavior pattern configuration.
//!
//! A pattern maps each trigger source (caption mention, chat mention) to a
//! response channel and a delivery mode. Patterns are configuration data
//! owned by the caller; the engine only reads the active one.

use serde::{Deserialize, Serialize};

/// Where a response is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseChannel {
    /// Meeting chat only.
    #[default]
    Chat,
    /// Spoken audio only.
    Speech,
    /// Both chat and speech, dispatched concurrently.
    Both,
}

/// Options for the controlled (human-approved) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlledOptions {
    /// Whether an explicit approval is required before delivery.
    pub require_approval: bool,
}

impl Default for ControlledOptions {
    fn default() -> Self {
        Self {
            require_approval: true,
        }
    }
}

/// Options for the queued (hand-raise gated) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuedOptions {
    /// Raise the agent's hand as soon as the response is queued. Delivery
    /// then waits for the hand to be lowered.
    pub auto_raise_hand: bool,
}

impl Default for QueuedOptions {
    fn default() -> Self {
        Self {
            auto_raise_hand: true,
        }
    }
}

/// Delivery strategy for a trigger source.
///
/// Mode-specific options are only reachable for their matching variant, so
/// an "immediate pattern with queued options" cannot be represented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BehaviorMode {
    /// Deliver as soon as the response is generated.
    #[default]
    Immediate,
    /// Hold the response until a human approves or rejects it.
    Controlled {
        #[serde(default)]
        options: ControlledOptions,
    },
    /// Queue the response behind a raised hand; deliver when it lowers.
    Queued {
        #[serde(default)]
        options: QueuedOptions,
    },
}

/// Flat discriminant of [`BehaviorMode`], recorded on each pending response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorModeKind {
    Immediate,
    Controlled,
    Queued,
}

impl BehaviorMode {
    /// The flat discriminant for records and stats.
    #[must_use]
    pub fn kind(&self) -> BehaviorModeKind {
        match self {
            Self::Immediate => BehaviorModeKind::Immediate,
            Self::Controlled { .. } => BehaviorModeKind::Controlled,
            Self::Queued { .. } => BehaviorModeKind::Queued,
        }
    }
}

/// Per-trigger-source configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Whether this trigger source is handled at all.
    pub enabled: bool,
    /// Where responses to this trigger are delivered.
    pub response_channel: ResponseChannel,
    /// How responses to this trigger are released.
    pub mode: BehaviorMode,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            response_channel: ResponseChannel::Chat,
            mode: BehaviorMode::Immediate,
        }
    }
}

/// A named mapping from trigger sources to delivery behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBehaviorPattern {
    /// Stable identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Behavior for mentions detected in live captions.
    pub caption_mention: TriggerConfig,
    /// Behavior for mentions in chat messages.
    pub chat_mention: TriggerConfig,
}

impl AgentBehaviorPattern {
    /// Respond to everything immediately, captions by speech, chat by chat.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            id: "immediate".to_owned(),
            name: "Immediate".to_owned(),
            caption_mention: TriggerConfig {
                enabled: true,
                response_channel: ResponseChannel::Speech,
                mode: BehaviorMode::Immediate,
            },
            chat_mention: TriggerConfig {
                enabled: true,
                response_channel: ResponseChannel::Chat,
                mode: BehaviorMode::Immediate,
            },
        }
    }

    /// Hold every response for human approval.
    #[must_use]
    pub fn supervised() -> Self {
        let controlled = BehaviorMode::Controlled {
            options: ControlledOptions::default(),
        };
        Self {
            id: "supervised".to_owned(),
            name: "Supervised".to_owned(),
            caption_mention: TriggerConfig {
                enabled: true,
                response_channel: ResponseChannel::Speech,
                mode: controlled,
            },
            chat_mention: TriggerConfig {
                enabled: true,
                response_channel: ResponseChannel::Chat,
                mode: controlled,
            },
        }
    }

    /// Queue caption responses behind a raised hand; chat stays immediate.
    #[must_use]
    pub fn queued_hand_raise() -> Self {
        Self {
            id: "queued-hand-raise".to_owned(),
            name: "Queued (hand raise)".to_owned(),
            caption_mention: TriggerConfig {
                enabled: true,
                response_channel: ResponseChannel::Speech,
                mode: BehaviorMode::Queued {
                    options: QueuedOptions::default(),
                },
            },
            chat_mention: TriggerConfig {
                enabled: true,
                response_channel: ResponseChannel::Chat,
                mode: BehaviorMode::Immediate,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn mode_kind_discriminants() {
        assert_eq!(BehaviorMode::Immediate.kind(), BehaviorModeKind::Immediate);
        assert_eq!(
            BehaviorMode::Controlled {
                options: ControlledOptions::default()
            }
            .kind(),
            BehaviorModeKind::Controlled
        );
        assert_eq!(
            BehaviorMode::Queued {
                options: QueuedOptions::default()
            }
            .kind(),
            BehaviorModeKind::Queued
        );
    }

    #[test]
    fn mode_serde_round_trip() {
        let mode = BehaviorMode::Queued {
            options: QueuedOptions {
                auto_raise_hand: false,
            },
        };
        let json = serde_json::to_string(&mode).unwrap();
        assert!(json.contains(r#""mode":"queued""#), "json was {json}");
        let back: BehaviorMode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mode);
    }

    #[test]
    fn mode_deserializes_without_options() {
        let mode: BehaviorMode = serde_json::from_str(r#"{"mode":"controlled"}"#).unwrap();
        assert_eq!(mode.kind(), BehaviorModeKind::Controlled);
        match mode {
            BehaviorMode::Controlled { options } => assert!(options.require_approval),
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn presets_are_distinct() {
        assert_eq!(AgentBehaviorPattern::immediate().id, "immediate");
        assert_eq!(AgentBehaviorPattern::supervised().id, "supervised");
        assert_eq!(
            AgentBehaviorPattern::queued_hand_raise().id,
            "queued-hand-raise"
        );
        assert_eq!(
            AgentBehaviorPattern::supervised().caption_mention.mode.kind(),
            BehaviorModeKind::Controlled
        );
    }
}
