//! Injected collaborator contracts.
//!
//! The engine is a pure in-process decision core: everything that touches
//! a meeting, a speech service, or an LLM arrives through these traits.
//! Implementations live with the SDK adapters, not here; tests use
//! hand-written mocks.

use crate::behavior::TriggerContext;
use crate::error::Result;
use crate::pattern::AgentBehaviorPattern;
use async_trait::async_trait;

/// A generated agent response.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedResponse {
    /// Response text to deliver.
    pub text: String,
    /// Optional generator-reported confidence.
    pub confidence: Option<f32>,
}

/// The connected AI agent. Opaque to the engine; rejection is tolerated
/// (the trigger is dropped with a log, never a crash).
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, context: &TriggerContext) -> Result<GeneratedResponse>;
}

/// Sends a text message into the meeting chat.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_chat(&self, text: &str) -> Result<()>;
}

/// Speaks a response into the meeting audio.
#[async_trait]
pub trait SpeechSender: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Raises and lowers the agent's virtual hand.
///
/// Hand-lowered notifications (by any actor: host, self, or others) arrive
/// separately through [`crate::engine::EngineHandle::notify_hand_lowered`].
#[async_trait]
pub trait HandRaiser: Send + Sync {
    async fn raise_hand(&self) -> Result<()>;
    async fn lower_hand(&self) -> Result<()>;
}

/// Optional LLM used for hybrid escalation and caption correction.
///
/// Takes a prompt, returns the raw completion text (expected to be JSON,
/// but the engine tolerates anything).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Read-only source of the currently selected behavior pattern.
///
/// The engine never mutates pattern definitions; selection and persistence
/// live with the caller.
pub trait PatternSource: Send + Sync {
    fn active_pattern(&self) -> AgentBehaviorPattern;
}

/// A fixed pattern source for callers without runtime pattern switching.
pub struct FixedPattern(pub AgentBehaviorPattern);

impl PatternSource for FixedPattern {
    fn active_pattern(&self) -> AgentBehaviorPattern {
        self.0.clone()
    }
}
