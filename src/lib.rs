//! Herald: real-time mention detection and response orchestration for AI
//! meeting agents.
//!
//! The crate is the decision core that turns a live meeting's caption and
//! chat stream into routed, delivered agent responses:
//! Captions → Aggregation → Mention detection → Behavior routing → Delivery
//!
//! # Architecture
//!
//! The engine is built from independently testable pieces joined by a
//! single-writer run loop:
//! - **Name matcher**: literal, phonetic, and edit-distance mention
//!   classification over caption text
//! - **Caption aggregator**: merges fragmentary same-speaker captions and
//!   holds bare mentions while waiting for a follow-up question
//! - **Hybrid escalation**: consults an optional LLM only when the local
//!   decision is ambiguous
//! - **Behavior processor**: generates responses and routes them per the
//!   active pattern (immediate, human-approved, or hand-raise queued)
//! - **Pending response store**: tracks every response through an explicit
//!   lifecycle with approve/reject/dismiss operations
//!
//! Everything that touches a meeting, a speech service, or an LLM is an
//! injected collaborator trait; the crate performs no I/O of its own
//! beyond optional config files.

pub mod aggregator;
pub mod behavior;
pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod events;
pub mod matcher;
pub mod pattern;
pub mod store;
pub mod traits;

pub use aggregator::{AggregatedCaption, CaptionAggregator, CaptionEntry, PendingMention};
pub use behavior::{BehaviorProcessor, ChatMessage, TriggerContext};
pub use config::EngineConfig;
pub use engine::{Collaborators, EngineHandle, MentionEngine};
pub use error::{EngineError, Result};
pub use escalation::HybridDetector;
pub use events::EngineEvent;
pub use matcher::{MentionResult, NameMatcher};
pub use pattern::{AgentBehaviorPattern, BehaviorMode, ResponseChannel, TriggerConfig};
pub use store::{PendingResponse, QueueStats, ResponseStatus, TriggerSource};
