//! Engine events for UI and observability.
//!
//! Events are broadcast on a `tokio::sync::broadcast` channel: a slow,
//! lagging, or panicking subscriber can never affect the engine or the
//! other subscribers. Sends with no receivers are silently dropped.

use crate::pattern::{BehaviorModeKind, ResponseChannel};
use crate::store::TriggerSource;
use uuid::Uuid;

/// What the engine is doing "right now".
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A confirmed trigger entered the behavior processor.
    TriggerDetected {
        source: TriggerSource,
        author: String,
        content: String,
    },
    /// The injected generator produced a response.
    ResponseGenerated { id: Uuid, author: String },
    /// A response is waiting for approval or a hand-lower.
    ResponseQueued { id: Uuid, mode: BehaviorModeKind },
    /// Delivery started.
    ResponseSending { id: Uuid, channel: ResponseChannel },
    /// Delivery finished successfully.
    ResponseSent { id: Uuid },
    /// Delivery failed; the record carries the error message.
    ResponseFailed { id: Uuid, error: String },
    /// The agent's hand was raised for a queued response.
    HandRaised { id: Uuid },
    /// The meeting reported the agent's hand was lowered.
    HandLowered,
    /// A supervisor approved a response.
    ResponseApproved { id: Uuid },
    /// A supervisor rejected a response.
    ResponseRejected { id: Uuid },
}
