//! Error types for the mention engine.

/// Top-level error type for the mention detection and response
/// orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// LLM escalation error (call failed or returned an unusable body).
    #[error("escalation error: {0}")]
    Escalation(String),

    /// Response generation error from the injected agent.
    #[error("generation error: {0}")]
    Generation(String),

    /// Chat or speech delivery error.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Hand-raise collaborator error.
    #[error("hand raise error: {0}")]
    HandRaise(String),

    /// Pending response store error (unknown id, invalid transition).
    #[error("store error: {0}")]
    Store(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EngineError>;
