use thiserror::Error;

/// All errors produced by the detection pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("feed connection error: {0}")]
    TransientNetwork(String),

    #[error("malformed event dropped: {0}")]
    MalformedEvent(String),

    #[error("startup configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("aggregator memory exhausted, forcing eviction")]
    ResourceExhausted,

    #[error("reconnect attempts exhausted, giving up")]
    TerminalReconnect,

    #[error("chat sink error: {0}")]
    Sink(String),
}

impl EngineError {
    /// Whether this error must terminate the WS reader instead of letting
    /// it retry locally.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineError::TerminalReconnect | EngineError::ConfigInvalid(_))
    }
}
