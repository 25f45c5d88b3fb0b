use thiserror::Error;

/// Failures inside the gateway. Every variant is scoped to a single frame,
/// a single recipient or a single session; none of them stops the process.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Inbound frame could not be turned into an envelope. The frame is
    /// dropped and the session keeps running.
    #[error("malformed frame: {0}")]
    Parse(String),

    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("unknown recipient '{0}'")]
    UnknownRecipient(String),

    /// The message could not be written, so it was not delivered either.
    #[error("message store failed: {0}")]
    Store(String),

    /// A single recipient's connection is gone. Not retried.
    #[error("delivery to '{0}' failed: connection closed")]
    Delivery(String),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
}

impl GatewayError {
    pub(crate) fn store(err: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", err))
    }
}
