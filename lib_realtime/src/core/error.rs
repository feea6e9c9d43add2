use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Invalid event-stream endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Event stream closed")]
    Closed,

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
