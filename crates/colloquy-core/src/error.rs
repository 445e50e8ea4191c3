use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColloquyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Model backend error: {0}")]
    Model(String),

    #[error("Tool error ({tool}): {reason}")]
    Tool { tool: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server overloaded: {in_flight} requests in flight (max {max})")]
    Overloaded { in_flight: usize, max: usize },

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ColloquyError {
    /// Short stable error code included in wire error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            ColloquyError::Config(_) => "CONFIG_ERROR",
            ColloquyError::Malformed(_) => "MALFORMED_INPUT",
            ColloquyError::NotFound { .. } => "NOT_FOUND",
            ColloquyError::Store(_) => "STORE_ERROR",
            ColloquyError::Model(_) => "MODEL_ERROR",
            ColloquyError::Tool { .. } => "TOOL_ERROR",
            ColloquyError::Serialization(_) => "SERIALIZATION_ERROR",
            ColloquyError::Io(_) => "IO_ERROR",
            ColloquyError::Overloaded { .. } => "OVERLOADED",
            ColloquyError::Timeout { .. } => "TIMEOUT",
            ColloquyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ColloquyError>;
