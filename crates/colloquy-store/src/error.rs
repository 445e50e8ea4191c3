use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Transient connection failures never surface here on the write path — the
/// store absorbs them by fabricating a fallback record. What remains is
/// malformed input, genuine not-found reads, and corruption.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested session does not exist.
    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// The requested turn does not exist.
    #[error("turn not found: {id}")]
    TurnNotFound { id: String },

    /// Missing or invalid caller-supplied field (empty session_id, unknown role).
    #[error("malformed input: {0}")]
    Malformed(String),

    /// A SQLite operation failed in a way fallback cannot absorb.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A persisted row could not be decoded (corruption).
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
