use thiserror::Error;

use colloquy_store::StoreError;

#[derive(Debug, Error)]
pub enum ProactiveError {
    #[error("proactive expression disabled for user {user_id}")]
    Disabled { user_id: String },

    #[error("daily expression cap reached for user {user_id} (cap {cap})")]
    DailyCapReached { user_id: String, cap: u32 },

    #[error("quiet window active for user {user_id}")]
    QuietWindow { user_id: String },

    #[error("no active session for user {user_id}")]
    NoActiveSession { user_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ProactiveError>;
