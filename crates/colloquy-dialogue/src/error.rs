use thiserror::Error;

use colloquy_store::StoreError;

#[derive(Debug, Error)]
pub enum DialogueError {
    /// Bad caller input (empty text, empty user id, unknown dialogue type).
    /// The only error the input pipeline surfaces to the boundary as 400.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Store failures that fallback could not absorb (corruption).
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, DialogueError>;
