use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {name}")]
    NotFound { name: String },

    #[error("tool {name} has no version {version}")]
    VersionNotFound { name: String, version: String },

    #[error("tool {name} version {requested} is older than minimum compatible {minimum}")]
    IncompatibleVersion {
        name: String,
        requested: String,
        minimum: String,
    },

    #[error("invalid version string: {0}")]
    InvalidVersion(String),

    #[error("invalid tool definition ({path}): {reason}")]
    InvalidDefinition { path: String, reason: String },

    #[error("no argument migration from {from} to {to} for tool {name}")]
    NoMigration {
        name: String,
        from: String,
        to: String,
    },

    #[error("tool execution failed: {0}")]
    Execution(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ToolError>;
