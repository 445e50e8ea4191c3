use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in the model-facing conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MsgRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MsgRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Per-call generation parameters.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Deadline for the whole call. Expiry is a transient error.
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Result of a completed generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Common interface for model backends.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Backend name for logging and error messages.
    fn name(&self) -> &str;

    /// Send the ordered message list, wait for the full reply.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        opts: &GenerateOptions,
    ) -> Result<Generation, ModelError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl ModelError {
    /// Transient errors are absorbed upstream: the orchestrator answers
    /// with its deterministic fallback reply rather than failing the turn.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Timeout(_)
            | ModelError::Http(_)
            | ModelError::RateLimited { .. }
            | ModelError::Unavailable(_) => true,
            ModelError::Api { status, .. } => *status >= 500,
            ModelError::Parse(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_rate_limit_are_transient() {
        assert!(ModelError::Timeout(Duration::from_secs(60)).is_transient());
        assert!(ModelError::RateLimited {
            retry_after_ms: 5000
        }
        .is_transient());
        assert!(ModelError::Unavailable("connection refused".into()).is_transient());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        assert!(ModelError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!ModelError::Api {
            status: 401,
            message: "bad key".into()
        }
        .is_transient());
        assert!(!ModelError::Parse("truncated json".into()).is_transient());
    }

    #[test]
    fn msg_role_wire_values() {
        let m = ChatMessage::new(MsgRole::Assistant, "hi");
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
    }
}
