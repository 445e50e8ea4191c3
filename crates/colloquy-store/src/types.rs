use serde::{Deserialize, Serialize};

use colloquy_core::types::{DialogueType, Metadata, SessionStatus, TurnRole};

/// A persisted conversation container owned by one user.
///
/// Invariants: `created_at <= updated_at <= last_activity_at`; `id`,
/// `user_id`, and `dialogue_type` are immutable after creation; `status`
/// only moves active → archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Time-sortable UUIDv7 string.
    pub id: String,
    pub user_id: String,
    /// User-visible free-form title.
    pub title: String,
    pub dialogue_type: DialogueType,
    pub status: SessionStatus,
    /// Turns committed through the dialogue pipeline, tracked so listings
    /// can show activity without scanning the turns table.
    pub message_count: u32,
    /// Cumulative model token usage across the session.
    pub total_tokens: u64,
    /// Model that produced the most recent reply (may change over time).
    pub last_model: Option<String>,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last record mutation.
    pub updated_at: String,
    /// RFC3339 timestamp of the last dialogue activity.
    pub last_activity_at: String,
    /// Opaque caller-attached map. `fallback=true` marks fabricated records.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Session {
    pub fn is_fallback(&self) -> bool {
        self.metadata
            .get("fallback")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// One committed utterance inside a session. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// UUIDv4 string.
    pub id: String,
    pub session_id: String,
    pub role: TurnRole,
    /// Payload; for `tool` turns, the serialized tool result.
    pub content: String,
    /// RFC3339 timestamp. Within a session turns are totally ordered by
    /// `(created_at, insertion order)`.
    pub created_at: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Turn {
    pub fn is_fallback(&self) -> bool {
        self.metadata
            .get("fallback")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}
