use serde::{Deserialize, Serialize};

use colloquy_core::types::Metadata;

/// The register an unsolicited utterance speaks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionType {
    Greeting,
    Care,
    Share,
    Suggestion,
    Reflection,
    Celebration,
    Farewell,
    Reminder,
}

impl std::fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExpressionType::Greeting => "greeting",
            ExpressionType::Care => "care",
            ExpressionType::Share => "share",
            ExpressionType::Suggestion => "suggestion",
            ExpressionType::Reflection => "reflection",
            ExpressionType::Celebration => "celebration",
            ExpressionType::Farewell => "farewell",
            ExpressionType::Reminder => "reminder",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExpressionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "greeting" => Ok(ExpressionType::Greeting),
            "care" => Ok(ExpressionType::Care),
            "share" => Ok(ExpressionType::Share),
            "suggestion" => Ok(ExpressionType::Suggestion),
            "reflection" => Ok(ExpressionType::Reflection),
            "celebration" => Ok(ExpressionType::Celebration),
            "farewell" => Ok(ExpressionType::Farewell),
            "reminder" => Ok(ExpressionType::Reminder),
            other => Err(format!("unknown expression type: {other}")),
        }
    }
}

/// Lifecycle of one expression. Terminal states are `fired` and `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionState {
    Proposed,
    Planned,
    Generated,
    Queued,
    Fired,
    Cancelled,
}

/// Interaction depth between one user and the server, advanced by
/// cumulative turn count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStage {
    Initial,
    Developing,
    Established,
    Close,
}

impl RelationshipStage {
    /// Band boundaries: 0–5 initial, 6–20 developing, 21–50 established,
    /// 51+ close.
    pub fn from_interaction_count(count: u64) -> Self {
        match count {
            0..=5 => RelationshipStage::Initial,
            6..=20 => RelationshipStage::Developing,
            21..=50 => RelationshipStage::Established,
            _ => RelationshipStage::Close,
        }
    }

    /// Index into the configured per-stage daily cap table.
    pub fn index(&self) -> usize {
        match self {
            RelationshipStage::Initial => 0,
            RelationshipStage::Developing => 1,
            RelationshipStage::Established => 2,
            RelationshipStage::Close => 3,
        }
    }
}

/// One unsolicited utterance moving through the expression state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expression {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub expression_type: ExpressionType,
    pub content: String,
    pub priority: u8,
    pub state: ExpressionState,
    /// RFC3339 instant the expression was proposed; turns committed after
    /// this cancel it at fire time.
    pub created_at: String,
    /// RFC3339 instant the queue may fire it.
    pub scheduled_at: String,
    #[serde(default)]
    pub metadata: Metadata,
}
