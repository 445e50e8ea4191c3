use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key→value map attached to sessions, turns, and replies.
///
/// Keys the server itself writes: `fallback`, `is_proactive`, `toolsUsed`,
/// `contextUsed`, `modelFallback`, `timeout`.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Participant structure of a session.
///
/// The seven literals below are the exact wire values — clients send and
/// receive them verbatim in session payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogueType {
    /// One user, one AI counterpart. The default.
    #[default]
    HumanAiPrivate,
    HumanHumanPrivate,
    HumanHumanGroup,
    /// Two AI personas alternate until a turn budget is reached.
    AiAi,
    /// The AI records observations about itself; inbound turns carry the
    /// `system` role instead of `human`.
    AiSelfReflection,
    HumanAiGroup,
    AiMultiHumanGroup,
}

impl DialogueType {
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            DialogueType::HumanHumanGroup
                | DialogueType::HumanAiGroup
                | DialogueType::AiMultiHumanGroup
        )
    }
}

impl fmt::Display for DialogueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DialogueType::HumanAiPrivate => "HUMAN_AI_PRIVATE",
            DialogueType::HumanHumanPrivate => "HUMAN_HUMAN_PRIVATE",
            DialogueType::HumanHumanGroup => "HUMAN_HUMAN_GROUP",
            DialogueType::AiAi => "AI_AI",
            DialogueType::AiSelfReflection => "AI_SELF_REFLECTION",
            DialogueType::HumanAiGroup => "HUMAN_AI_GROUP",
            DialogueType::AiMultiHumanGroup => "AI_MULTI_HUMAN_GROUP",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DialogueType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "HUMAN_AI_PRIVATE" => Ok(DialogueType::HumanAiPrivate),
            "HUMAN_HUMAN_PRIVATE" => Ok(DialogueType::HumanHumanPrivate),
            "HUMAN_HUMAN_GROUP" => Ok(DialogueType::HumanHumanGroup),
            "AI_AI" => Ok(DialogueType::AiAi),
            "AI_SELF_REFLECTION" => Ok(DialogueType::AiSelfReflection),
            "HUMAN_AI_GROUP" => Ok(DialogueType::HumanAiGroup),
            "AI_MULTI_HUMAN_GROUP" => Ok(DialogueType::AiMultiHumanGroup),
            other => Err(format!("unknown dialogue type: {other}")),
        }
    }
}

/// Attribution of one committed utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Human,
    Ai,
    System,
    Tool,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnRole::Human => "human",
            TurnRole::Ai => "ai",
            TurnRole::System => "system",
            TurnRole::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "human" => Ok(TurnRole::Human),
            "ai" => Ok(TurnRole::Ai),
            "system" => Ok(TurnRole::System),
            "tool" => Ok(TurnRole::Tool),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Session lifecycle state. Transitions are monotone: active → archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Archived,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "archived" => Ok(SessionStatus::Archived),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Normalize an engine-native composite id (`"sessions:abc"`) to its id part.
///
/// All ids surfaced on the wire are plain strings; storage engines that
/// prefix record handles with a table name must not leak that shape.
pub fn normalize_id(raw: &str) -> &str {
    match raw.rsplit_once(':') {
        Some((_, id)) if !id.is_empty() => id,
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn dialogue_type_wire_round_trip() {
        for s in [
            "HUMAN_AI_PRIVATE",
            "HUMAN_HUMAN_PRIVATE",
            "HUMAN_HUMAN_GROUP",
            "AI_AI",
            "AI_SELF_REFLECTION",
            "HUMAN_AI_GROUP",
            "AI_MULTI_HUMAN_GROUP",
        ] {
            let dt = DialogueType::from_str(s).expect("parse failed");
            assert_eq!(dt.to_string(), s);
            let json = serde_json::to_string(&dt).unwrap();
            assert_eq!(json, format!("\"{s}\""));
        }
    }

    #[test]
    fn dialogue_type_default_is_private() {
        assert_eq!(DialogueType::default(), DialogueType::HumanAiPrivate);
    }

    #[test]
    fn unknown_dialogue_type_is_err() {
        assert!(DialogueType::from_str("HUMAN_AI").is_err());
    }

    #[test]
    fn role_round_trip() {
        for s in ["human", "ai", "system", "tool"] {
            assert_eq!(TurnRole::from_str(s).unwrap().to_string(), s);
        }
        assert!(TurnRole::from_str("assistant").is_err());
    }

    #[test]
    fn normalize_strips_table_prefix() {
        assert_eq!(normalize_id("sessions:abc123"), "abc123");
        assert_eq!(normalize_id("abc123"), "abc123");
        assert_eq!(normalize_id("a:b:c"), "c");
    }
}
