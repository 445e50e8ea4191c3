use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolError};

/// Input/output modalities a tool can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
    File,
    Mixed,
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Modality::Text),
            "image" => Ok(Modality::Image),
            "audio" => Ok(Modality::Audio),
            "video" => Ok(Modality::Video),
            "file" => Ok(Modality::File),
            "mixed" => Ok(Modality::Mixed),
            other => Err(format!("unknown modality: {other}")),
        }
    }
}

/// Whether a registry entry is a single tool or a chain addressed by one name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Single,
    Chain,
}

/// Trait that all tools (and chains) implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, e.g. "calculator".
    fn name(&self) -> &str;

    /// What the tool does, shown in prompts and listings.
    fn description(&self) -> &str;

    /// One-line usage hint shown in the prompt's tool section.
    fn usage(&self) -> &str {
        ""
    }

    fn modalities(&self) -> Vec<Modality> {
        vec![Modality::Text]
    }

    /// Regex/keyword patterns the rule pass matches against user text.
    fn triggers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Oldest version `get` may still resolve for this tool.
    fn min_compatible(&self) -> Option<&str> {
        None
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Single
    }

    /// Execute the tool. Failures are surfaced to the model as the tool
    /// result string by the invoker, never as a request failure.
    async fn run(&self, args: serde_json::Value) -> Result<String>;
}

/// Registry-level view of one tool version, used for prompt construction
/// and the tools listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub usage: String,
    pub version: String,
    pub status: crate::registry::ToolStatus,
    pub kind: ToolKind,
    pub modalities: Vec<Modality>,
    pub triggers: Vec<String>,
}

/// Helper for tools that want a plain-text argument: accepts either a bare
/// string or an object with an `input` field.
pub fn text_arg(args: &serde_json::Value) -> Result<String> {
    match args {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Object(map) => map
            .get("input")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ToolError::Execution("missing 'input' argument".to_string())),
        _ => Err(ToolError::Execution(
            "expected a string or {\"input\": …} argument".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_arg_accepts_both_shapes() {
        assert_eq!(text_arg(&serde_json::json!("hi")).unwrap(), "hi");
        assert_eq!(text_arg(&serde_json::json!({"input": "hi"})).unwrap(), "hi");
        assert!(text_arg(&serde_json::json!(42)).is_err());
    }
}
