use tracing::debug;

use colloquy_core::types::{DialogueType, Metadata, TurnRole};
use colloquy_model::{ChatMessage, MsgRole};
use colloquy_store::Turn;

use crate::processors::ContextProcessors;
use crate::topic::{extract_topic, is_continuation};

/// Builds the model-facing message list: exactly one leading system
/// message, one message per prior turn in chronological order, and the
/// current user text last.
///
/// Assembly is deterministic: the same inputs produce a byte-identical
/// list.
pub struct ContextAssembler {
    processors: ContextProcessors,
    /// Budget for caller-supplied context material, in characters
    /// (~4 per token).
    max_context_chars: usize,
}

impl ContextAssembler {
    pub fn new(processors: ContextProcessors, max_context_tokens: usize) -> Self {
        Self {
            processors,
            max_context_chars: max_context_tokens.saturating_mul(4),
        }
    }

    pub fn build(
        &self,
        prior_turns: &[Turn],
        user_text: &str,
        caller_context: Option<&Metadata>,
        dialogue_type: DialogueType,
    ) -> Vec<ChatMessage> {
        // The store already returns turns ordered; re-assert defensively.
        // The sort is stable, so equal timestamps keep their given order.
        let mut ordered: Vec<&Turn> = prior_turns.iter().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let system = self.system_message(&ordered, user_text, caller_context, dialogue_type);

        let mut messages = Vec::with_capacity(ordered.len() + 2);
        messages.push(ChatMessage::new(MsgRole::System, system));
        for turn in &ordered {
            messages.push(ChatMessage::new(role_for(turn.role), turn.content.clone()));
        }
        messages.push(ChatMessage::new(MsgRole::User, user_text.to_string()));
        messages
    }

    fn system_message(
        &self,
        ordered: &[&Turn],
        user_text: &str,
        caller_context: Option<&Metadata>,
        dialogue_type: DialogueType,
    ) -> String {
        let mut out = String::new();

        if let Some(context) = caller_context {
            if !context.is_empty() {
                let block = self.processors.process(context);
                if !block.is_empty() {
                    out.push_str(&truncate_to_budget(&block, self.max_context_chars));
                    out.push_str("\n\n");
                }
            }
        }

        out.push_str(base_directive(dialogue_type));
        out.push_str("\n\n");
        out.push_str(CONTINUITY_CLAUSE);

        if let Some(topic) = extract_topic(ordered.iter().copied()) {
            out.push_str(&format!(
                " When the user says \"continue\", continue about: {topic}"
            ));
            if is_continuation(user_text) {
                debug!("continuation utterance detected, topic pinned in system message");
            }
        }

        out
    }
}

const CONTINUITY_CLAUSE: &str = "If the user's latest message is only a short \
continuation request (such as \"continue\", \"go on\", or \"请继续\"), keep \
talking about the previous topic; do not start a new one.";

fn base_directive(dialogue_type: DialogueType) -> &'static str {
    match dialogue_type {
        DialogueType::HumanAiPrivate => {
            "You are Colloquy, a conversational assistant in a private one-on-one dialogue."
        }
        DialogueType::HumanHumanPrivate => {
            "You are Colloquy, assisting inside a private conversation between two people. \
             Speak only when addressed."
        }
        DialogueType::HumanHumanGroup => {
            "You are Colloquy, assisting inside a group conversation between people. \
             Speak only when addressed."
        }
        DialogueType::AiAi => {
            "You are one of two AI interlocutors in a structured exchange. Engage with \
             your counterpart's last point directly."
        }
        DialogueType::AiSelfReflection => {
            "You are Colloquy in self-reflection. Record a concise observation about \
             your own recent behaviour in this conversation."
        }
        DialogueType::HumanAiGroup => {
            "You are Colloquy, a conversational assistant in a group dialogue with \
             several human participants."
        }
        DialogueType::AiMultiHumanGroup => {
            "You are Colloquy, one of several assistants in a group dialogue with \
             several human participants."
        }
    }
}

fn role_for(role: TurnRole) -> MsgRole {
    match role {
        TurnRole::Human => MsgRole::User,
        TurnRole::Ai => MsgRole::Assistant,
        TurnRole::System => MsgRole::System,
        TurnRole::Tool => MsgRole::Tool,
    }
}

/// Tail-truncate over-budget context with an ellipsis marker, on a char
/// boundary.
fn truncate_to_budget(block: &str, budget_chars: usize) -> String {
    if block.chars().count() <= budget_chars {
        return block.to_string();
    }
    let kept: String = block.chars().take(budget_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::types::Metadata;

    fn turn(role: TurnRole, content: &str, ts: &str) -> Turn {
        Turn {
            id: format!("t-{content}"),
            session_id: "s1".to_string(),
            role,
            content: content.to_string(),
            created_at: ts.to_string(),
            metadata: Metadata::new(),
        }
    }

    fn assembler() -> ContextAssembler {
        ContextAssembler::new(ContextProcessors::new(), 1000)
    }

    #[test]
    fn shape_is_system_then_history_then_user() {
        let turns = vec![
            turn(TurnRole::Human, "hi", "2026-01-01T00:00:01Z"),
            turn(TurnRole::Ai, "hello!", "2026-01-01T00:00:02Z"),
        ];
        let messages = assembler().build(&turns, "how are you", None, DialogueType::HumanAiPrivate);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MsgRole::System);
        assert_eq!(messages[1].role, MsgRole::User);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].role, MsgRole::Assistant);
        assert_eq!(messages[3].role, MsgRole::User);
        assert_eq!(messages[3].content, "how are you");
    }

    #[test]
    fn out_of_order_history_is_resorted() {
        let turns = vec![
            turn(TurnRole::Ai, "second", "2026-01-01T00:00:02Z"),
            turn(TurnRole::Human, "first", "2026-01-01T00:00:01Z"),
        ];
        let messages = assembler().build(&turns, "next", None, DialogueType::HumanAiPrivate);
        assert_eq!(messages[1].content, "first");
        assert_eq!(messages[2].content, "second");
    }

    #[test]
    fn continuity_clause_names_the_topic() {
        let turns = vec![
            turn(TurnRole::Human, "Tell me about ICBC", "2026-01-01T00:00:01Z"),
            turn(TurnRole::Ai, "ICBC is a large bank…", "2026-01-01T00:00:02Z"),
        ];
        let messages = assembler().build(&turns, "continue", None, DialogueType::HumanAiPrivate);
        let system = &messages[0].content;
        assert!(system.contains("ICBC"));
        assert!(system.contains("continue about: Tell me about ICBC"));
    }

    #[test]
    fn no_topic_omits_the_verbatim_clause() {
        let messages = assembler().build(&[], "continue", None, DialogueType::HumanAiPrivate);
        let system = &messages[0].content;
        assert!(system.contains("continuation request"));
        assert!(!system.contains("continue about:"));
    }

    #[test]
    fn caller_context_is_prepended() {
        let context = match serde_json::json!({"type": "general", "plan": "pro"}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let messages =
            assembler().build(&[], "hi", Some(&context), DialogueType::HumanAiPrivate);
        assert!(messages[0].content.starts_with("User context: plan=pro."));
    }

    #[test]
    fn over_budget_context_is_tail_truncated() {
        let big = "x".repeat(10_000);
        let context = match serde_json::json!({"type": "custom", "text": big}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let assembler = ContextAssembler::new(ContextProcessors::new(), 10);
        let messages = assembler.build(&[], "hi", Some(&context), DialogueType::HumanAiPrivate);
        let system = &messages[0].content;
        assert!(system.starts_with(&"x".repeat(39)));
        assert!(system.contains('…'));
    }

    #[test]
    fn assembly_is_byte_identical_for_same_inputs() {
        let turns = vec![
            turn(TurnRole::Human, "hello", "2026-01-01T00:00:01Z"),
            turn(TurnRole::Ai, "hi", "2026-01-01T00:00:02Z"),
        ];
        let context = match serde_json::json!({
            "type": "user_profile", "name": "Ada",
            "preferences": {"b": 1, "a": 2}
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let a = assembler().build(&turns, "next", Some(&context), DialogueType::HumanAiPrivate);
        let b = assembler().build(&turns, "next", Some(&context), DialogueType::HumanAiPrivate);
        assert_eq!(a, b);
    }

    #[test]
    fn tool_turns_keep_the_tool_role() {
        let turns = vec![turn(TurnRole::Tool, "42", "2026-01-01T00:00:01Z")];
        let messages = assembler().build(&turns, "thanks", None, DialogueType::HumanAiPrivate);
        assert_eq!(messages[1].role, MsgRole::Tool);
    }
}
