use colloquy_core::types::TurnRole;
use colloquy_store::Turn;

/// Short follow-on directives in the languages the server understands.
/// Matching is case-insensitive after trimming and stripping trailing
/// punctuation.
const CONTINUATIONS: &[&str] = &[
    "continue",
    "go on",
    "keep going",
    "more",
    "and then",
    "and then?",
    "tell me more",
    "继续",
    "请继续",
    "接着说",
    "继续说",
];

/// Whether an utterance is a bare continuation request ("continue", "go on",
/// "请继续") rather than new content.
pub fn is_continuation(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_end_matches(['.', '!', '?', '。', '！', '？', '…'])
        .trim()
        .to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    CONTINUATIONS.iter().any(|c| *c == normalized)
}

/// The most recent human turn that is not itself a continuation utterance,
/// walking newest to oldest. This is the topic a "continue" should resume.
pub fn extract_topic<'a, I>(turns: I) -> Option<String>
where
    I: IntoIterator<Item = &'a Turn>,
    I::IntoIter: DoubleEndedIterator,
{
    turns
        .into_iter()
        .rev()
        .find(|t| t.role == TurnRole::Human && !is_continuation(&t.content))
        .map(|t| t.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::types::Metadata;

    fn turn(role: TurnRole, content: &str) -> Turn {
        Turn {
            id: format!("t-{content}"),
            session_id: "s1".to_string(),
            role,
            content: content.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn recognises_continuations_in_both_languages() {
        assert!(is_continuation("continue"));
        assert!(is_continuation("  Continue!  "));
        assert!(is_continuation("go on"));
        assert!(is_continuation("继续"));
        assert!(is_continuation("请继续。"));
        assert!(!is_continuation("continue the analysis of Q3"));
        assert!(!is_continuation("hello"));
        assert!(!is_continuation(""));
    }

    #[test]
    fn topic_skips_continuation_turns() {
        let turns = vec![
            turn(TurnRole::Human, "Tell me about ICBC"),
            turn(TurnRole::Ai, "ICBC is a large bank…"),
            turn(TurnRole::Human, "continue"),
            turn(TurnRole::Ai, "Founded in 1984…"),
        ];
        assert_eq!(extract_topic(&turns).as_deref(), Some("Tell me about ICBC"));
    }

    #[test]
    fn no_substantive_human_turn_means_no_topic() {
        let turns = vec![
            turn(TurnRole::Human, "continue"),
            turn(TurnRole::Ai, "…about what?"),
        ];
        assert_eq!(extract_topic(&turns), None);
        let empty: Vec<Turn> = Vec::new();
        assert_eq!(extract_topic(&empty), None);
    }
}
