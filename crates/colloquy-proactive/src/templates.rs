use crate::types::{ExpressionType, RelationshipStage};

/// Static utterance used when the model backend cannot produce one.
/// Tone follows the relationship stage: restrained early, warmer later.
pub fn template(
    expression_type: ExpressionType,
    stage: RelationshipStage,
    topic: Option<&str>,
) -> String {
    let warm = stage >= RelationshipStage::Established;
    match expression_type {
        ExpressionType::Greeting => {
            if warm {
                "Good morning! Ready when you are.".to_string()
            } else {
                "Good morning.".to_string()
            }
        }
        ExpressionType::Care => {
            "It has been a while since we last talked. How are things going?".to_string()
        }
        ExpressionType::Share => match topic {
            Some(topic) => format!(
                "I was thinking about our conversation on \"{topic}\" — want to pick it back up?"
            ),
            None => "I came across something you might find interesting. Want to hear it?"
                .to_string(),
        },
        ExpressionType::Suggestion => {
            "A quick thought: would it help to review where we left off?".to_string()
        }
        ExpressionType::Reflection => {
            "Looking back over our recent conversations, a few themes stand out. Shall I summarise them?"
                .to_string()
        }
        ExpressionType::Celebration => {
            "Congratulations on the milestone!".to_string()
        }
        ExpressionType::Farewell => {
            if warm {
                "Calling it a day? Sleep well — I'll be here tomorrow.".to_string()
            } else {
                "Good evening; talk tomorrow.".to_string()
            }
        }
        ExpressionType::Reminder => match topic {
            Some(topic) => format!("A reminder you asked for: {topic}"),
            None => "You asked me to remind you about something around now.".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_has_a_template() {
        for t in [
            ExpressionType::Greeting,
            ExpressionType::Care,
            ExpressionType::Share,
            ExpressionType::Suggestion,
            ExpressionType::Reflection,
            ExpressionType::Celebration,
            ExpressionType::Farewell,
            ExpressionType::Reminder,
        ] {
            assert!(!template(t, RelationshipStage::Initial, None).is_empty());
            assert!(!template(t, RelationshipStage::Close, Some("ICBC")).is_empty());
        }
    }

    #[test]
    fn share_names_the_topic() {
        let out = template(
            ExpressionType::Share,
            RelationshipStage::Established,
            Some("ICBC"),
        );
        assert!(out.contains("ICBC"));
    }
}
