use crate::settings::UserFrequencySettings;
use crate::signals::SignalSnapshot;
use crate::types::{ExpressionType, RelationshipStage};

/// Silence that counts as "long" for a care expression.
const LONG_SILENCE_MINUTES: i64 = 24 * 60;
/// Silence before an established-stage share is considered.
const SHARE_SILENCE_MINUTES: i64 = 4 * 60;

/// What the utility function proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub expression_type: ExpressionType,
    pub priority: u8,
}

/// Decide whether to speak first, and in which register.
///
/// Hard gates first (opt-in, an active session, the quiet window, the daily
/// cap), then candidate rules; the highest-priority candidate wins.
pub fn should_express(
    signals: &SignalSnapshot,
    settings: &UserFrequencySettings,
    sent_today: u32,
    stage_caps: &[u32; 4],
    default_min_quiet_minutes: u32,
) -> Option<Decision> {
    if !settings.enabled {
        return None;
    }
    if settings.in_quiet_hours(signals.local_hour) {
        return None;
    }
    signals.session_id.as_ref()?;

    let cap = daily_cap(settings, signals.stage, stage_caps);
    if sent_today >= cap {
        return None;
    }

    let min_quiet = settings
        .min_quiet_minutes
        .unwrap_or(default_min_quiet_minutes) as i64;
    if let Some(silence) = signals.silence_minutes {
        if silence < min_quiet {
            return None;
        }
    }

    let mut candidates: Vec<Decision> = Vec::new();

    if (7..=9).contains(&signals.local_hour) {
        candidates.push(Decision {
            expression_type: ExpressionType::Greeting,
            priority: 2,
        });
    }
    if (20..=22).contains(&signals.local_hour) {
        candidates.push(Decision {
            expression_type: ExpressionType::Farewell,
            priority: 2,
        });
    }
    if signals.stage >= RelationshipStage::Developing
        && signals.silence_minutes.map(|s| s >= LONG_SILENCE_MINUTES).unwrap_or(false)
    {
        candidates.push(Decision {
            expression_type: ExpressionType::Care,
            priority: 3,
        });
    }
    if signals.stage >= RelationshipStage::Established
        && signals.latest_topic.is_some()
        && signals.silence_minutes.map(|s| s >= SHARE_SILENCE_MINUTES).unwrap_or(false)
    {
        candidates.push(Decision {
            expression_type: ExpressionType::Share,
            priority: 1,
        });
    }

    candidates.into_iter().max_by_key(|d| d.priority)
}

/// The per-user override wins over the stage default.
pub fn daily_cap(
    settings: &UserFrequencySettings,
    stage: RelationshipStage,
    stage_caps: &[u32; 4],
) -> u32 {
    settings.max_per_day.unwrap_or(stage_caps[stage.index()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const CAPS: [u32; 4] = [1, 3, 5, 8];

    fn enabled() -> UserFrequencySettings {
        UserFrequencySettings {
            enabled: true,
            ..Default::default()
        }
    }

    fn snapshot(local_hour: u8, silence_minutes: Option<i64>, count: u64) -> SignalSnapshot {
        SignalSnapshot {
            now: Utc::now(),
            local_hour,
            session_id: Some("s1".to_string()),
            dialogue_type: None,
            latest_topic: Some("ICBC".to_string()),
            silence_minutes,
            last_response_latency_secs: None,
            turns_last_day: 0,
            interaction_count: count,
            stage: crate::types::RelationshipStage::from_interaction_count(count),
        }
    }

    #[test]
    fn disabled_user_never_expresses() {
        let s = snapshot(8, Some(600), 30);
        assert!(should_express(&s, &UserFrequencySettings::default(), 0, &CAPS, 15).is_none());
    }

    #[test]
    fn quiet_hours_silence_the_tick_loop() {
        let s = snapshot(8, Some(600), 3);
        let mut settings = enabled();
        settings.quiet_hours = Some([7, 9]);
        assert!(should_express(&s, &settings, 0, &CAPS, 15).is_none());
        settings.quiet_hours = Some([22, 6]);
        assert!(should_express(&s, &settings, 0, &CAPS, 15).is_some());
    }

    #[test]
    fn quiet_window_gates_everything() {
        let s = snapshot(8, Some(5), 30);
        assert!(should_express(&s, &enabled(), 0, &CAPS, 15).is_none());
    }

    #[test]
    fn daily_cap_gates_everything() {
        let s = snapshot(8, Some(600), 3);
        // Initial stage cap is 1.
        assert!(should_express(&s, &enabled(), 1, &CAPS, 15).is_none());
        assert!(should_express(&s, &enabled(), 0, &CAPS, 15).is_some());
    }

    #[test]
    fn per_user_cap_override_wins() {
        let s = snapshot(8, Some(600), 3);
        let mut settings = enabled();
        settings.max_per_day = Some(5);
        assert!(should_express(&s, &settings, 4, &CAPS, 15).is_some());
        assert!(should_express(&s, &settings, 5, &CAPS, 15).is_none());
    }

    #[test]
    fn morning_prefers_greeting_evening_farewell() {
        let morning = snapshot(8, Some(60), 3);
        assert_eq!(
            should_express(&morning, &enabled(), 0, &CAPS, 15)
                .unwrap()
                .expression_type,
            ExpressionType::Greeting
        );
        let evening = snapshot(21, Some(60), 3);
        assert_eq!(
            should_express(&evening, &enabled(), 0, &CAPS, 15)
                .unwrap()
                .expression_type,
            ExpressionType::Farewell
        );
    }

    #[test]
    fn long_silence_in_developing_stage_prefers_care_over_greeting() {
        let s = snapshot(8, Some(26 * 60), 10);
        assert_eq!(
            should_express(&s, &enabled(), 0, &CAPS, 15)
                .unwrap()
                .expression_type,
            ExpressionType::Care
        );
    }

    #[test]
    fn long_silence_in_initial_stage_is_not_care() {
        let s = snapshot(13, Some(26 * 60), 2);
        // Midday, initial stage: no candidate fires at all.
        assert!(should_express(&s, &enabled(), 0, &CAPS, 15).is_none());
    }

    #[test]
    fn established_stage_midday_shares_on_a_topic() {
        let s = snapshot(13, Some(5 * 60), 30);
        assert_eq!(
            should_express(&s, &enabled(), 0, &CAPS, 15)
                .unwrap()
                .expression_type,
            ExpressionType::Share
        );
    }

    #[test]
    fn never_spoken_user_can_still_get_a_greeting() {
        let s = snapshot(8, None, 0);
        assert_eq!(
            should_express(&s, &enabled(), 0, &CAPS, 15)
                .unwrap()
                .expression_type,
            ExpressionType::Greeting
        );
    }
}
