use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::debug;

use colloquy_context::topic::extract_topic;
use colloquy_core::types::{DialogueType, TurnRole};
use colloquy_store::TurnStore;

use crate::types::RelationshipStage;

/// How many recent turns are scanned for the latest topic.
const TOPIC_WINDOW: usize = 20;

/// Everything the expression decision looks at, sampled once per tick.
#[derive(Debug, Clone)]
pub struct SignalSnapshot {
    pub now: DateTime<Utc>,
    /// Hour of day in the user's timezone.
    pub local_hour: u8,
    pub session_id: Option<String>,
    pub dialogue_type: Option<DialogueType>,
    pub latest_topic: Option<String>,
    /// Minutes since the last human turn; `None` when the user has never
    /// spoken in the active session.
    pub silence_minutes: Option<i64>,
    /// Seconds between the newest human turn and the reply that answered
    /// it; `None` while an answer is still outstanding.
    pub last_response_latency_secs: Option<i64>,
    /// Turns of any role committed over the last 24 hours.
    pub turns_last_day: u64,
    /// Cumulative turn count driving the relationship stage.
    pub interaction_count: u64,
    pub stage: RelationshipStage,
}

/// Sample the current signals for one user from their most recently active
/// session. Store misses degrade to an empty snapshot, never an error.
pub fn sample(store: &TurnStore, user_id: &str, timezone_offset_minutes: i32) -> SignalSnapshot {
    let now = Utc::now();
    let local_hour = local_hour(now, timezone_offset_minutes);

    let session = store
        .list_sessions_by_user(user_id, 1, 0)
        .unwrap_or_default()
        .into_iter()
        .next();

    let Some(session) = session else {
        debug!(user_id, "no session to sample signals from");
        return SignalSnapshot {
            now,
            local_hour,
            session_id: None,
            dialogue_type: None,
            latest_topic: None,
            silence_minutes: None,
            last_response_latency_secs: None,
            turns_last_day: 0,
            interaction_count: 0,
            stage: RelationshipStage::Initial,
        };
    };

    let last_human = store
        .latest_turn_with_role(&session.id, TurnRole::Human)
        .ok()
        .flatten()
        .and_then(|t| DateTime::parse_from_rfc3339(&t.created_at).ok())
        .map(|t| t.with_timezone(&Utc));
    let silence_minutes = last_human.map(|t| (now - t).num_minutes());

    let last_response_latency_secs = last_human
        .zip(
            store
                .latest_turn_with_role(&session.id, TurnRole::Ai)
                .ok()
                .flatten()
                .and_then(|t| DateTime::parse_from_rfc3339(&t.created_at).ok())
                .map(|t| t.with_timezone(&Utc)),
        )
        .filter(|(human, ai)| ai >= human)
        .map(|(human, ai)| (ai - human).num_seconds());

    let day_ago = (now - Duration::hours(24)).to_rfc3339();
    let turns_last_day = store.count_turns_since(&session.id, &day_ago).unwrap_or(0);
    let interaction_count = store.count_turns(&session.id).unwrap_or(0);

    let recent = store
        .get_turns(&session.id, Some(TOPIC_WINDOW), None)
        .unwrap_or_default();
    let latest_topic = extract_topic(&recent);

    SignalSnapshot {
        now,
        local_hour,
        session_id: Some(session.id),
        dialogue_type: Some(session.dialogue_type),
        latest_topic,
        silence_minutes,
        last_response_latency_secs,
        turns_last_day,
        interaction_count,
        stage: RelationshipStage::from_interaction_count(interaction_count),
    }
}

fn local_hour(now: DateTime<Utc>, offset_minutes: i32) -> u8 {
    let offset = FixedOffset::east_opt(offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    use chrono::Timelike;
    now.with_timezone(&offset).hour() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rusqlite::Connection;

    #[test]
    fn local_hour_applies_offset() {
        let noon_utc = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(local_hour(noon_utc, 0), 12);
        assert_eq!(local_hour(noon_utc, 120), 14);
        assert_eq!(local_hour(noon_utc, -300), 7);
    }

    #[test]
    fn empty_user_yields_inert_snapshot() {
        let store = TurnStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let snapshot = sample(&store, "nobody", 0);
        assert!(snapshot.session_id.is_none());
        assert_eq!(snapshot.stage, RelationshipStage::Initial);
        assert_eq!(snapshot.interaction_count, 0);
    }

    #[test]
    fn samples_silence_topic_and_counts() {
        let store = TurnStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let session = store.create_session("u1", None, None, None).unwrap();
        store
            .create_turn(&session.id, TurnRole::Human, "Tell me about ICBC", None)
            .unwrap();
        store
            .create_turn(&session.id, TurnRole::Ai, "ICBC is a large bank…", None)
            .unwrap();

        let snapshot = sample(&store, "u1", 0);
        assert_eq!(snapshot.session_id.as_deref(), Some(session.id.as_str()));
        assert_eq!(snapshot.interaction_count, 2);
        assert_eq!(snapshot.turns_last_day, 2);
        assert_eq!(snapshot.latest_topic.as_deref(), Some("Tell me about ICBC"));
        // The human turn just landed, so silence is (about) zero, and the
        // AI answered it immediately.
        assert!(snapshot.silence_minutes.unwrap() <= 1);
        assert!(snapshot.last_response_latency_secs.unwrap() <= 1);
    }
}
