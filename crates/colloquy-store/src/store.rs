use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use colloquy_core::types::{normalize_id, DialogueType, Metadata, SessionStatus, TurnRole};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{Session, Turn};

/// Thread-safe owner of the sessions and turns tables.
///
/// Wraps a single SQLite connection in a `Mutex`; every other component
/// reads and writes these tables only through this interface.
///
/// Write-path failures that are not the caller's fault (connection loss,
/// or the explicit offline flag used by tests) are absorbed: the store
/// fabricates a record with `metadata.fallback=true` so the dialogue
/// pipeline stays responsive while the database is down.
pub struct TurnStore {
    db: Mutex<Connection>,
    offline: AtomicBool,
}

impl TurnStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            offline: AtomicBool::new(false),
        })
    }

    /// Simulate (or clear) an unreachable backing store. Used by tests and
    /// operational tooling; while set, writes fabricate and reads miss.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    // --- sessions ----------------------------------------------------------

    /// Create a session with all fields in a single insert.
    #[instrument(skip(self, metadata), fields(user_id))]
    pub fn create_session(
        &self,
        user_id: &str,
        title: Option<&str>,
        dialogue_type: Option<DialogueType>,
        metadata: Option<Metadata>,
    ) -> Result<Session> {
        if user_id.trim().is_empty() {
            return Err(StoreError::Malformed("user_id must not be empty".into()));
        }

        let now = now_rfc3339();
        let session = Session {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.to_string(),
            title: title.unwrap_or("New conversation").to_string(),
            dialogue_type: dialogue_type.unwrap_or_default(),
            status: SessionStatus::Active,
            message_count: 0,
            total_tokens: 0,
            last_model: None,
            created_at: now.clone(),
            updated_at: now.clone(),
            last_activity_at: now,
            metadata: metadata.unwrap_or_default(),
        };

        if self.is_offline() {
            return Ok(mark_fallback_session(session));
        }

        let db = self.db.lock().unwrap();
        let inserted = db.execute(
            "INSERT INTO sessions
             (id, user_id, title, dialogue_type, status, metadata,
              created_at, updated_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)",
            rusqlite::params![
                session.id,
                session.user_id,
                session.title,
                session.dialogue_type.to_string(),
                session.status.to_string(),
                serde_json::Value::Object(session.metadata.clone()).to_string(),
                session.created_at,
            ],
        );

        match inserted {
            Ok(_) => {
                debug!(session_id = %session.id, "session created");
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "session insert failed, fabricating fallback record");
                Ok(mark_fallback_session(session))
            }
        }
    }

    /// Look up a session. Engine-composite handles (`"sessions:abc"`) are
    /// accepted and normalized to their id portion.
    #[instrument(skip(self))]
    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        let session_id = normalize_id(session_id);
        if self.is_offline() {
            return Err(StoreError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, user_id, title, dialogue_type, status,
                    message_count, total_tokens, last_model, metadata,
                    created_at, updated_at, last_activity_at
             FROM sessions WHERE id = ?1",
            rusqlite::params![session_id],
            row_to_session,
        ) {
            Ok(s) => Ok(s),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::SessionNotFound {
                id: session_id.to_string(),
            }),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Most-recently-active sessions for a user, newest first.
    /// Misses (and offline mode) yield an empty list, never an error.
    #[instrument(skip(self), fields(user_id, limit, offset))]
    pub fn list_sessions_by_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Session>> {
        if self.is_offline() {
            return Ok(Vec::new());
        }
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, title, dialogue_type, status,
                    message_count, total_tokens, last_model, metadata,
                    created_at, updated_at, last_activity_at
             FROM sessions
             WHERE user_id = ?1
             ORDER BY last_activity_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![user_id, limit as i64, offset as i64],
            row_to_session,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_sessions_by_user(&self, user_id: &str) -> Result<u64> {
        if self.is_offline() {
            return Ok(0);
        }
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM sessions WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Bump `last_activity_at` (and `updated_at`). No-op on unknown ids.
    #[instrument(skip(self))]
    pub fn update_session_activity(&self, session_id: &str, ts: &str) -> Result<()> {
        if self.is_offline() {
            return Ok(());
        }
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE sessions SET last_activity_at = ?1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![ts, session_id],
        )?;
        Ok(())
    }

    /// Add `turns` to `message_count`, `tokens` to `total_tokens`, and
    /// record the model that produced the latest reply. No-op while the
    /// store is offline; unknown ids are ignored like activity updates.
    #[instrument(skip(self), fields(session_id, turns, tokens))]
    pub fn update_session_stats(
        &self,
        session_id: &str,
        turns: u32,
        tokens: u64,
        model: Option<&str>,
    ) -> Result<()> {
        if self.is_offline() {
            return Ok(());
        }
        let session_id = normalize_id(session_id);
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE sessions
             SET message_count = message_count + ?1,
                 total_tokens  = total_tokens  + ?2,
                 last_model    = COALESCE(?3, last_model),
                 updated_at    = ?4,
                 last_activity_at = ?4
             WHERE id = ?5",
            rusqlite::params![turns as i64, tokens as i64, model, now, session_id],
        )?;
        Ok(())
    }

    /// Move a session to `archived`. Monotone: archiving an archived
    /// session is a no-op that still succeeds.
    #[instrument(skip(self))]
    pub fn archive_session(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE sessions SET status = 'archived', updated_at = ?1,
                    last_activity_at = ?1
             WHERE id = ?2",
            rusqlite::params![now_rfc3339(), session_id],
        )?;
        if n == 0 {
            return Err(StoreError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete a session and, by cascade, all of its turns.
    #[instrument(skip(self))]
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM sessions WHERE id = ?1",
            rusqlite::params![session_id],
        )?;
        if n == 0 {
            return Err(StoreError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        Ok(())
    }

    // --- turns -------------------------------------------------------------

    /// Append one turn. Turns are immutable once committed; only the
    /// orchestrator and the proactive engine call this.
    #[instrument(skip(self, content, metadata), fields(session_id, role = %role))]
    pub fn create_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<Turn> {
        if session_id.trim().is_empty() {
            return Err(StoreError::Malformed("session_id must not be empty".into()));
        }
        let session_id = normalize_id(session_id);

        let turn = Turn {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now_rfc3339(),
            metadata: metadata.unwrap_or_default(),
        };

        if self.is_offline() {
            return Ok(mark_fallback_turn(turn));
        }

        let db = self.db.lock().unwrap();
        let inserted = insert_turn(&db, &turn);
        drop(db);

        match inserted {
            Ok(()) => Ok(turn),
            // A foreign-key violation means the caller referenced a session
            // that does not exist — that is malformed input, not an outage.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Malformed(format!(
                    "unknown session_id: {session_id}"
                )))
            }
            Err(e) => {
                warn!(error = %e, "turn insert failed, fabricating fallback record");
                Ok(mark_fallback_turn(turn))
            }
        }
    }

    /// Turns of a session in strict `(created_at, insertion order)` ascending
    /// order. `limit` returns the most recent window, still ascending;
    /// `before_id` pages backwards from a known turn.
    #[instrument(skip(self), fields(session_id))]
    pub fn get_turns(
        &self,
        session_id: &str,
        limit: Option<usize>,
        before_id: Option<&str>,
    ) -> Result<Vec<Turn>> {
        let session_id = normalize_id(session_id);
        if self.is_offline() {
            return Ok(Vec::new());
        }
        let db = self.db.lock().unwrap();
        let n = limit.map(|l| l as i64).unwrap_or(-1);

        let mut turns: Vec<Turn> = match before_id {
            Some(anchor_id) => {
                let (anchor_ts, anchor_seq): (String, i64) = db
                    .query_row(
                        "SELECT created_at, seq FROM turns
                         WHERE id = ?1 AND session_id = ?2",
                        rusqlite::params![anchor_id, session_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => StoreError::TurnNotFound {
                            id: anchor_id.to_string(),
                        },
                        other => StoreError::Database(other),
                    })?;
                let mut stmt = db.prepare(
                    "SELECT id, session_id, role, content, metadata, created_at
                     FROM turns
                     WHERE session_id = ?1
                       AND (created_at < ?2 OR (created_at = ?2 AND seq < ?3))
                     ORDER BY created_at DESC, seq DESC
                     LIMIT ?4",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![session_id, anchor_ts, anchor_seq, n],
                    row_to_turn,
                )?;
                rows.filter_map(|r| r.ok()).collect()
            }
            None => {
                let mut stmt = db.prepare(
                    "SELECT id, session_id, role, content, metadata, created_at
                     FROM turns
                     WHERE session_id = ?1
                     ORDER BY created_at DESC, seq DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![session_id, n], row_to_turn)?;
                rows.filter_map(|r| r.ok()).collect()
            }
        };

        turns.reverse();
        Ok(turns)
    }

    pub fn count_turns(&self, session_id: &str) -> Result<u64> {
        if self.is_offline() {
            return Ok(0);
        }
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
            rusqlite::params![session_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Turns committed at or after `since` (RFC3339). Feeds the proactive
    /// engine's frequency window.
    pub fn count_turns_since(&self, session_id: &str, since: &str) -> Result<u64> {
        if self.is_offline() {
            return Ok(0);
        }
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM turns WHERE session_id = ?1 AND created_at >= ?2",
            rusqlite::params![session_id, since],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// The newest turn of a session, if any.
    pub fn latest_turn(&self, session_id: &str) -> Result<Option<Turn>> {
        self.latest_turn_where(session_id, None)
    }

    /// The newest turn with the given role (e.g. the last human utterance,
    /// from which silence duration is measured).
    pub fn latest_turn_with_role(&self, session_id: &str, role: TurnRole) -> Result<Option<Turn>> {
        self.latest_turn_where(session_id, Some(role))
    }

    fn latest_turn_where(&self, session_id: &str, role: Option<TurnRole>) -> Result<Option<Turn>> {
        if self.is_offline() {
            return Ok(None);
        }
        let db = self.db.lock().unwrap();
        let result = match role {
            Some(role) => db.query_row(
                "SELECT id, session_id, role, content, metadata, created_at
                 FROM turns WHERE session_id = ?1 AND role = ?2
                 ORDER BY created_at DESC, seq DESC LIMIT 1",
                rusqlite::params![session_id, role.to_string()],
                row_to_turn,
            ),
            None => db.query_row(
                "SELECT id, session_id, role, content, metadata, created_at
                 FROM turns WHERE session_id = ?1
                 ORDER BY created_at DESC, seq DESC LIMIT 1",
                rusqlite::params![session_id],
                row_to_turn,
            ),
        };
        match result {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn insert_turn(db: &Connection, turn: &Turn) -> rusqlite::Result<()> {
    db.execute(
        "INSERT INTO turns (id, session_id, role, content, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            turn.id,
            turn.session_id,
            turn.role.to_string(),
            turn.content,
            serde_json::Value::Object(turn.metadata.clone()).to_string(),
            turn.created_at,
        ],
    )?;
    Ok(())
}

fn mark_fallback_session(mut session: Session) -> Session {
    session
        .metadata
        .insert("fallback".to_string(), serde_json::Value::Bool(true));
    session
}

fn mark_fallback_turn(mut turn: Turn) -> Turn {
    turn.metadata
        .insert("fallback".to_string(), serde_json::Value::Bool(true));
    turn
}

/// Decode one sessions row.
fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        dialogue_type: parse_col(row, 3)?,
        status: parse_col(row, 4)?,
        message_count: row.get::<_, i64>(5)? as u32,
        total_tokens: row.get::<_, i64>(6)? as u64,
        last_model: row.get(7)?,
        metadata: metadata_col(row, 8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        last_activity_at: row.get(11)?,
    })
}

/// Decode one turns row.
fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<Turn> {
    Ok(Turn {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: parse_col(row, 2)?,
        content: row.get(3)?,
        metadata: metadata_col(row, 4)?,
        created_at: row.get(5)?,
    })
}

fn parse_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn metadata_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Metadata> {
    let raw: String = row.get(idx)?;
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Ok(Metadata::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> TurnStore {
        TurnStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn create_and_get_session() {
        let store = open_store();
        let s = store
            .create_session("u1", Some("Trip planning"), None, None)
            .unwrap();
        assert_eq!(s.dialogue_type, DialogueType::HumanAiPrivate);
        assert_eq!(s.status, SessionStatus::Active);
        assert!(s.created_at <= s.last_activity_at);

        let loaded = store.get_session(&s.id).unwrap();
        assert_eq!(loaded.title, "Trip planning");
        assert_eq!(loaded.user_id, "u1");
    }

    #[test]
    fn empty_user_id_is_malformed() {
        let store = open_store();
        assert!(matches!(
            store.create_session("  ", None, None, None),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn turns_come_back_in_commit_order() {
        let store = open_store();
        let s = store.create_session("u1", None, None, None).unwrap();
        let t1 = store
            .create_turn(&s.id, TurnRole::Human, "hello", None)
            .unwrap();
        let t2 = store.create_turn(&s.id, TurnRole::Ai, "hi!", None).unwrap();

        let turns = store.get_turns(&s.id, None, None).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].id, t1.id);
        assert_eq!(turns[1].id, t2.id);
        assert!(turns[0].created_at <= turns[1].created_at);
    }

    #[test]
    fn same_millisecond_turns_keep_insertion_order() {
        let store = open_store();
        let s = store.create_session("u1", None, None, None).unwrap();

        // Force identical timestamps; the seq column must break the tie.
        let ts = now_rfc3339();
        let db = store.db.lock().unwrap();
        for content in ["first", "second", "third"] {
            let turn = Turn {
                id: Uuid::new_v4().to_string(),
                session_id: s.id.clone(),
                role: TurnRole::Human,
                content: content.to_string(),
                created_at: ts.clone(),
                metadata: Metadata::new(),
            };
            insert_turn(&db, &turn).unwrap();
        }
        drop(db);

        let turns = store.get_turns(&s.id, None, None).unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn limit_returns_most_recent_window_ascending() {
        let store = open_store();
        let s = store.create_session("u1", None, None, None).unwrap();
        for i in 0..5 {
            store
                .create_turn(&s.id, TurnRole::Human, &format!("m{i}"), None)
                .unwrap();
        }
        let turns = store.get_turns(&s.id, Some(2), None).unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[test]
    fn before_id_pages_backwards() {
        let store = open_store();
        let s = store.create_session("u1", None, None, None).unwrap();
        let mut ids = Vec::new();
        for i in 0..4 {
            ids.push(
                store
                    .create_turn(&s.id, TurnRole::Human, &format!("m{i}"), None)
                    .unwrap()
                    .id,
            );
        }
        let turns = store.get_turns(&s.id, Some(2), Some(&ids[3])).unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2"]);
    }

    #[test]
    fn unknown_session_turn_is_malformed_not_fallback() {
        let store = open_store();
        let result = store.create_turn("no-such-session", TurnRole::Human, "hi", None);
        assert!(matches!(result, Err(StoreError::Malformed(_))));
    }

    #[test]
    fn offline_create_fabricates_with_fallback_flag() {
        let store = open_store();
        store.set_offline(true);

        let s = store.create_session("u1", None, None, None).unwrap();
        assert!(s.is_fallback());
        assert!(!s.id.is_empty());

        let t = store
            .create_turn(&s.id, TurnRole::Human, "hello", None)
            .unwrap();
        assert!(t.is_fallback());
        assert_eq!(t.content, "hello");

        // Reads miss but never error.
        assert!(store.get_turns(&s.id, None, None).unwrap().is_empty());
        assert!(store.list_sessions_by_user("u1", 10, 0).unwrap().is_empty());
        assert!(store.latest_turn(&s.id).unwrap().is_none());
    }

    #[test]
    fn delete_cascades_to_turns() {
        let store = open_store();
        let s = store.create_session("u1", None, None, None).unwrap();
        store
            .create_turn(&s.id, TurnRole::Human, "hello", None)
            .unwrap();
        store.delete_session(&s.id).unwrap();

        assert!(matches!(
            store.get_session(&s.id),
            Err(StoreError::SessionNotFound { .. })
        ));
        assert!(store.get_turns(&s.id, None, None).unwrap().is_empty());
    }

    #[test]
    fn archive_is_monotone() {
        let store = open_store();
        let s = store.create_session("u1", None, None, None).unwrap();
        store.archive_session(&s.id).unwrap();
        store.archive_session(&s.id).unwrap();
        assert_eq!(
            store.get_session(&s.id).unwrap().status,
            SessionStatus::Archived
        );
    }

    #[test]
    fn activity_update_is_noop_on_unknown_id() {
        let store = open_store();
        store
            .update_session_activity("missing", &now_rfc3339())
            .unwrap();
    }

    #[test]
    fn activity_update_keeps_timestamp_invariant() {
        let store = open_store();
        let s = store.create_session("u1", None, None, None).unwrap();
        let later = (chrono::Utc::now() + chrono::Duration::seconds(5)).to_rfc3339();
        store.update_session_activity(&s.id, &later).unwrap();
        let loaded = store.get_session(&s.id).unwrap();
        assert!(loaded.created_at <= loaded.updated_at);
        assert!(loaded.updated_at <= loaded.last_activity_at);
    }

    #[test]
    fn list_sessions_newest_activity_first() {
        let store = open_store();
        let a = store.create_session("u1", Some("a"), None, None).unwrap();
        let b = store.create_session("u1", Some("b"), None, None).unwrap();
        let later = (chrono::Utc::now() + chrono::Duration::seconds(5)).to_rfc3339();
        store.update_session_activity(&a.id, &later).unwrap();

        let sessions = store.list_sessions_by_user("u1", 10, 0).unwrap();
        assert_eq!(sessions[0].id, a.id);
        assert_eq!(sessions[1].id, b.id);
        assert_eq!(store.count_sessions_by_user("u1").unwrap(), 2);
    }

    #[test]
    fn stats_accumulate_and_keep_timestamp_invariant() {
        let store = open_store();
        let s = store.create_session("u1", None, None, None).unwrap();
        assert_eq!(s.message_count, 0);

        store
            .update_session_stats(&s.id, 2, 150, Some("gpt-4o-mini"))
            .unwrap();
        store.update_session_stats(&s.id, 2, 50, None).unwrap();

        let loaded = store.get_session(&s.id).unwrap();
        assert_eq!(loaded.message_count, 4);
        assert_eq!(loaded.total_tokens, 200);
        assert_eq!(loaded.last_model.as_deref(), Some("gpt-4o-mini"));
        assert!(loaded.created_at <= loaded.updated_at);
        assert!(loaded.updated_at <= loaded.last_activity_at);

        // Unknown ids are a no-op, matching activity updates.
        store
            .update_session_stats("missing", 1, 1, None)
            .unwrap();
    }

    #[test]
    fn concurrent_writers_never_cross_sessions() {
        let store = std::sync::Arc::new(open_store());
        let sessions: Vec<String> = (0..4)
            .map(|i| {
                store
                    .create_session(&format!("u{i}"), None, None, None)
                    .unwrap()
                    .id
            })
            .collect();

        let handles: Vec<_> = sessions
            .iter()
            .cloned()
            .map(|session_id| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..25 {
                        store
                            .create_turn(
                                &session_id,
                                TurnRole::Human,
                                &format!("{session_id}:{n}"),
                                None,
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for session_id in &sessions {
            let turns = store.get_turns(session_id, None, None).unwrap();
            assert_eq!(turns.len(), 25);
            // No turn from another session leaks in, and order is intact.
            for (n, turn) in turns.iter().enumerate() {
                assert_eq!(turn.content, format!("{session_id}:{n}"));
                assert_eq!(&turn.session_id, session_id);
            }
        }
    }

    #[test]
    fn composite_engine_ids_resolve() {
        let store = open_store();
        let s = store.create_session("u1", None, None, None).unwrap();
        let composite = format!("sessions:{}", s.id);
        assert_eq!(store.get_session(&composite).unwrap().id, s.id);

        store
            .create_turn(&composite, TurnRole::Human, "hi", None)
            .unwrap();
        assert_eq!(store.get_turns(&composite, None, None).unwrap().len(), 1);
    }

    #[test]
    fn metadata_round_trips() {
        let store = open_store();
        let mut meta = Metadata::new();
        meta.insert("origin".into(), serde_json::json!("mobile"));
        let s = store
            .create_session("u1", None, Some(DialogueType::AiSelfReflection), Some(meta))
            .unwrap();
        let loaded = store.get_session(&s.id).unwrap();
        assert_eq!(loaded.dialogue_type, DialogueType::AiSelfReflection);
        assert_eq!(
            loaded.metadata.get("origin").and_then(|v| v.as_str()),
            Some("mobile")
        );
    }
}
