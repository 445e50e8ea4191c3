use rusqlite::Connection;

use crate::error::Result;

/// Initialise the sessions and turns tables plus their indexes.
///
/// Idempotent: every statement is `IF NOT EXISTS`, so startup always runs it.
///
/// `turns.seq` is the AUTOINCREMENT insertion counter: within a session,
/// ordering is `(created_at, seq)`, so two turns committed in the same
/// wall-clock millisecond keep their insertion order.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS sessions (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            title            TEXT NOT NULL,
            dialogue_type    TEXT NOT NULL,
            status           TEXT NOT NULL DEFAULT 'active',
            message_count    INTEGER NOT NULL DEFAULT 0,
            total_tokens     INTEGER NOT NULL DEFAULT 0,
            last_model       TEXT,
            metadata         TEXT NOT NULL DEFAULT '{}',
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            last_activity_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions(user_id, last_activity_at DESC);

        CREATE TABLE IF NOT EXISTS turns (
            seq        INTEGER PRIMARY KEY AUTOINCREMENT,
            id         TEXT NOT NULL UNIQUE,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            metadata   TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turns_session
            ON turns(session_id, created_at, seq);",
    )?;
    Ok(())
}
