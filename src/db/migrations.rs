use anyhow::Context;
use rusqlite::Connection;

// Schema is embedded rather than loaded from disk so that :memory:
// databases in tests get the full schema with no filesystem dependency.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    start_time TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL DEFAULT 60,
    subject TEXT NOT NULL DEFAULT '',
    recurrence_rule TEXT,
    external_event_id TEXT,
    status TEXT NOT NULL DEFAULT 'scheduled',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_appointments_owner_start
    ON appointments (owner_id, start_time);

CREATE TABLE IF NOT EXISTS tokens (
    owner_id TEXT PRIMARY KEY,
    token_blob TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(SCHEMA)
        .context("failed to apply database schema")?;
    Ok(())
}
