//! Persistent store for the Envoy runtime — a single SQLite database
//! holding sessions, transcripts, conversation state, the tool catalog,
//! integrations, scheduled tasks, and task runs.
//!
//! One connection behind a `tokio::sync::Mutex`; all writes are
//! serialized through it. Schema initialization is idempotent and
//! forward-only column migrations are attempted on every open, failing
//! silently when already applied.

pub mod model;

mod catalog;
mod sessions;
mod tasks;

use std::path::Path;

use rusqlite::Connection;
use tokio::sync::Mutex;

use envoy_domain::error::{Error, Result};

/// Map a rusqlite error into the shared error type.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Db(e.to_string())
}

pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_err)?;

        init_schema(&conn).map_err(db_err)?;
        apply_migrations(&conn);

        tracing::info!(path = %path.display(), "store opened");

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db_err)?;
        init_schema(&conn).map_err(db_err)?;
        apply_migrations(&conn);
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id                 TEXT PRIMARY KEY,
            title              TEXT NOT NULL DEFAULT 'New chat',
            conversation_state TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS integrations (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL UNIQUE,
            description   TEXT NOT NULL DEFAULT '',
            config_schema TEXT NOT NULL DEFAULT '[]',
            enabled       INTEGER NOT NULL DEFAULT 1,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS custom_tools (
            id             TEXT PRIMARY KEY,
            name           TEXT NOT NULL UNIQUE,
            description    TEXT NOT NULL DEFAULT '',
            input_schema   TEXT NOT NULL DEFAULT '{"type":"object"}',
            code           TEXT NOT NULL,
            enabled        INTEGER NOT NULL DEFAULT 1,
            integration_id TEXT REFERENCES integrations(id) ON DELETE CASCADE,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            cron        TEXT NOT NULL,
            enabled     INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS task_runs (
            id          TEXT PRIMARY KEY,
            task_id     TEXT NOT NULL REFERENCES scheduled_tasks(id) ON DELETE CASCADE,
            status      TEXT NOT NULL,
            result      TEXT,
            output      TEXT,
            started_at  TEXT NOT NULL,
            finished_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);
        CREATE INDEX IF NOT EXISTS idx_task_runs_task ON task_runs(task_id);
        "#,
    )
}

/// Forward-only migrations: additive column adds for databases created by
/// earlier revisions. Failures mean the column already exists.
fn apply_migrations(conn: &Connection) {
    let _ = conn.execute("ALTER TABLE sessions ADD COLUMN conversation_state TEXT", []);
    let _ = conn.execute(
        "ALTER TABLE custom_tools ADD COLUMN integration_id TEXT REFERENCES integrations(id)",
        [],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("envoy.db");

        {
            let store = Store::open(&path).unwrap();
            store.create_session(None).await.unwrap();
        }
        // Re-opening runs schema init + migrations against existing tables.
        let store = Store::open(&path).unwrap();
        assert_eq!(store.list_sessions().await.unwrap().len(), 1);
    }
}
