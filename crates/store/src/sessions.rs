//! Session rows, transcript rows, and the authoritative conversation state.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use envoy_domain::error::Result;
use envoy_domain::tool::Message;

use crate::model::{MessageRow, SessionRow};
use crate::{db_err, Store};

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: parse_ts(row.get(2)?),
        updated_at: parse_ts(row.get(3)?),
    })
}

impl Store {
    /// Create a session. Uses the given id if provided (implicit creation
    /// from a chat request), otherwise mints a fresh UUID.
    pub async fn create_session(&self, id: Option<String>) -> Result<SessionRow> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = Utc::now();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, 'New chat', ?2, ?3)",
            params![id, now.to_rfc3339(), now.to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(SessionRow { id, title: "New chat".into(), created_at: now, updated_at: now })
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, title, created_at, updated_at FROM sessions WHERE id = ?1",
            params![id],
            session_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, created_at, updated_at FROM sessions ORDER BY updated_at DESC",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], session_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Delete a session; its transcript rows cascade. Returns whether a
    /// row was removed.
    pub async fn delete_session(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let n = conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(n > 0)
    }

    pub async fn touch_session(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET updated_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Auto-title a session from its first user message. Only applies
    /// while the title is still the default.
    pub async fn maybe_set_title(&self, id: &str, first_user_message: &str) -> Result<()> {
        let title = truncate_title(first_user_message);
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET title = ?2 WHERE id = ?1 AND title = 'New chat'",
            params![id, title],
        )
        .map_err(db_err)?;
        Ok(())
    }

    // ── Transcript (UI history only) ──────────────────────────────────

    pub async fn append_message(&self, session_id: &str, role: &str, content: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role, content, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, role, content, created_at
                 FROM messages WHERE session_id = ?1 ORDER BY id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(MessageRow {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: row.get(2)?,
                    content: row.get(3)?,
                    created_at: parse_ts(row.get(4)?),
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ── Conversation state (authoritative model replay log) ───────────

    /// Load the structured message history for a session. A missing row,
    /// a missing column value, or an unparseable blob all yield an empty
    /// history.
    pub async fn get_conversation_state(&self, session_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.lock().await;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT conversation_state FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let Some(Some(raw)) = raw else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                tracing::warn!(
                    session_id = session_id,
                    error = %e,
                    "unparseable conversation state, starting fresh"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Persist the full structured history in one write — the state on
    /// disk always reflects a completed turn, never a partial one.
    pub async fn set_conversation_state(
        &self,
        session_id: &str,
        messages: &[Message],
    ) -> Result<()> {
        let blob = serde_json::to_string(messages)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET conversation_state = ?2, updated_at = ?3 WHERE id = ?1",
            params![session_id, blob, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

fn truncate_title(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= 40 {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(40).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoy_domain::tool::{ContentPart, MessageContent, Role};

    #[tokio::test]
    async fn session_lifecycle_and_cascade() {
        let store = Store::open_in_memory().unwrap();
        let session = store.create_session(None).await.unwrap();
        assert_eq!(session.title, "New chat");

        store.append_message(&session.id, "user", "hi").await.unwrap();
        store.append_message(&session.id, "assistant", "hello").await.unwrap();
        assert_eq!(store.list_messages(&session.id).await.unwrap().len(), 2);

        assert!(store.delete_session(&session.id).await.unwrap());
        assert!(store.get_session(&session.id).await.unwrap().is_none());
        // Transcript rows cascade with the session.
        assert!(store.list_messages(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn title_set_once_and_truncated() {
        let store = Store::open_in_memory().unwrap();
        let session = store.create_session(None).await.unwrap();

        let long = "x".repeat(80);
        store.maybe_set_title(&session.id, &long).await.unwrap();
        let row = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(row.title.chars().count(), 41);
        assert!(row.title.ends_with('…'));

        // A later message must not overwrite the title.
        store.maybe_set_title(&session.id, "second message").await.unwrap();
        let row = store.get_session(&session.id).await.unwrap().unwrap();
        assert!(row.title.starts_with('x'));
    }

    #[tokio::test]
    async fn conversation_state_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let session = store.create_session(None).await.unwrap();

        assert!(store.get_conversation_state(&session.id).await.unwrap().is_empty());

        let messages = vec![
            Message::user("list my files"),
            Message {
                role: Role::Assistant,
                content: MessageContent::Parts(vec![
                    ContentPart::Text { text: "looking".into() },
                    ContentPart::ToolUse {
                        id: "call_1".into(),
                        name: "list_dir".into(),
                        input: serde_json::json!({"path": "."}),
                    },
                ]),
            },
            Message::tool_result("call_1", "list_dir", "[]"),
            Message::assistant("you have no files"),
        ];
        store.set_conversation_state(&session.id, &messages).await.unwrap();

        let back = store.get_conversation_state(&session.id).await.unwrap();
        assert_eq!(back.len(), 4);
        match &back[1].content {
            MessageContent::Parts(parts) => {
                assert!(matches!(&parts[1], ContentPart::ToolUse { id, .. } if id == "call_1"));
            }
            _ => panic!("expected parts"),
        }
    }

    #[tokio::test]
    async fn unknown_session_state_is_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_conversation_state("nope").await.unwrap().is_empty());
    }
}
