use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::migrations::NOW;
use crate::models::{ChatMessageRow, ChatSessionRow};

const SESSION_SELECT: &str = "SELECT s.id, s.user_id, s.session_name, s.created_at, s.updated_at,
        (SELECT content FROM ai_chat_messages m WHERE m.session_id = s.id
         ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1),
        (SELECT COUNT(*) FROM ai_chat_messages m WHERE m.session_id = s.id)
     FROM ai_chat_sessions s";

const MESSAGE_COLUMNS: &str = "id, session_id, role, content, created_at";

impl Database {
    pub fn create_session(&self, id: &str, user_id: &str, session_name: &str) -> Result<ChatSessionRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ai_chat_sessions (id, user_id, session_name) VALUES (?1, ?2, ?3)",
                (id, user_id, session_name),
            )?;
            query_session(conn, id)?.ok_or_else(|| anyhow::anyhow!("Session vanished after insert: {}", id))
        })
    }

    /// Sessions of `user_id`, most recently updated first.
    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSessionRow>> {
        self.with_conn(|conn| {
            let sql = format!("{SESSION_SELECT} WHERE s.user_id = ?1 ORDER BY s.updated_at DESC, s.rowid DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], session_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_session(&self, id: &str) -> Result<Option<ChatSessionRow>> {
        self.with_conn(|conn| query_session(conn, id))
    }

    /// Append a message and bump the session's `updated_at`, atomically.
    pub fn add_chat_message(&self, id: &str, session_id: &str, role: &str, content: &str) -> Result<ChatMessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO ai_chat_messages (id, session_id, role, content) VALUES (?1, ?2, ?3, ?4)",
                (id, session_id, role, content),
            )?;
            tx.execute(
                &format!("UPDATE ai_chat_sessions SET updated_at = {NOW} WHERE id = ?1"),
                [session_id],
            )?;

            let row = tx.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM ai_chat_messages WHERE id = ?1"),
                [id],
                chat_message_from_row,
            )?;

            tx.commit()?;
            Ok(row)
        })
    }

    /// Messages of a session in chronological order.
    pub fn get_session_messages(&self, session_id: &str, limit: u32, offset: u32) -> Result<Vec<ChatMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM ai_chat_messages
                 WHERE session_id = ?1
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![session_id, limit, offset], chat_message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The newest `count` messages of a session, in chronological order.
    pub fn recent_session_messages(&self, session_id: &str, count: u32) -> Result<Vec<ChatMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM ai_chat_messages
                 WHERE session_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![session_id, count], chat_message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Rename a session owned by `user_id`. `None` if there is no such session.
    pub fn rename_session(&self, id: &str, user_id: &str, session_name: &str) -> Result<Option<ChatSessionRow>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                &format!(
                    "UPDATE ai_chat_sessions SET session_name = ?1, updated_at = {NOW} WHERE id = ?2 AND user_id = ?3"
                ),
                (session_name, id, user_id),
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_session(conn, id)
        })
    }

    /// Delete a session owned by `user_id` together with its messages.
    pub fn delete_session(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM ai_chat_sessions WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(deleted > 0)
        })
    }
}

fn query_session(conn: &Connection, id: &str) -> Result<Option<ChatSessionRow>> {
    let sql = format!("{SESSION_SELECT} WHERE s.id = ?1");
    conn.query_row(&sql, [id], session_from_row).optional()
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSessionRow> {
    Ok(ChatSessionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_name: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        last_message: row.get(5)?,
        message_count: row.get(6)?,
    })
}

fn chat_message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessageRow> {
    Ok(ChatMessageRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}
