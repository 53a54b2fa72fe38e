use anyhow::Result;
use rusqlite::Row;
use uuid::Uuid;

use super::summary_from_row;
use crate::Database;
use crate::migrations::NOW;
use crate::models::{ConversationRow, MessageRow};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, message_type, is_read, created_at";

impl Database {
    /// Store a direct message and upsert the conversation for the pair in
    /// one transaction.
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        message_type: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, message_type) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, sender_id, receiver_id, content, message_type),
            )?;

            let upsert = format!(
                "INSERT INTO conversations (id, user1_id, user2_id, last_message_id)
                 VALUES (?1, min(?2, ?3), max(?2, ?3), ?4)
                 ON CONFLICT (user1_id, user2_id)
                 DO UPDATE SET last_message_id = excluded.last_message_id, updated_at = {NOW}"
            );
            tx.execute(
                &upsert,
                (Uuid::new_v4().to_string(), sender_id, receiver_id, id),
            )?;

            let row = tx.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [id],
                message_from_row,
            )?;

            tx.commit()?;
            Ok(row)
        })
    }

    /// One page of the conversation between two users, in chronological
    /// order. Page 0 holds the newest `limit` messages.
    pub fn get_conversation(&self, user_a: &str, user_b: &str, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![user_a, user_b, limit, offset], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Conversations involving `user_id`, most recently active first.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.updated_at, m.content, m.created_at,
                        (SELECT COUNT(*) FROM messages x
                         WHERE x.receiver_id = ?1 AND x.sender_id = u.id AND x.is_read = 0),
                        u.id, u.username, u.full_name, u.profile_image, u.is_verified
                 FROM conversations c
                 JOIN users u ON u.id = CASE WHEN c.user1_id = ?1 THEN c.user2_id ELSE c.user1_id END
                 LEFT JOIN messages m ON m.id = c.last_message_id
                 WHERE c.user1_id = ?1 OR c.user2_id = ?1
                 ORDER BY c.updated_at DESC, c.rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        updated_at: row.get(1)?,
                        last_message: row.get(2)?,
                        last_message_time: row.get(3)?,
                        unread_count: row.get(4)?,
                        other_user: summary_from_row(row, 5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark everything `sender_id` sent to `receiver_id` as read.
    pub fn mark_messages_read(&self, sender_id: &str, receiver_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                (sender_id, receiver_id),
            )?;
            Ok(updated)
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        message_type: row.get(4)?,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::fixtures;

    #[test]
    fn one_conversation_per_unordered_pair() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");

        db.insert_message("m1", &alice, &bob, "hi bob", "text").unwrap();
        db.insert_message("m2", &bob, &alice, "hi alice", "text").unwrap();
        db.insert_message("m3", &alice, &bob, "how are you", "text").unwrap();

        let mine = db.list_conversations(&alice).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].other_user.username, "bob");
        assert_eq!(mine[0].last_message.as_deref(), Some("how are you"));
        assert_eq!(mine[0].unread_count, 1);

        let theirs = db.list_conversations(&bob).unwrap();
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].id, mine[0].id);
        assert_eq!(theirs[0].other_user.username, "alice");
        assert_eq!(theirs[0].unread_count, 2);
    }

    #[test]
    fn conversation_pages_are_chronological() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let carol = fixtures::user(&db, "carol");

        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            db.insert_message(&format!("m{i}"), &alice, &bob, text, "text").unwrap();
        }
        db.insert_message("other", &carol, &bob, "unrelated", "text").unwrap();

        let all: Vec<_> = db
            .get_conversation(&bob, &alice, 50, 0)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(all, vec!["one", "two", "three"]);

        let newest: Vec<_> = db
            .get_conversation(&alice, &bob, 2, 0)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(newest, vec!["two", "three"]);
    }

    #[test]
    fn mark_read_only_touches_one_direction() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        db.insert_message("m1", &alice, &bob, "to bob", "text").unwrap();
        db.insert_message("m2", &bob, &alice, "to alice", "image").unwrap();

        assert_eq!(db.mark_messages_read(&alice, &bob).unwrap(), 1);

        let messages = db.get_conversation(&alice, &bob, 50, 0).unwrap();
        let to_bob = messages.iter().find(|m| m.id == "m1").unwrap();
        let to_alice = messages.iter().find(|m| m.id == "m2").unwrap();
        assert!(to_bob.is_read);
        assert!(!to_alice.is_read);
        assert_eq!(to_alice.message_type, "image");
    }

    #[test]
    fn invalid_message_type_is_rejected() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        assert!(db.insert_message("m1", &alice, &bob, "x", "video").is_err());
        assert!(db.list_conversations(&alice).unwrap().is_empty());
    }
}
