use anyhow::Result;

use crate::Database;
use crate::models::ModerationLogRow;

impl Database {
    pub fn insert_moderation_log(
        &self,
        id: &str,
        post_id: &str,
        is_blocked: bool,
        reason: &str,
        spam_score: f64,
        inappropriate_score: f64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO content_moderation_logs (id, post_id, is_blocked, reason, spam_score, inappropriate_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, post_id, is_blocked, reason, spam_score, inappropriate_score],
            )?;
            Ok(())
        })
    }

    /// Latest moderation decisions with the post text and its author.
    pub fn moderation_history(&self, limit: u32) -> Result<Vec<ModerationLogRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cml.id, cml.post_id, cml.is_blocked, cml.reason, cml.spam_score,
                        cml.inappropriate_score, p.content, u.username, cml.created_at
                 FROM content_moderation_logs cml
                 JOIN posts p ON cml.post_id = p.id
                 JOIN users u ON p.user_id = u.id
                 ORDER BY cml.created_at DESC, cml.rowid DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(ModerationLogRow {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        is_blocked: row.get(2)?,
                        reason: row.get(3)?,
                        spam_score: row.get(4)?,
                        inappropriate_score: row.get(5)?,
                        content: row.get(6)?,
                        username: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::fixtures;

    #[test]
    fn history_joins_post_and_author() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let post = fixtures::post(&db, &alice, "buy now, click here");

        db.insert_moderation_log("l1", &post, true, "spam", 0.4, 0.0).unwrap();
        db.insert_moderation_log("l2", &post, false, "", 0.0, 0.0).unwrap();

        let history = db.moderation_history(50).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, "l2");
        assert_eq!(history[1].username, "alice");
        assert!(history[1].is_blocked);
        assert_eq!(history[1].content.as_deref(), Some("buy now, click here"));

        assert_eq!(db.moderation_history(1).unwrap().len(), 1);
    }

    #[test]
    fn unknown_post_is_rejected() {
        let db = fixtures::db();
        assert!(db.insert_moderation_log("l1", "missing", false, "", 0.0, 0.0).is_err());
    }
}
