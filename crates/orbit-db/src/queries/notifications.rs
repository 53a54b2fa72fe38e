use anyhow::Result;
use rusqlite::Row;

use super::{OptionalExt, SUMMARY_COLUMNS, summary_from_row};
use crate::Database;
use crate::models::NotificationRow;

impl Database {
    /// Notifications addressed to `user_id`, newest first, with the sender card.
    pub fn list_notifications(&self, user_id: &str) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT n.id, n.to_user_id, n.kind, n.read, n.created_at, {SUMMARY_COLUMNS}
                 FROM notifications n
                 JOIN users u ON n.from_user_id = u.id
                 WHERE n.to_user_id = ?1
                 ORDER BY n.created_at DESC, n.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_notification(&self, id: &str) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT n.id, n.to_user_id, n.kind, n.read, n.created_at, {SUMMARY_COLUMNS}
                 FROM notifications n
                 JOIN users u ON n.from_user_id = u.id
                 WHERE n.id = ?1"
            );
            let row = conn.query_row(&sql, [id], notification_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn mark_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET read = 1 WHERE to_user_id = ?1 AND read = 0",
                [user_id],
            )?;
            Ok(updated)
        })
    }

    pub fn delete_notifications(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM notifications WHERE to_user_id = ?1", [user_id])?;
            Ok(deleted)
        })
    }
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        to_user_id: row.get(1)?,
        kind: row.get(2)?,
        read: row.get(3)?,
        created_at: row.get(4)?,
        from: summary_from_row(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::fixtures;

    #[test]
    fn follow_and_like_produce_notifications() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let post = fixtures::post(&db, &bob, "hi");

        db.toggle_follow(&alice, &bob).unwrap();
        let like = db.toggle_like(&post, &alice).unwrap();

        let list = db.list_notifications(&bob).unwrap();
        let kinds: Vec<_> = list.iter().map(|n| n.kind.as_str()).collect();
        assert_eq!(kinds, vec!["like", "follow"]);
        assert!(list.iter().all(|n| n.from.username == "alice" && !n.read));

        let single = db
            .get_notification(like.notification_id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(single.to_user_id, bob);

        assert!(db.list_notifications(&alice).unwrap().is_empty());
    }

    #[test]
    fn mark_read_then_delete() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        db.toggle_follow(&alice, &bob).unwrap();

        assert_eq!(db.mark_notifications_read(&bob).unwrap(), 1);
        assert!(db.list_notifications(&bob).unwrap()[0].read);
        assert_eq!(db.mark_notifications_read(&bob).unwrap(), 0);

        assert_eq!(db.delete_notifications(&bob).unwrap(), 1);
        assert!(db.list_notifications(&bob).unwrap().is_empty());
    }
}
