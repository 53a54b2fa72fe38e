use anyhow::Result;
use rusqlite::{Connection, Row, types::ToSql};
use uuid::Uuid;

use super::{OptionalExt, SUMMARY_COLUMNS, escape_like, summary_from_row};
use crate::Database;
use crate::migrations::NOW;
use crate::models::{FollowToggle, ProfileUpdate, UserRow, UserSummaryRow};

const USER_COLUMNS: &str = "id, username, full_name, email, password, bio, profile_image, \
     cover_image, website_url, is_verified, created_at, updated_at";

impl Database {
    // -- Accounts --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        full_name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, full_name, email, password) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, username, full_name, email, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    /// Apply the non-empty fields of `update`. Returns false when there was
    /// nothing to write or the user does not exist.
    pub fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<bool> {
        let fields: [(&str, &Option<String>); 8] = [
            ("username", &update.username),
            ("full_name", &update.full_name),
            ("email", &update.email),
            ("bio", &update.bio),
            ("website_url", &update.website_url),
            ("profile_image", &update.profile_image),
            ("cover_image", &update.cover_image),
            ("password", &update.password_hash),
        ];

        let mut sets = Vec::new();
        let mut params: Vec<&dyn ToSql> = Vec::new();
        for (column, value) in fields.iter() {
            if let Some(value) = value {
                params.push(value as &dyn ToSql);
                sets.push(format!("{} = ?{}", column, params.len()));
            }
        }
        if sets.is_empty() {
            return Ok(false);
        }

        params.push(&id as &dyn ToSql);
        let sql = format!(
            "UPDATE users SET {}, updated_at = {} WHERE id = ?{} AND is_active = 1",
            sets.join(", "),
            NOW,
            params.len()
        );

        self.with_conn(|conn| Ok(conn.execute(&sql, params.as_slice())? > 0))
    }

    // -- Follow graph --

    /// Returns (follower ids, following ids) for a user.
    pub fn get_follow_ids(&self, user_id: &str) -> Result<(Vec<String>, Vec<String>)> {
        self.with_conn(|conn| {
            let followers = collect_ids(
                conn,
                "SELECT follower_id FROM followers WHERE following_id = ?1 ORDER BY created_at",
                user_id,
            )?;
            let following = collect_ids(
                conn,
                "SELECT following_id FROM followers WHERE follower_id = ?1 ORDER BY created_at",
                user_id,
            )?;
            Ok((followers, following))
        })
    }

    pub fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM followers WHERE follower_id = ?1 AND following_id = ?2",
                    (follower_id, following_id),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Follow if not following, unfollow otherwise. A follow also creates a
    /// `follow` notification for the target, in the same transaction.
    pub fn toggle_follow(&self, follower_id: &str, target_id: &str) -> Result<FollowToggle> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM followers WHERE follower_id = ?1 AND following_id = ?2",
                (follower_id, target_id),
            )?;

            let toggle = if removed > 0 {
                FollowToggle {
                    following: false,
                    notification_id: None,
                }
            } else {
                tx.execute(
                    "INSERT INTO followers (follower_id, following_id) VALUES (?1, ?2)",
                    (follower_id, target_id),
                )?;
                let notification_id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO notifications (id, from_user_id, to_user_id, kind) VALUES (?1, ?2, ?3, 'follow')",
                    (&notification_id, follower_id, target_id),
                )?;
                FollowToggle {
                    following: true,
                    notification_id: Some(notification_id),
                }
            };

            tx.commit()?;
            Ok(toggle)
        })
    }

    // -- Discovery --

    /// Case-insensitive substring search on username and full name.
    /// Username prefix matches sort first.
    pub fn search_users(&self, query: &str, limit: u32) -> Result<Vec<UserSummaryRow>> {
        let escaped = escape_like(query);
        let contains = format!("%{}%", escaped);
        let prefix = format!("{}%", escaped);

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS} FROM users u
                 WHERE (u.username LIKE ?1 ESCAPE '\\' OR u.full_name LIKE ?1 ESCAPE '\\')
                   AND u.is_active = 1
                 ORDER BY CASE WHEN u.username LIKE ?2 ESCAPE '\\' THEN 1 ELSE 2 END, u.full_name
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![contains, prefix, limit], |row| summary_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Random active users that `user_id` does not follow yet.
    pub fn random_unfollowed_users(&self, user_id: &str, limit: u32) -> Result<Vec<UserSummaryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS} FROM users u
                 WHERE u.id != ?1
                   AND u.is_active = 1
                   AND u.id NOT IN (SELECT following_id FROM followers WHERE follower_id = ?1)
                 ORDER BY RANDOM()
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| summary_from_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1 AND is_active = 1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        email: row.get(3)?,
        password: row.get(4)?,
        bio: row.get(5)?,
        profile_image: row.get(6)?,
        cover_image: row.get(7)?,
        website_url: row.get(8)?,
        is_verified: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn collect_ids(conn: &Connection, sql: &str, user_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([user_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn duplicate_username_is_rejected() {
        let db = fixtures::db();
        fixtures::user(&db, "alice");
        let err = db.create_user("other-id", "alice", "Alice Two", "a2@example.com", "hash");
        assert!(err.is_err());
    }

    #[test]
    fn lookups_find_active_users() {
        let db = fixtures::db();
        let id = fixtures::user(&db, "alice");

        assert_eq!(db.get_user_by_id(&id).unwrap().unwrap().username, "alice");
        assert_eq!(db.get_user_by_username("alice").unwrap().unwrap().id, id);
        assert_eq!(db.get_user_by_email("alice@example.com").unwrap().unwrap().id, id);
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn update_profile_touches_only_given_fields() {
        let db = fixtures::db();
        let id = fixtures::user(&db, "alice");

        assert!(!db.update_profile(&id, &ProfileUpdate::default()).unwrap());

        let update = ProfileUpdate {
            bio: Some("hello".into()),
            website_url: Some("https://alice.dev".into()),
            ..Default::default()
        };
        assert!(db.update_profile(&id, &update).unwrap());

        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(user.bio, "hello");
        assert_eq!(user.website_url.as_deref(), Some("https://alice.dev"));
        assert_eq!(user.full_name, "alice Full");
    }

    #[test]
    fn toggling_follow_twice_restores_the_graph() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");

        let first = db.toggle_follow(&alice, &bob).unwrap();
        assert!(first.following);
        assert!(first.notification_id.is_some());
        assert!(db.is_following(&alice, &bob).unwrap());

        let (followers, following) = db.get_follow_ids(&bob).unwrap();
        assert_eq!(followers, vec![alice.clone()]);
        assert!(following.is_empty());

        let second = db.toggle_follow(&alice, &bob).unwrap();
        assert!(!second.following);
        assert!(second.notification_id.is_none());
        assert!(!db.is_following(&alice, &bob).unwrap());
        assert!(db.get_follow_ids(&bob).unwrap().0.is_empty());
    }

    #[test]
    fn search_ranks_username_prefix_first() {
        let db = fixtures::db();
        fixtures::user(&db, "zed_smith");
        fixtures::user(&db, "smith_j");
        fixtures::user(&db, "carol");

        let hits = db.search_users("SMITH", 20).unwrap();
        let names: Vec<_> = hits.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["smith_j", "zed_smith"]);

        // Underscore is literal, not a wildcard
        assert!(db.search_users("d_s", 20).unwrap().iter().all(|u| u.username == "zed_smith"));
    }

    #[test]
    fn random_suggestions_skip_self_and_followed() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let carol = fixtures::user(&db, "carol");
        db.toggle_follow(&alice, &bob).unwrap();

        let suggested = db.random_unfollowed_users(&alice, 10).unwrap();
        let ids: Vec<_> = suggested.iter().map(|u| u.id.clone()).collect();
        assert_eq!(ids, vec![carol]);
    }
}
