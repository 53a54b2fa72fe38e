use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, types::ToSql};
use uuid::Uuid;

use super::{OptionalExt, placeholders, summary_from_row};
use crate::Database;
use crate::migrations::NOW;
use crate::models::{CommentRow, LikeRow, LikeToggle, PostRow};

/// Post columns with author and counts; every post listing starts from this.
const POST_SELECT: &str = "SELECT p.id, p.content, p.image_url, p.created_at, p.updated_at,
        u.id, u.username, u.full_name, u.profile_image, u.is_verified,
        (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id),
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id)
     FROM posts p
     JOIN users u ON p.user_id = u.id";

impl Database {
    pub fn create_post(
        &self,
        id: &str,
        user_id: &str,
        content: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, user_id, content, image_url) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, user_id, content, image_url],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} WHERE p.id = ?1 AND p.is_active = 1");
            let row = conn.query_row(&sql, [id], post_from_row).optional()?;
            Ok(row)
        })
    }

    /// Fetch several posts at once. Order of the result is unspecified.
    pub fn get_posts_by_ids(&self, ids: &[String]) -> Result<Vec<PostRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "{POST_SELECT} WHERE p.is_active = 1 AND p.id IN ({})",
            placeholders(1, ids.len())
        );
        let params: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
        self.with_conn(|conn| query_posts(conn, &sql, &params))
    }

    /// Every active post, newest first.
    pub fn list_all_posts(&self, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        let sql = format!(
            "{POST_SELECT} WHERE p.is_active = 1
             ORDER BY p.created_at DESC, p.rowid DESC
             LIMIT ?1 OFFSET ?2"
        );
        self.with_conn(|conn| query_posts(conn, &sql, rusqlite::params![limit, offset]))
    }

    /// Posts by users that `user_id` follows, newest first.
    pub fn list_following_posts(&self, user_id: &str, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        let sql = format!(
            "{POST_SELECT}
             JOIN followers f ON p.user_id = f.following_id
             WHERE f.follower_id = ?1 AND p.is_active = 1
             ORDER BY p.created_at DESC, p.rowid DESC
             LIMIT ?2 OFFSET ?3"
        );
        self.with_conn(|conn| query_posts(conn, &sql, rusqlite::params![user_id, limit, offset]))
    }

    /// Posts written by `user_id`, newest first.
    pub fn list_user_posts(&self, user_id: &str, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        let sql = format!(
            "{POST_SELECT}
             WHERE p.user_id = ?1 AND p.is_active = 1
             ORDER BY p.created_at DESC, p.rowid DESC
             LIMIT ?2 OFFSET ?3"
        );
        self.with_conn(|conn| query_posts(conn, &sql, rusqlite::params![user_id, limit, offset]))
    }

    /// Posts `user_id` has liked, most recently liked first.
    pub fn list_liked_posts(&self, user_id: &str) -> Result<Vec<PostRow>> {
        let sql = format!(
            "{POST_SELECT}
             JOIN likes lk ON lk.post_id = p.id
             WHERE lk.user_id = ?1 AND p.is_active = 1
             ORDER BY lk.created_at DESC, lk.rowid DESC"
        );
        self.with_conn(|conn| query_posts(conn, &sql, rusqlite::params![user_id]))
    }

    /// Soft delete. Returns false when the post was already gone.
    pub fn soft_delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE posts SET is_active = 0, updated_at = {NOW} WHERE id = ?1 AND is_active = 1"
            );
            Ok(conn.execute(&sql, [id])? > 0)
        })
    }

    // -- Likes --

    /// Like if not liked, unlike otherwise. Liking someone else's post also
    /// creates a `like` notification for its author, in the same transaction.
    pub fn toggle_like(&self, post_id: &str, user_id: &str) -> Result<LikeToggle> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let author_id: String = tx
                .query_row(
                    "SELECT user_id FROM posts WHERE id = ?1 AND is_active = 1",
                    [post_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| anyhow!("Post not found: {}", post_id))?;

            let removed = tx.execute(
                "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
                (post_id, user_id),
            )?;

            let toggle = if removed > 0 {
                LikeToggle {
                    liked: false,
                    notification_id: None,
                }
            } else {
                tx.execute(
                    "INSERT INTO likes (post_id, user_id) VALUES (?1, ?2)",
                    (post_id, user_id),
                )?;

                let notification_id = if author_id != user_id {
                    let id = Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO notifications (id, from_user_id, to_user_id, kind) VALUES (?1, ?2, ?3, 'like')",
                        (&id, user_id, &author_id),
                    )?;
                    Some(id)
                } else {
                    None
                };

                LikeToggle {
                    liked: true,
                    notification_id,
                }
            };

            tx.commit()?;
            Ok(toggle)
        })
    }

    /// Batch-fetch likes for a set of post IDs, oldest first.
    pub fn get_likes_for_posts(&self, post_ids: &[String]) -> Result<Vec<LikeRow>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT post_id, user_id FROM likes WHERE post_id IN ({}) ORDER BY created_at, rowid",
                placeholders(1, post_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn ToSql> = post_ids.iter().map(|id| id as &dyn ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(LikeRow {
                        post_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Comments --

    pub fn add_comment(&self, id: &str, post_id: &str, user_id: &str, content: &str) -> Result<CommentRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, user_id, content) VALUES (?1, ?2, ?3, ?4)",
                (id, post_id, user_id, content),
            )?;
            conn.query_row(
                "SELECT c.id, c.post_id, c.content, c.created_at,
                        u.id, u.username, u.full_name, u.profile_image, u.is_verified
                 FROM comments c JOIN users u ON c.user_id = u.id
                 WHERE c.id = ?1",
                [id],
                comment_from_row,
            )
            .map_err(Into::into)
        })
    }

    /// Batch-fetch comments for a set of post IDs, in chronological order.
    pub fn get_comments_for_posts(&self, post_ids: &[String]) -> Result<Vec<CommentRow>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.id, c.post_id, c.content, c.created_at,
                        u.id, u.username, u.full_name, u.profile_image, u.is_verified
                 FROM comments c JOIN users u ON c.user_id = u.id
                 WHERE c.post_id IN ({})
                 ORDER BY c.created_at ASC, c.rowid ASC",
                placeholders(1, post_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn ToSql> = post_ids.iter().map(|id| id as &dyn ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_posts(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<PostRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, post_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        content: row.get(1)?,
        image_url: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        author: summary_from_row(row, 5)?,
        likes_count: row.get(10)?,
        comments_count: row.get(11)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
        author: summary_from_row(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn toggling_like_twice_restores_the_count() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let post = fixtures::post(&db, &alice, "hello");

        let before = db.get_post(&post).unwrap().unwrap().likes_count;

        let liked = db.toggle_like(&post, &bob).unwrap();
        assert!(liked.liked);
        assert!(liked.notification_id.is_some());
        assert_eq!(db.get_post(&post).unwrap().unwrap().likes_count, before + 1);

        let unliked = db.toggle_like(&post, &bob).unwrap();
        assert!(!unliked.liked);
        assert_eq!(db.get_post(&post).unwrap().unwrap().likes_count, before);
    }

    #[test]
    fn self_like_creates_no_notification() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let post = fixtures::post(&db, &alice, "mine");

        let toggle = db.toggle_like(&post, &alice).unwrap();
        assert!(toggle.liked);
        assert!(toggle.notification_id.is_none());
    }

    #[test]
    fn liking_a_missing_post_fails() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        assert!(db.toggle_like("no-such-post", &alice).is_err());
    }

    #[test]
    fn feeds_are_newest_first_and_filtered() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let carol = fixtures::user(&db, "carol");

        let first = fixtures::post(&db, &bob, "first");
        let second = fixtures::post(&db, &carol, "second");
        let third = fixtures::post(&db, &bob, "third");

        let all: Vec<_> = db.list_all_posts(20, 0).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(all, vec![third.clone(), second.clone(), first.clone()]);

        let page: Vec<_> = db.list_all_posts(1, 1).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(page, vec![second.clone()]);

        db.toggle_follow(&alice, &bob).unwrap();
        let following: Vec<_> = db
            .list_following_posts(&alice, 20, 0)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(following, vec![third.clone(), first.clone()]);

        let carols: Vec<_> = db.list_user_posts(&carol, 20, 0).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(carols, vec![second]);
    }

    #[test]
    fn deleted_posts_disappear_everywhere() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let post = fixtures::post(&db, &bob, "soon gone");
        db.toggle_follow(&alice, &bob).unwrap();
        db.toggle_like(&post, &alice).unwrap();

        assert!(db.soft_delete_post(&post).unwrap());
        assert!(!db.soft_delete_post(&post).unwrap());

        assert!(db.get_post(&post).unwrap().is_none());
        assert!(db.list_all_posts(20, 0).unwrap().is_empty());
        assert!(db.list_following_posts(&alice, 20, 0).unwrap().is_empty());
        assert!(db.list_user_posts(&bob, 20, 0).unwrap().is_empty());
        assert!(db.list_liked_posts(&alice).unwrap().is_empty());
    }

    #[test]
    fn comments_and_likes_batch_by_post() {
        let db = fixtures::db();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let p1 = fixtures::post(&db, &alice, "one");
        let p2 = fixtures::post(&db, &alice, "two");

        db.add_comment("c1", &p1, &bob, "nice").unwrap();
        let c2 = db.add_comment("c2", &p1, &alice, "thanks").unwrap();
        assert_eq!(c2.author.username, "alice");
        db.toggle_like(&p2, &bob).unwrap();

        let ids = vec![p1.clone(), p2.clone()];
        let comments = db.get_comments_for_posts(&ids).unwrap();
        let texts: Vec<_> = comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(texts, vec!["nice", "thanks"]);

        let likes = db.get_likes_for_posts(&ids).unwrap();
        assert_eq!(likes.len(), 1);
        assert_eq!(likes[0].post_id, p2);
        assert_eq!(likes[0].user_id, bob);

        assert_eq!(db.get_post(&p1).unwrap().unwrap().comments_count, 2);
        assert_eq!(db.list_liked_posts(&bob).unwrap()[0].id, p2);
    }
}
