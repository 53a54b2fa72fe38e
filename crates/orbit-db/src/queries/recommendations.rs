use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;

use super::summary_from_row;
use crate::Database;
use crate::migrations::NOW;
use crate::models::{PostRow, SuggestedUserRow};

/// Interest weights for personalized posts.
const FOLLOW_WEIGHT: i64 = 3;
const LIKE_WEIGHT: i64 = 2;
const COMMENT_WEIGHT: i64 = 1;

impl Database {
    /// Posts from authors the user has shown interest in (follows, likes,
    /// comments), boosted when recent or popular. Posts the user already
    /// liked or commented on are left out.
    pub fn personalized_posts(&self, user_id: &str, limit: u32) -> Result<Vec<(PostRow, f64)>> {
        let sql = format!(
            "WITH user_interests AS (
                 SELECT following_id AS interest_user_id, {FOLLOW_WEIGHT} AS weight
                 FROM followers WHERE follower_id = ?1
                 UNION ALL
                 SELECT p.user_id, {LIKE_WEIGHT}
                 FROM likes l JOIN posts p ON l.post_id = p.id WHERE l.user_id = ?1
                 UNION ALL
                 SELECT p.user_id, {COMMENT_WEIGHT}
                 FROM comments c JOIN posts p ON c.post_id = p.id WHERE c.user_id = ?1
             ),
             weighted_interests AS (
                 SELECT interest_user_id, SUM(weight) AS total_weight
                 FROM user_interests GROUP BY interest_user_id
             ),
             like_counts AS (
                 SELECT post_id, COUNT(*) AS n FROM likes GROUP BY post_id
             )
             SELECT p.id,
                    wi.total_weight
                    * CASE
                        WHEN p.created_at > strftime('%Y-%m-%d %H:%M:%f', 'now', '-1 day') THEN 2.0
                        WHEN p.created_at > strftime('%Y-%m-%d %H:%M:%f', 'now', '-3 days') THEN 1.5
                        ELSE 1.0
                      END
                    * CASE
                        WHEN COALESCE(lc.n, 0) > 10 THEN 1.5
                        WHEN COALESCE(lc.n, 0) > 5 THEN 1.2
                        ELSE 1.0
                      END AS score
             FROM posts p
             JOIN weighted_interests wi ON p.user_id = wi.interest_user_id
             LEFT JOIN like_counts lc ON lc.post_id = p.id
             WHERE p.user_id != ?1
               AND p.is_active = 1
               AND p.id NOT IN (
                   SELECT post_id FROM likes WHERE user_id = ?1
                   UNION
                   SELECT post_id FROM comments WHERE user_id = ?1
               )
             ORDER BY score DESC, p.created_at DESC, p.rowid DESC
             LIMIT ?2"
        );

        let scored = self.with_conn(|conn| scored_ids(conn, &sql, rusqlite::params![user_id, limit]))?;
        self.hydrate_scored(scored)
    }

    /// Posts from the last 7 days ranked by likes (x2) and comments (x3)
    /// received in the last 24 hours.
    pub fn trending_posts(&self, limit: u32) -> Result<Vec<(PostRow, f64)>> {
        let sql = "SELECT p.id,
                    ((SELECT COUNT(*) FROM likes l
                      WHERE l.post_id = p.id
                        AND l.created_at > strftime('%Y-%m-%d %H:%M:%f', 'now', '-1 day')) * 2
                   + (SELECT COUNT(*) FROM comments c
                      WHERE c.post_id = p.id
                        AND c.created_at > strftime('%Y-%m-%d %H:%M:%f', 'now', '-1 day')) * 3) * 1.0 AS score
             FROM posts p
             WHERE p.is_active = 1
               AND p.created_at > strftime('%Y-%m-%d %H:%M:%f', 'now', '-7 days')
             ORDER BY score DESC, p.created_at DESC, p.rowid DESC
             LIMIT ?1";

        let scored = self.with_conn(|conn| scored_ids(conn, sql, rusqlite::params![limit]))?;
        self.hydrate_scored(scored)
    }

    /// Friends of friends (3 points per mutual connection) and popular
    /// accounts with more than five followers (0.1 per follower), excluding
    /// the user and everyone they already follow.
    pub fn suggested_users(&self, user_id: &str, limit: u32) -> Result<Vec<SuggestedUserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH my_following AS (
                     SELECT following_id FROM followers WHERE follower_id = ?1
                 ),
                 user_network AS (
                     SELECT f2.following_id AS suggested_user_id, COUNT(*) AS mutual_connections
                     FROM followers f1
                     JOIN followers f2 ON f1.following_id = f2.follower_id
                     WHERE f1.follower_id = ?1
                       AND f2.following_id != ?1
                       AND f2.following_id NOT IN (SELECT following_id FROM my_following)
                     GROUP BY f2.following_id
                 ),
                 popular_users AS (
                     SELECT u.id AS suggested_user_id, COUNT(f.follower_id) AS follower_count
                     FROM users u
                     LEFT JOIN followers f ON u.id = f.following_id
                     WHERE u.id != ?1
                       AND u.is_active = 1
                       AND u.id NOT IN (SELECT following_id FROM my_following)
                     GROUP BY u.id
                     HAVING COUNT(f.follower_id) > 5
                 )
                 SELECT u.id, u.username, u.full_name, u.profile_image, u.is_verified,
                        COALESCE(un.mutual_connections, 0),
                        COALESCE(pu.follower_count, 0),
                        COALESCE(un.mutual_connections, 0) * 3.0 + COALESCE(pu.follower_count, 0) * 0.1 AS score
                 FROM users u
                 LEFT JOIN user_network un ON u.id = un.suggested_user_id
                 LEFT JOIN popular_users pu ON u.id = pu.suggested_user_id
                 WHERE (un.suggested_user_id IS NOT NULL OR pu.suggested_user_id IS NOT NULL)
                   AND u.is_active = 1
                 ORDER BY score DESC, u.username ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    Ok(SuggestedUserRow {
                        user: summary_from_row(row, 0)?,
                        mutual_connections: row.get(5)?,
                        follower_count: row.get(6)?,
                        suggestion_score: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Record (or refresh) an interaction used as a recommendation signal.
    pub fn log_interaction(
        &self,
        user_id: &str,
        target_type: &str,
        target_id: &str,
        interaction_type: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO user_interactions (user_id, target_type, target_id, interaction_type)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (user_id, target_type, target_id, interaction_type)
                     DO UPDATE SET created_at = {NOW}"
                ),
                (user_id, target_type, target_id, interaction_type),
            )?;
            Ok(())
        })
    }

    /// Load the posts behind a scored id list, keeping the score order.
    fn hydrate_scored(&self, scored: Vec<(String, f64)>) -> Result<Vec<(PostRow, f64)>> {
        let ids: Vec<String> = scored.iter().map(|(id, _)| id.clone()).collect();
        let mut posts: HashMap<String, PostRow> = self
            .get_posts_by_ids(&ids)?
            .into_iter()
            .map(|post| (post.id.clone(), post))
            .collect();

        Ok(scored
            .into_iter()
            .filter_map(|(id, score)| posts.remove(&id).map(|post| (post, score)))
            .collect())
    }
}

fn scored_ids(conn: &Connection, sql: &str, params: &[&dyn rusqlite::types::ToSql]) -> Result<Vec<(String, f64)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use crate::queries::fixtures;

    #[test]
    fn follow_outweighs_like_outweighs_comment() {
        let db = fixtures::db();
        let me = fixtures::user(&db, "me");
        let followed = fixtures::user(&db, "followed");
        let liked = fixtures::user(&db, "liked");
        let commented = fixtures::user(&db, "commented");

        db.toggle_follow(&me, &followed).unwrap();

        // Interactions happen on older posts; the fresh ones are what gets recommended.
        let old_liked = fixtures::post(&db, &liked, "old");
        db.toggle_like(&old_liked, &me).unwrap();
        let old_commented = fixtures::post(&db, &commented, "old");
        db.add_comment("c1", &old_commented, &me, "hey").unwrap();

        let from_commented = fixtures::post(&db, &commented, "new c");
        let from_liked = fixtures::post(&db, &liked, "new l");
        let from_followed = fixtures::post(&db, &followed, "new f");

        let recommended = db.personalized_posts(&me, 10).unwrap();
        let ids: Vec<_> = recommended.iter().map(|(p, _)| p.id.clone()).collect();
        assert_eq!(ids, vec![from_followed, from_liked, from_commented]);

        // All fresh, so each weight is doubled by the recency boost
        let scores: Vec<_> = recommended.iter().map(|(_, s)| *s).collect();
        assert_eq!(scores, vec![6.0, 4.0, 2.0]);
    }

    #[test]
    fn own_and_already_seen_posts_are_excluded() {
        let db = fixtures::db();
        let me = fixtures::user(&db, "me");
        let friend = fixtures::user(&db, "friend");
        db.toggle_follow(&me, &friend).unwrap();
        fixtures::post(&db, &me, "mine");
        let seen = fixtures::post(&db, &friend, "seen");
        db.toggle_like(&seen, &me).unwrap();

        assert!(db.personalized_posts(&me, 10).unwrap().is_empty());
    }

    #[test]
    fn trending_ranks_comments_above_likes() {
        let db = fixtures::db();
        let a = fixtures::user(&db, "a");
        let b = fixtures::user(&db, "b");
        let liked_post = fixtures::post(&db, &a, "liked");
        let commented_post = fixtures::post(&db, &a, "commented");
        let quiet = fixtures::post(&db, &a, "quiet");

        db.toggle_like(&liked_post, &b).unwrap();
        db.add_comment("c1", &commented_post, &b, "wow").unwrap();

        let trending = db.trending_posts(10).unwrap();
        let ranked: Vec<_> = trending.iter().map(|(p, s)| (p.id.clone(), *s)).collect();
        assert_eq!(
            ranked,
            vec![(commented_post, 3.0), (liked_post, 2.0), (quiet, 0.0)]
        );
    }

    #[test]
    fn suggestions_come_from_friends_of_friends() {
        let db = fixtures::db();
        let me = fixtures::user(&db, "me");
        let friend = fixtures::user(&db, "friend");
        let fof = fixtures::user(&db, "fof");
        let stranger = fixtures::user(&db, "stranger");

        db.toggle_follow(&me, &friend).unwrap();
        db.toggle_follow(&friend, &fof).unwrap();
        db.toggle_follow(&friend, &me).unwrap();
        db.toggle_follow(&stranger, &friend).unwrap();

        let suggested = db.suggested_users(&me, 5).unwrap();
        assert_eq!(suggested.len(), 1);
        assert_eq!(suggested[0].user.id, fof);
        assert_eq!(suggested[0].mutual_connections, 1);
        assert_eq!(suggested[0].suggestion_score, 3.0);
    }

    #[test]
    fn interactions_upsert() {
        let db = fixtures::db();
        let me = fixtures::user(&db, "me");
        db.log_interaction(&me, "post", "p1", "view").unwrap();
        db.log_interaction(&me, "post", "p1", "view").unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM user_interactions", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
