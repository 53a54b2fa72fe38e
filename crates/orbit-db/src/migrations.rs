use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Timestamps are stored as UTC text with millisecond precision so that
/// string comparison orders them correctly.
pub const NOW: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            full_name       TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            bio             TEXT NOT NULL DEFAULT '',
            profile_image   TEXT,
            cover_image     TEXT,
            website_url     TEXT,
            is_verified     INTEGER NOT NULL DEFAULT 0,
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE TABLE IF NOT EXISTS followers (
            follower_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            following_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            PRIMARY KEY (follower_id, following_id),
            CHECK (follower_id != following_id)
        );

        CREATE INDEX IF NOT EXISTS idx_followers_following
            ON followers(following_id);

        CREATE TABLE IF NOT EXISTS posts (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content         TEXT,
            image_url       TEXT,
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_posts_user
            ON posts(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_posts_created
            ON posts(created_at);

        CREATE TABLE IF NOT EXISTS likes (
            post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            PRIMARY KEY (post_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_likes_user
            ON likes(user_id);

        CREATE TABLE IF NOT EXISTS comments (
            id              TEXT PRIMARY KEY,
            post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_comments_post
            ON comments(post_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id              TEXT PRIMARY KEY,
            from_user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            to_user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind            TEXT NOT NULL CHECK (kind IN ('follow', 'like')),
            read            INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_to
            ON notifications(to_user_id, created_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            receiver_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content         TEXT NOT NULL,
            message_type    TEXT NOT NULL DEFAULT 'text'
                            CHECK (message_type IN ('text', 'image', 'file')),
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);

        -- One row per unordered user pair, stored with user1_id < user2_id
        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            user1_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            user2_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            last_message_id TEXT REFERENCES messages(id) ON DELETE SET NULL,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            UNIQUE (user1_id, user2_id),
            CHECK (user1_id < user2_id)
        );

        CREATE TABLE IF NOT EXISTS ai_chat_sessions (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            session_name    TEXT NOT NULL DEFAULT 'New Chat',
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_ai_sessions_user
            ON ai_chat_sessions(user_id, updated_at);

        CREATE TABLE IF NOT EXISTS ai_chat_messages (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL REFERENCES ai_chat_sessions(id) ON DELETE CASCADE,
            role            TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_ai_messages_session
            ON ai_chat_messages(session_id, created_at);

        CREATE TABLE IF NOT EXISTS user_interactions (
            user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            target_type         TEXT NOT NULL,
            target_id           TEXT NOT NULL,
            interaction_type    TEXT NOT NULL,
            created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
            PRIMARY KEY (user_id, target_type, target_id, interaction_type)
        );

        CREATE TABLE IF NOT EXISTS content_moderation_logs (
            id                  TEXT PRIMARY KEY,
            post_id             TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            is_blocked          INTEGER NOT NULL,
            reason              TEXT NOT NULL,
            spam_score          REAL NOT NULL,
            inappropriate_score REAL NOT NULL,
            created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
