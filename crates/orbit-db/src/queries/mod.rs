mod ai_chat;
mod messages;
mod moderation;
mod notifications;
mod posts;
mod recommendations;
mod users;

use anyhow::Result;
use rusqlite::Row;

use crate::models::UserSummaryRow;

/// Columns read by [`summary_from_row`], for a `users` table aliased `u`.
const SUMMARY_COLUMNS: &str = "u.id, u.username, u.full_name, u.profile_image, u.is_verified";

/// Read the five [`SUMMARY_COLUMNS`] starting at column `at`.
fn summary_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<UserSummaryRow> {
    Ok(UserSummaryRow {
        id: row.get(at)?,
        username: row.get(at + 1)?,
        full_name: row.get(at + 2)?,
        profile_image: row.get(at + 3)?,
        is_verified: row.get(at + 4)?,
    })
}

/// `?{start}, ?{start+1}, ...` for an `IN (...)` list of `count` items.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use uuid::Uuid;

    use crate::Database;

    pub fn db() -> Database {
        Database::open_in_memory().expect("in-memory database")
    }

    /// Create an account and return its id.
    pub fn user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(
            &id,
            username,
            &format!("{username} Full"),
            &format!("{username}@example.com"),
            "hash",
        )
        .expect("create user");
        id
    }

    pub fn post(db: &Database, author: &str, content: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_post(&id, author, Some(content), None).expect("create post");
        id
    }
}
