//! Row -> response conversions shared by the handlers.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use orbit_db::models::{
    ChatMessageRow, ChatSessionRow, CommentRow, ConversationRow, MessageRow, ModerationLogRow, NotificationRow,
    UserRow, UserSummaryRow,
};
use orbit_types::api::{
    ChatMessageResponse, ChatSessionResponse, CommentResponse, ConversationResponse, MessageResponse,
    ModerationLogEntry, NotificationResponse, UserProfile, UserSummary,
};
use orbit_types::models::{ChatRole, MessageKind, NotificationKind};

pub fn parse_id(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", raw, e);
        Uuid::default()
    })
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS.SSS" without timezone.
/// Parse as naive UTC.
pub fn parse_time(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .or_else(|_| raw.parse::<DateTime<Utc>>())
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

fn parse_kind<T: FromStr<Err = String>>(raw: &str, fallback: T) -> T {
    raw.parse().unwrap_or_else(|e| {
        warn!("{}", e);
        fallback
    })
}

pub fn summary(row: UserSummaryRow) -> UserSummary {
    UserSummary {
        id: parse_id(&row.id),
        username: row.username,
        full_name: row.full_name,
        profile_image: row.profile_image,
        is_verified: row.is_verified,
    }
}

pub fn user_summary(user: &UserRow) -> UserSummary {
    UserSummary {
        id: parse_id(&user.id),
        username: user.username.clone(),
        full_name: user.full_name.clone(),
        profile_image: user.profile_image.clone(),
        is_verified: user.is_verified,
    }
}

/// Full profile. `is_following` is only set when someone else is looking.
pub fn profile(user: UserRow, followers: &[String], following: &[String], is_following: Option<bool>) -> UserProfile {
    let followers: Vec<Uuid> = followers.iter().map(|id| parse_id(id)).collect();
    let following: Vec<Uuid> = following.iter().map(|id| parse_id(id)).collect();
    UserProfile {
        id: parse_id(&user.id),
        username: user.username,
        full_name: user.full_name,
        email: user.email,
        bio: user.bio,
        profile_image: user.profile_image,
        cover_image: user.cover_image,
        website_url: user.website_url,
        is_verified: user.is_verified,
        followers_count: followers.len(),
        following_count: following.len(),
        followers,
        following,
        is_following,
        created_at: parse_time(&user.created_at),
    }
}

pub fn comment(row: CommentRow) -> CommentResponse {
    CommentResponse {
        id: parse_id(&row.id),
        post_id: parse_id(&row.post_id),
        author: summary(row.author),
        content: row.content,
        created_at: parse_time(&row.created_at),
    }
}

pub fn notification(row: NotificationRow) -> NotificationResponse {
    NotificationResponse {
        id: parse_id(&row.id),
        from: summary(row.from),
        to: parse_id(&row.to_user_id),
        kind: parse_kind(&row.kind, NotificationKind::Follow),
        read: row.read,
        created_at: parse_time(&row.created_at),
    }
}

pub fn message(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_id(&row.id),
        sender_id: parse_id(&row.sender_id),
        receiver_id: parse_id(&row.receiver_id),
        content: row.content,
        message_type: parse_kind(&row.message_type, MessageKind::Text),
        is_read: row.is_read,
        created_at: parse_time(&row.created_at),
    }
}

pub fn conversation(row: ConversationRow) -> ConversationResponse {
    ConversationResponse {
        id: parse_id(&row.id),
        other_user: summary(row.other_user),
        last_message: row.last_message,
        last_message_time: row.last_message_time.as_deref().map(parse_time),
        unread_count: row.unread_count,
        updated_at: parse_time(&row.updated_at),
    }
}

pub fn session(row: ChatSessionRow) -> ChatSessionResponse {
    ChatSessionResponse {
        id: parse_id(&row.id),
        session_name: row.session_name,
        last_message: row.last_message,
        message_count: row.message_count,
        created_at: parse_time(&row.created_at),
        updated_at: parse_time(&row.updated_at),
    }
}

pub fn chat_message(row: ChatMessageRow) -> ChatMessageResponse {
    ChatMessageResponse {
        id: parse_id(&row.id),
        session_id: parse_id(&row.session_id),
        role: parse_kind(&row.role, ChatRole::Assistant),
        content: row.content,
        created_at: parse_time(&row.created_at),
    }
}

pub fn moderation_entry(row: ModerationLogRow) -> ModerationLogEntry {
    ModerationLogEntry {
        id: parse_id(&row.id),
        post_id: parse_id(&row.post_id),
        is_blocked: row.is_blocked,
        reason: row.reason,
        spam_score: row.spam_score,
        inappropriate_score: row.inappropriate_score,
        content: row.content,
        username: row.username,
        created_at: parse_time(&row.created_at),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn sqlite_timestamps_parse_as_utc() {
        let t = parse_time("2024-03-05 14:07:09.250");
        assert_eq!((t.year(), t.month(), t.day()), (2024, 3, 5));
        assert_eq!((t.hour(), t.minute(), t.second()), (14, 7, 9));
        assert_eq!(t.timestamp_subsec_millis(), 250);

        let whole = parse_time("2024-03-05 14:07:09");
        assert_eq!(whole.second(), 9);
    }

    #[test]
    fn corrupt_values_fall_back() {
        assert_eq!(parse_time("yesterday"), DateTime::<Utc>::default());
        assert_eq!(parse_id("not-a-uuid"), Uuid::default());
        assert_eq!(parse_kind("video", MessageKind::Text), MessageKind::Text);
    }
}
