/// Database row types, one per SQLite row shape.
/// Distinct from orbit-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub bio: String,
    pub profile_image: Option<String>,
    pub cover_image: Option<String>,
    pub website_url: Option<String>,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// The author/sender columns joined into most listings.
#[derive(Clone)]
pub struct UserSummaryRow {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub profile_image: Option<String>,
    pub is_verified: bool,
}

/// Fields a profile update may touch. `None` leaves the column alone.
#[derive(Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub website_url: Option<String>,
    pub profile_image: Option<String>,
    pub cover_image: Option<String>,
    pub password_hash: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.full_name.is_none()
            && self.email.is_none()
            && self.bio.is_none()
            && self.website_url.is_none()
            && self.profile_image.is_none()
            && self.cover_image.is_none()
            && self.password_hash.is_none()
    }
}

pub struct FollowToggle {
    pub following: bool,
    /// Set when a follow created a notification.
    pub notification_id: Option<String>,
}

pub struct PostRow {
    pub id: String,
    pub author: UserSummaryRow,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct LikeRow {
    pub post_id: String,
    pub user_id: String,
}

pub struct LikeToggle {
    pub liked: bool,
    /// Set when a like created a notification (never for self-likes).
    pub notification_id: Option<String>,
}

pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author: UserSummaryRow,
    pub content: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub from: UserSummaryRow,
    pub to_user_id: String,
    pub kind: String,
    pub read: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: String,
    pub is_read: bool,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub other_user: UserSummaryRow,
    pub last_message: Option<String>,
    pub last_message_time: Option<String>,
    pub unread_count: i64,
    pub updated_at: String,
}

pub struct ChatSessionRow {
    pub id: String,
    pub user_id: String,
    pub session_name: String,
    pub last_message: Option<String>,
    pub message_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ChatMessageRow {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

pub struct SuggestedUserRow {
    pub user: UserSummaryRow,
    pub mutual_connections: i64,
    pub follower_count: i64,
    pub suggestion_score: f64,
}

pub struct ModerationLogRow {
    pub id: String,
    pub post_id: String,
    pub is_blocked: bool,
    pub reason: String,
    pub spam_score: f64,
    pub inappropriate_score: f64,
    pub content: Option<String>,
    pub username: String,
    pub created_at: String,
}
