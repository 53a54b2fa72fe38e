use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{MessageResponse, NotificationResponse, UserSummary};

/// Events sent over the socket channel, as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid, username: String },

    /// A direct message addressed to the receiving user
    NewMessage {
        message: MessageResponse,
        sender: UserSummary,
    },

    /// Something changed in the post feed; clients refetch
    FeedUpdate {
        post_id: Uuid,
        user_id: Uuid,
        action: FeedAction,
    },

    /// A follow or like notification for the receiving user
    Notification(NotificationResponse),

    /// The peer started typing to the receiving user
    UserTyping { user_id: Uuid, username: String },

    /// The peer stopped typing
    UserStoppedTyping { user_id: Uuid },

    /// A user came online or went offline
    UserStatusChange { user_id: Uuid, status: PresenceStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedAction {
    Created,
    Liked,
    Unliked,
    Commented,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Commands sent FROM client TO server over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Tell `receiver_id` we are typing to them
    TypingStart { receiver_id: Uuid },

    /// Tell `receiver_id` we stopped typing
    TypingStop { receiver_id: Uuid },

    /// Announce presence to everyone
    UserOnline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_with_snake_case_names() {
        let user_id = Uuid::new_v4();
        let event = GatewayEvent::UserStatusChange {
            user_id,
            status: PresenceStatus::Online,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_status_change");
        assert_eq!(json["data"]["userId"], user_id.to_string());
        assert_eq!(json["data"]["status"], "online");
    }

    #[test]
    fn commands_parse_from_client_json() {
        let receiver = Uuid::new_v4();
        let raw = format!(r#"{{"type":"typing_start","data":{{"receiverId":"{receiver}"}}}}"#);
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::TypingStart { receiver_id } => assert_eq!(receiver_id, receiver),
            other => panic!("unexpected command: {other:?}"),
        }

        let online: GatewayCommand = serde_json::from_str(r#"{"type":"user_online"}"#).unwrap();
        assert!(matches!(online, GatewayCommand::UserOnline));
    }
}
