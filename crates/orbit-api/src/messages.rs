use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use orbit_types::api::{ConversationResponse, MessageResponse, SendMessageRequest, StatusMessage};
use orbit_types::events::GatewayEvent;

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::params::{PageQuery, path_id};
use crate::state::{AppState, blocking};

const MAX_MESSAGE_LEN: usize = 2000;

pub async fn conversations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ConversationResponse>>> {
    let rows = blocking(&state, move |db| Ok(db.list_conversations(&auth.id.to_string())?)).await?;

    Ok(Json(rows.into_iter().map(convert::conversation).collect()))
}

/// One page of the conversation with `user_id`, oldest first. Whatever they
/// sent me is marked read.
pub async fn conversation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let user_id = path_id(&user_id, "User not found")?;
    let Query(query) = query?;
    let (limit, offset) = query.resolve(50, 200);
    let rows = blocking(&state, move |db| {
        let me = auth.id.to_string();
        let other = user_id.to_string();
        let rows = db.get_conversation(&me, &other, limit, offset)?;
        db.mark_messages_read(&other, &me)?;
        Ok(rows)
    })
    .await?;

    Ok(Json(rows.into_iter().map(convert::message).collect()))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let content = req.content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_MESSAGE_LEN {
        return Err(ApiError::bad_request("Invalid input data"));
    }
    if req.receiver_id == auth.id {
        return Err(ApiError::bad_request("Cannot send a message to yourself"));
    }

    let receiver_id = req.receiver_id;
    let message_type = req.message_type;
    let sender = auth.id.to_string();
    let (row, sender_row) = blocking(&state, move |db| {
        let receiver = receiver_id.to_string();
        if db.get_user_by_id(&receiver)?.is_none() {
            return Err(ApiError::not_found("Receiver not found"));
        }
        let sender_row = db
            .get_user_by_id(&sender)?
            .ok_or_else(|| ApiError::Unauthorized("Invalid token. User not found.".into()))?;

        let row = db.insert_message(
            &Uuid::new_v4().to_string(),
            &sender,
            &receiver,
            &content,
            message_type.as_str(),
        )?;
        Ok((row, sender_row))
    })
    .await?;

    let message = convert::message(row);
    let delivered = state
        .dispatcher
        .send_to_user(
            receiver_id,
            GatewayEvent::NewMessage {
                message: message.clone(),
                sender: convert::user_summary(&sender_row),
            },
        )
        .await;
    debug!("Message {} pushed to {} connection(s)", message.id, delivered);

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<StatusMessage>> {
    let user_id = path_id(&user_id, "User not found")?;
    blocking(&state, move |db| {
        db.mark_messages_read(&user_id.to_string(), &auth.id.to_string())?;
        Ok(())
    })
    .await?;

    Ok(Json(StatusMessage::new("Messages marked as read")))
}
