use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use orbit_db::Database;
use orbit_db::models::ChatSessionRow;
use orbit_types::api::{
    AiExchangeResponse, AiMessageRequest, ChatMessageResponse, ChatSessionResponse, CreateSessionRequest,
    RenameSessionRequest, StatusMessage,
};
use orbit_types::models::ChatRole;

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::llm::{ChatTurn, CompletionRequest, LlmError};
use crate::middleware::AuthUser;
use crate::params::{PageQuery, path_id};
use crate::state::{AppState, blocking};

pub const SYSTEM_PROMPT: &str = "You are FriendsOrbit AI, a helpful and friendly AI assistant integrated into a social media platform. You can help users with various tasks, answer questions, provide advice, and engage in casual conversation. Be conversational, helpful, and maintain a positive tone. Keep responses concise but informative.";

const DEFAULT_SESSION_NAME: &str = "New Chat";
const MAX_SESSION_NAME_LEN: usize = 100;
const MAX_CONTENT_LEN: usize = 2000;

/// History window loaded from the session, and how much of it reaches the model.
const HISTORY_WINDOW: u32 = 10;
const CONTEXT_TURNS: usize = 9;

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

/// The session, if it exists and belongs to `user_id`.
fn owned_session(db: &Database, session_id: &str, user_id: &str) -> ApiResult<ChatSessionRow> {
    db.get_session(session_id)?
        .filter(|s| s.user_id == user_id)
        .ok_or_else(|| ApiError::not_found("Session not found"))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ChatSessionResponse>>> {
    let rows = blocking(&state, move |db| Ok(db.list_sessions(&auth.id.to_string())?)).await?;

    Ok(Json(rows.into_iter().map(convert::session).collect()))
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let name = req
        .session_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string());
    if name.chars().count() > MAX_SESSION_NAME_LEN {
        return Err(ApiError::bad_request("Session name must be at most 100 characters"));
    }

    let session = blocking(&state, move |db| {
        Ok(db.create_session(&Uuid::new_v4().to_string(), &auth.id.to_string(), &name)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::session(session))))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ChatMessageResponse>>> {
    let session_id = path_id(&session_id, "Session not found")?;
    let Query(query) = query?;
    let (limit, offset) = query.resolve(50, 200);
    let rows = blocking(&state, move |db| {
        let sid = session_id.to_string();
        owned_session(db, &sid, &auth.id.to_string())?;
        Ok(db.get_session_messages(&sid, limit, offset)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(convert::chat_message).collect()))
}

/// Store the user's message, ask the model for a reply with the recent
/// history as context, and store the reply.
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<AiMessageRequest>, JsonRejection>,
) -> ApiResult<Json<AiExchangeResponse>> {
    let session_id = path_id(&session_id, "Session not found")?;
    let Json(req) = payload?;
    let content = req.content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_CONTENT_LEN {
        return Err(ApiError::bad_request("Message content is required"));
    }

    let sid = session_id.to_string();
    let (user_message, history) = blocking(&state, move |db| {
        owned_session(db, &sid, &auth.id.to_string())?;
        let user_message = db.add_chat_message(&Uuid::new_v4().to_string(), &sid, ChatRole::User.as_str(), &content)?;
        let history = db.recent_session_messages(&sid, HISTORY_WINDOW)?;
        Ok((user_message, history))
    })
    .await?;

    let skip = history.len().saturating_sub(CONTEXT_TURNS);
    let mut messages = Vec::with_capacity(CONTEXT_TURNS + 1);
    messages.push(ChatTurn::new("system", SYSTEM_PROMPT));
    messages.extend(history.into_iter().skip(skip).map(|m| ChatTurn::new(m.role, m.content)));

    let request = CompletionRequest {
        model: state.llm_model.clone(),
        messages,
        max_tokens: MAX_TOKENS,
        temperature: TEMPERATURE,
    };

    let reply = match state.llm.complete(request).await {
        Ok(reply) => reply,
        Err(LlmError::Quota(detail)) => {
            warn!("AI provider quota exhausted: {}", detail);
            return Err(ApiError::TooManyRequests(
                "AI service temporarily unavailable. Please try again later.".into(),
            ));
        }
        Err(LlmError::Failed(e)) => {
            error!("AI chat error: {:#}", e);
            return Err(ApiError::Upstream("Failed to get AI response".into()));
        }
    };

    let sid = session_id.to_string();
    let ai_message = blocking(&state, move |db| {
        Ok(db.add_chat_message(&Uuid::new_v4().to_string(), &sid, ChatRole::Assistant.as_str(), &reply)?)
    })
    .await?;

    Ok(Json(AiExchangeResponse {
        user_message: convert::chat_message(user_message),
        ai_message: convert::chat_message(ai_message),
    }))
}

pub async fn rename_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<RenameSessionRequest>, JsonRejection>,
) -> ApiResult<Json<ChatSessionResponse>> {
    let session_id = path_id(&session_id, "Session not found")?;
    let Json(req) = payload?;
    let name = req.session_name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_SESSION_NAME_LEN {
        return Err(ApiError::bad_request("Session name must be 1-100 characters"));
    }

    let session = blocking(&state, move |db| {
        db.rename_session(&session_id.to_string(), &auth.id.to_string(), &name)?
            .ok_or_else(|| ApiError::not_found("Session not found"))
    })
    .await?;

    Ok(Json(convert::session(session)))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<StatusMessage>> {
    let session_id = path_id(&session_id, "Session not found")?;
    let user = auth.id.to_string();
    let deleted = blocking(&state, move |db| Ok(db.delete_session(&session_id.to_string(), &user)?)).await?;
    if !deleted {
        return Err(ApiError::not_found("Session not found"));
    }

    info!("{} ({}) deleted AI session {}", auth.username, auth.id, session_id);
    Ok(Json(StatusMessage::new("Session deleted successfully")))
}
