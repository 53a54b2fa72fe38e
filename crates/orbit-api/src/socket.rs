use axum::{
    extract::{Query, State, WebSocketUpgrade, rejection::QueryRejection},
    http::HeaderMap,
    response::Response,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use orbit_gateway::connection;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{authenticate, request_token};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// Authenticate at the HTTP upgrade, then hand the socket to the gateway.
/// Browsers cannot set headers on a WebSocket, so `?token=` is accepted too.
pub async fn upgrade(
    State(state): State<AppState>,
    query: Result<Query<SocketQuery>, QueryRejection>,
    headers: HeaderMap,
    jar: CookieJar,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| request_token(&headers, &jar))
        .ok_or_else(|| ApiError::Unauthorized("Access denied. No token provided.".into()))?;

    let user = authenticate(&state, &token).await?;
    let dispatcher = state.dispatcher.clone();

    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, user.id, user.username)))
}
