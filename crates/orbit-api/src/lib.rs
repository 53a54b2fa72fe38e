pub mod ai_chat;
pub mod auth;
pub mod convert;
pub mod error;
pub mod llm;
pub mod messages;
pub mod middleware;
pub mod moderation;
pub mod notifications;
pub mod params;
pub mod posts;
pub mod recommendations;
pub mod socket;
pub mod state;
pub mod users;

use axum::{
    Router,
    http::Uri,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use tracing::debug;

use crate::error::ApiError;
use crate::middleware::require_auth;
pub use crate::state::{AppState, AppStateInner};

/// Every REST route plus the socket upgrade, mounted under `/api`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/socket", get(socket::upgrade));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        // Users
        .route("/users/profile/{username}", get(users::get_profile))
        .route("/users/profile", put(users::update_profile))
        .route("/users/update", post(users::update_profile))
        .route("/users/follow/{id}", post(users::toggle_follow))
        .route("/users/suggested", get(users::suggested))
        .route("/users/search", get(users::search))
        // Posts
        .route("/posts/create", post(posts::create_post))
        .route("/posts/all", get(posts::all_posts))
        .route("/posts/following", get(posts::following_posts))
        .route("/posts/user/{username}", get(posts::user_posts))
        .route("/posts/likes/{user_id}", get(posts::liked_posts))
        .route("/posts/like/{id}", post(posts::toggle_like))
        .route("/posts/comment/{id}", post(posts::add_comment))
        .route("/posts/{id}", delete(posts::delete_post))
        // Notifications
        .route("/notifications", get(notifications::list).delete(notifications::delete_all))
        // Direct messages
        .route("/messages/conversations", get(messages::conversations))
        .route("/messages/conversation/{user_id}", get(messages::conversation))
        .route("/messages/send", post(messages::send_message))
        .route("/messages/read/{user_id}", put(messages::mark_read))
        // AI chat
        .route("/ai-chat/sessions", get(ai_chat::list_sessions).post(ai_chat::create_session))
        .route(
            "/ai-chat/sessions/{id}/messages",
            get(ai_chat::get_messages).post(ai_chat::send_message),
        )
        .route(
            "/ai-chat/sessions/{id}",
            put(ai_chat::rename_session).delete(ai_chat::delete_session),
        )
        // Recommendations
        .route("/recommendations/posts", get(recommendations::personalized))
        .route("/recommendations/trending", get(recommendations::trending))
        .route("/recommendations/users", get(recommendations::users))
        .route("/recommendations/interaction", post(recommendations::log_interaction))
        // Moderation
        .route("/moderation/moderate", post(moderation::moderate_post))
        .route("/moderation/history", get(moderation::history))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .fallback(route_not_found)
        .with_state(state)
}

async fn route_not_found(uri: Uri) -> ApiError {
    debug!("No route for {}", uri);
    ApiError::not_found("Route not found")
}
