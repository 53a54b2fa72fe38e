use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use orbit_db::Database;
use orbit_db::models::PostRow;
use orbit_types::api::{CommentRequest, CommentResponse, CreatePostRequest, LikeResponse, PostResponse, StatusMessage};
use orbit_types::events::{FeedAction, GatewayEvent};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::notifications::push_notification;
use crate::params::{PageQuery, path_id};
use crate::state::{AppState, blocking};

const MAX_POST_LEN: usize = 2000;
const MAX_COMMENT_LEN: usize = 1000;

/// Attach likes, comments and the viewer's like flag to a page of posts,
/// keeping the page order.
pub(crate) fn hydrate_posts(db: &Database, rows: Vec<PostRow>, viewer: &str) -> anyhow::Result<Vec<PostResponse>> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

    let mut likes: HashMap<String, Vec<String>> = HashMap::new();
    for like in db.get_likes_for_posts(&ids)? {
        likes.entry(like.post_id).or_default().push(like.user_id);
    }

    let mut comments: HashMap<String, Vec<CommentResponse>> = HashMap::new();
    for comment in db.get_comments_for_posts(&ids)? {
        comments.entry(comment.post_id.clone()).or_default().push(convert::comment(comment));
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let liked_by = likes.remove(&row.id).unwrap_or_default();
            let is_liked = liked_by.iter().any(|id| id == viewer);
            let comments = comments.remove(&row.id).unwrap_or_default();

            PostResponse {
                id: convert::parse_id(&row.id),
                author: convert::summary(row.author),
                content: row.content,
                image_url: row.image_url,
                likes: liked_by.iter().map(|id| convert::parse_id(id)).collect(),
                likes_count: row.likes_count as usize,
                comments_count: row.comments_count as usize,
                comments,
                is_liked,
                created_at: convert::parse_time(&row.created_at),
                updated_at: convert::parse_time(&row.updated_at),
            }
        })
        .collect())
}

fn feed_update(state: &AppState, post_id: Uuid, user_id: Uuid, action: FeedAction) {
    state.dispatcher.broadcast(GatewayEvent::FeedUpdate {
        post_id,
        user_id,
        action,
    });
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<CreatePostRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let content = req.content.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    let image = req.image.map(|i| i.trim().to_string()).filter(|i| !i.is_empty());

    if content.as_ref().is_some_and(|c| c.chars().count() > MAX_POST_LEN) {
        return Err(ApiError::bad_request("Invalid input data"));
    }
    if content.is_none() && image.is_none() {
        return Err(ApiError::bad_request("Post must have content or image"));
    }

    let post_id = Uuid::new_v4();
    let author = auth.id.to_string();
    let post = blocking(&state, move |db| {
        let id = post_id.to_string();
        db.create_post(&id, &author, content.as_deref(), image.as_deref())?;
        let row = db
            .get_post(&id)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Post vanished after insert: {}", id)))?;
        let mut posts = hydrate_posts(db, vec![row], &author)?;
        posts.pop().ok_or_else(|| ApiError::Internal(anyhow::anyhow!("Post hydration lost {}", id)))
    })
    .await?;

    info!("{} ({}) created post {}", auth.username, auth.id, post_id);
    feed_update(&state, post_id, auth.id, FeedAction::Created);

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn all_posts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let Query(query) = query?;
    let (limit, offset) = query.resolve(20, 100);
    let posts = blocking(&state, move |db| {
        let rows = db.list_all_posts(limit, offset)?;
        Ok(hydrate_posts(db, rows, &auth.id.to_string())?)
    })
    .await?;

    Ok(Json(posts))
}

pub async fn following_posts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let Query(query) = query?;
    let (limit, offset) = query.resolve(20, 100);
    let posts = blocking(&state, move |db| {
        let me = auth.id.to_string();
        let rows = db.list_following_posts(&me, limit, offset)?;
        Ok(hydrate_posts(db, rows, &me)?)
    })
    .await?;

    Ok(Json(posts))
}

pub async fn user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(auth): Extension<AuthUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let Query(query) = query?;
    let (limit, offset) = query.resolve(20, 100);
    let posts = blocking(&state, move |db| {
        let user = db
            .get_user_by_username(&username)?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        let rows = db.list_user_posts(&user.id, limit, offset)?;
        Ok(hydrate_posts(db, rows, &auth.id.to_string())?)
    })
    .await?;

    Ok(Json(posts))
}

pub async fn liked_posts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let user_id = path_id(&user_id, "User not found")?;
    let posts = blocking(&state, move |db| {
        let uid = user_id.to_string();
        if db.get_user_by_id(&uid)?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }
        let rows = db.list_liked_posts(&uid)?;
        Ok(hydrate_posts(db, rows, &auth.id.to_string())?)
    })
    .await?;

    Ok(Json(posts))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<LikeResponse>> {
    let post_id = path_id(&post_id, "Post not found")?;
    let user = auth.id.to_string();
    let (toggle, likes) = blocking(&state, move |db| {
        let pid = post_id.to_string();
        if db.get_post(&pid)?.is_none() {
            return Err(ApiError::not_found("Post not found"));
        }
        let toggle = db.toggle_like(&pid, &user)?;
        let likes = db.get_likes_for_posts(std::slice::from_ref(&pid))?;
        Ok((toggle, likes))
    })
    .await?;

    let action = if toggle.liked { FeedAction::Liked } else { FeedAction::Unliked };
    feed_update(&state, post_id, auth.id, action);

    if let Some(notification_id) = toggle.notification_id {
        push_notification(&state, notification_id).await;
    }

    let likes: Vec<Uuid> = likes.iter().map(|l| convert::parse_id(&l.user_id)).collect();
    Ok(Json(LikeResponse {
        liked: toggle.liked,
        likes_count: likes.len(),
        likes,
    }))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> ApiResult<Json<CommentResponse>> {
    let post_id = path_id(&post_id, "Post not found")?;
    let Json(req) = payload?;
    let content = req.content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_COMMENT_LEN {
        return Err(ApiError::bad_request("Comment content is required"));
    }

    let user = auth.id.to_string();
    let comment = blocking(&state, move |db| {
        let pid = post_id.to_string();
        if db.get_post(&pid)?.is_none() {
            return Err(ApiError::not_found("Post not found"));
        }
        Ok(db.add_comment(&Uuid::new_v4().to_string(), &pid, &user, &content)?)
    })
    .await?;

    feed_update(&state, post_id, auth.id, FeedAction::Commented);

    Ok(Json(convert::comment(comment)))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<StatusMessage>> {
    let post_id = path_id(&post_id, "Post not found")?;
    let me = auth.id.to_string();
    blocking(&state, move |db| {
        let pid = post_id.to_string();
        let post = db
            .get_post(&pid)?
            .ok_or_else(|| ApiError::not_found("Post not found"))?;
        if post.author.id != me {
            return Err(ApiError::Forbidden("You can only delete your own posts".into()));
        }
        db.soft_delete_post(&pid)?;
        Ok(())
    })
    .await?;

    info!("{} ({}) deleted post {}", auth.username, auth.id, post_id);
    feed_update(&state, post_id, auth.id, FeedAction::Deleted);

    Ok(Json(StatusMessage::new("Post deleted successfully")))
}
