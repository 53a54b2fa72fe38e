use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use tracing::info;

use orbit_db::models::ProfileUpdate;
use orbit_types::api::{FollowResponse, UpdateProfileRequest, UserProfile, UserSummary};

use crate::auth::{
    hash_password, validate_email, validate_full_name, validate_password, validate_username, validate_website_url,
    verify_password,
};
use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::notifications::push_notification;
use crate::params::{LimitQuery, SearchQuery, path_id};
use crate::state::{AppState, blocking};

const MAX_BIO_LEN: usize = 500;
const SEARCH_LIMIT: u32 = 20;

pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<UserProfile>> {
    let profile = blocking(&state, move |db| {
        let user = db
            .get_user_by_username(&username)?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        let (followers, following) = db.get_follow_ids(&user.id)?;

        let viewer = auth.id.to_string();
        let is_following = if viewer == user.id {
            None
        } else {
            Some(db.is_following(&viewer, &user.id)?)
        };

        Ok(convert::profile(user, &followers, &following, is_following))
    })
    .await?;

    Ok(Json(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> ApiResult<Json<UserProfile>> {
    let Json(req) = payload?;

    let mut update = ProfileUpdate {
        full_name: non_empty(req.full_name),
        username: non_empty(req.username),
        email: non_empty(req.email).map(|e| e.to_lowercase()),
        bio: req.bio.map(|b| b.trim().to_string()),
        website_url: req.website_url.map(|w| w.trim().to_string()),
        profile_image: non_empty(req.profile_image),
        cover_image: non_empty(req.cover_image),
        password_hash: None,
    };

    if let Some(full_name) = &update.full_name {
        validate_full_name(full_name)?;
    }
    if let Some(username) = &update.username {
        validate_username(username)?;
    }
    if let Some(email) = &update.email {
        validate_email(email)?;
    }
    if let Some(website_url) = &update.website_url {
        validate_website_url(website_url)?;
    }
    if update.bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO_LEN) {
        return Err(ApiError::bad_request("Bio must be at most 500 characters"));
    }

    let password_change = match (non_empty(req.current_password), non_empty(req.new_password)) {
        (None, None) => None,
        (Some(current), Some(new)) => {
            validate_password(&new)?;
            Some((current, new))
        }
        _ => {
            return Err(ApiError::bad_request(
                "Both current and new password are required to change the password",
            ));
        }
    };

    let user_id = auth.id.to_string();

    if let Some((current, new)) = password_change {
        let uid = user_id.clone();
        let stored = blocking(&state, move |db| {
            db.get_user_by_id(&uid)?
                .map(|u| u.password)
                .ok_or_else(|| ApiError::not_found("User not found"))
        })
        .await?;

        if !verify_password(&current, &stored) {
            return Err(ApiError::bad_request("Current password is incorrect"));
        }
        update.password_hash = Some(hash_password(&new)?);
    }

    if update.is_empty() {
        return Err(ApiError::bad_request("No updates provided"));
    }

    let profile = blocking(&state, move |db| {
        if let Some(username) = &update.username {
            if db.get_user_by_username(username)?.is_some_and(|u| u.id != user_id) {
                return Err(ApiError::bad_request("Username already exists"));
            }
        }
        if let Some(email) = &update.email {
            if db.get_user_by_email(email)?.is_some_and(|u| u.id != user_id) {
                return Err(ApiError::bad_request("Email already exists"));
            }
        }

        if !db.update_profile(&user_id, &update)? {
            return Err(ApiError::not_found("User not found"));
        }

        let user = db
            .get_user_by_id(&user_id)?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        let (followers, following) = db.get_follow_ids(&user_id)?;
        Ok(convert::profile(user, &followers, &following, None))
    })
    .await?;

    info!("{} ({}) updated their profile", profile.username, profile.id);
    Ok(Json(profile))
}

pub async fn toggle_follow(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<FollowResponse>> {
    let target_id = path_id(&target_id, "User not found")?;
    if target_id == auth.id {
        return Err(ApiError::bad_request("Cannot follow yourself"));
    }

    let follower = auth.id.to_string();
    let toggle = blocking(&state, move |db| {
        let target = target_id.to_string();
        if db.get_user_by_id(&target)?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }
        Ok(db.toggle_follow(&follower, &target)?)
    })
    .await?;

    if let Some(notification_id) = toggle.notification_id {
        push_notification(&state, notification_id).await;
    }

    let message = if toggle.following {
        "User followed successfully"
    } else {
        "User unfollowed successfully"
    };

    Ok(Json(FollowResponse {
        message: message.into(),
        following: toggle.following,
    }))
}

pub async fn suggested(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let Query(query) = query?;
    let limit = query.resolve(4, 50);
    let users = blocking(&state, move |db| {
        Ok(db.random_unfollowed_users(&auth.id.to_string(), limit)?)
    })
    .await?;

    Ok(Json(users.into_iter().map(convert::summary).collect()))
}

pub async fn search(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let Query(query) = query?;
    let q = query.q.trim().to_string();
    if q.chars().count() < 2 {
        return Err(ApiError::bad_request("Search query must be at least 2 characters"));
    }

    let users = blocking(&state, move |db| Ok(db.search_users(&q, SEARCH_LIMIT)?)).await?;

    Ok(Json(users.into_iter().map(convert::summary).collect()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
