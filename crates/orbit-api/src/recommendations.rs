use axum::{
    Extension, Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use tracing::debug;

use orbit_db::Database;
use orbit_db::models::PostRow;
use orbit_types::api::{InteractionRequest, RecommendedPost, StatusMessage, SuggestedUser};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::params::LimitQuery;
use crate::posts::hydrate_posts;
use crate::state::{AppState, blocking};

const MAX_LIMIT: u32 = 50;

fn with_scores(db: &Database, scored: Vec<(PostRow, f64)>, viewer: &str) -> anyhow::Result<Vec<RecommendedPost>> {
    let (rows, scores): (Vec<PostRow>, Vec<f64>) = scored.into_iter().unzip();
    Ok(hydrate_posts(db, rows, viewer)?
        .into_iter()
        .zip(scores)
        .map(|(post, score)| RecommendedPost { post, score })
        .collect())
}

pub async fn personalized(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<RecommendedPost>>> {
    let Query(query) = query?;
    let limit = query.resolve(10, MAX_LIMIT);
    let posts = blocking(&state, move |db| {
        let me = auth.id.to_string();
        let scored = db.personalized_posts(&me, limit)?;
        Ok(with_scores(db, scored, &me)?)
    })
    .await?;

    Ok(Json(posts))
}

pub async fn trending(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<RecommendedPost>>> {
    let Query(query) = query?;
    let limit = query.resolve(10, MAX_LIMIT);
    let posts = blocking(&state, move |db| {
        let scored = db.trending_posts(limit)?;
        Ok(with_scores(db, scored, &auth.id.to_string())?)
    })
    .await?;

    Ok(Json(posts))
}

pub async fn users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<SuggestedUser>>> {
    let Query(query) = query?;
    let limit = query.resolve(5, MAX_LIMIT);
    let rows = blocking(&state, move |db| Ok(db.suggested_users(&auth.id.to_string(), limit)?)).await?;

    Ok(Json(
        rows.into_iter()
            .map(|row| SuggestedUser {
                user: convert::summary(row.user),
                mutual_connections: row.mutual_connections,
                follower_count: row.follower_count,
                suggestion_score: row.suggestion_score,
            })
            .collect(),
    ))
}

pub async fn log_interaction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<InteractionRequest>, JsonRejection>,
) -> ApiResult<Json<StatusMessage>> {
    let Json(req) = payload?;
    if req.target_type.is_empty() || req.target_id.is_empty() || req.interaction_type.is_empty() {
        return Err(ApiError::bad_request("Invalid input data"));
    }

    debug!(
        "{} ({}) {} {} {}",
        auth.username, auth.id, req.interaction_type, req.target_type, req.target_id
    );

    blocking(&state, move |db| {
        db.log_interaction(&auth.id.to_string(), &req.target_type, &req.target_id, &req.interaction_type)?;
        Ok(())
    })
    .await?;

    Ok(Json(StatusMessage::new("Interaction logged successfully")))
}
