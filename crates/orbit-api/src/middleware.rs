use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use orbit_types::api::Claims;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, blocking};

/// Name of the session cookie set at signup/login.
pub const AUTH_COOKIE: &str = "jwt";

/// The authenticated caller, stored in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

/// Token from `Authorization: Bearer ...`, falling back to the `jwt` cookie.
pub fn request_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| jar.get(AUTH_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty())
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .ok()
        .map(|data| data.claims)
}

/// Validate a token and make sure its user still exists.
pub async fn authenticate(state: &AppState, token: &str) -> ApiResult<AuthUser> {
    let claims =
        decode_token(&state.jwt_secret, token).ok_or_else(|| ApiError::Unauthorized("Invalid token.".into()))?;

    let user_id = claims.sub;
    let user = blocking(state, move |db| Ok(db.get_user_by_id(&user_id.to_string())?))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid token. User not found.".into()))?;

    Ok(AuthUser {
        id: user_id,
        username: user.username,
    })
}

/// Extract and validate the JWT, then load the caller.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request_token(req.headers(), &jar)
        .ok_or_else(|| ApiError::Unauthorized("Access denied. No token provided.".into()))?;

    let user = authenticate(&state, &token).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;

    use super::*;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        let jar = CookieJar::new().add(Cookie::new(AUTH_COOKIE, "from-cookie"));

        assert_eq!(request_token(&headers, &jar).as_deref(), Some("from-header"));
        assert_eq!(request_token(&HeaderMap::new(), &jar).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn cleared_cookie_is_no_token() {
        let jar = CookieJar::new().add(Cookie::new(AUTH_COOKIE, ""));
        assert!(request_token(&HeaderMap::new(), &jar).is_none());
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let token = crate::auth::create_token("secret-a", Uuid::new_v4(), "alice").unwrap();
        assert!(decode_token("secret-b", &token).is_none());
        assert_eq!(decode_token("secret-a", &token).unwrap().username, "alice");
    }
}
