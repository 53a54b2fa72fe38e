use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{AppendHeaders, IntoResponse},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::info;
use uuid::Uuid;

use orbit_types::api::{AuthResponse, Claims, LoginRequest, SignupRequest, StatusMessage, UserProfile};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AUTH_COOKIE, AuthUser};
use crate::state::{AppState, blocking};

const TOKEN_TTL_DAYS: i64 = 30;

pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    let username = req.username.trim().to_string();
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    validate_username(&username)?;
    validate_full_name(&full_name)?;
    validate_email(&email)?;
    validate_password(&req.password)?;

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    let user = blocking(&state, move |db| {
        if db.get_user_by_username(&username)?.is_some() {
            return Err(ApiError::bad_request("Username already exists"));
        }
        if db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::bad_request("Email already exists"));
        }

        let id = user_id.to_string();
        db.create_user(&id, &username, &full_name, &email, &password_hash)?;
        db.get_user_by_id(&id)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("User vanished after insert: {}", id)))
    })
    .await?;

    info!("New account {} ({})", user.username, user_id);

    let token = create_token(&state.jwt_secret, user_id, &user.username)?;
    let profile = convert::profile(user, &[], &[], None);

    Ok((
        StatusCode::CREATED,
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token, state.cookie_secure)?)]),
        Json(AuthResponse {
            message: "User created successfully".into(),
            user: profile,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Invalid input data"));
    }

    let username = req.username.clone();
    let (user, followers, following) = blocking(&state, move |db| {
        let user = db
            .get_user_by_username(&username)?
            .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".into()))?;
        let (followers, following) = db.get_follow_ids(&user.id)?;
        Ok((user, followers, following))
    })
    .await?;

    if !verify_password(&req.password, &user.password) {
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    let user_id = convert::parse_id(&user.id);
    let token = create_token(&state.jwt_secret, user_id, &user.username)?;
    let profile = convert::profile(user, &followers, &following, None);

    Ok((
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token, state.cookie_secure)?)]),
        Json(AuthResponse {
            message: "Login successful".into(),
            user: profile,
            token,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie_header("", 0, state.cookie_secure)?)]),
        Json(StatusMessage::new("Logged out successfully")),
    ))
}

pub async fn me(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<Json<UserProfile>> {
    let profile = blocking(&state, move |db| {
        let id = auth.id.to_string();
        let user = db
            .get_user_by_id(&id)?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        let (followers, following) = db.get_follow_ids(&id)?;
        Ok(convert::profile(user, &followers, &following, None))
    })
    .await?;

    Ok(Json(profile))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?;

    Ok(token)
}

/// Hash with Argon2id and a fresh salt.
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

fn session_cookie(token: &str, secure: bool) -> ApiResult<HeaderValue> {
    cookie_header(token, TOKEN_TTL_DAYS * 24 * 60 * 60, secure)
}

fn cookie_header(value: &str, max_age_secs: i64, secure: bool) -> ApiResult<HeaderValue> {
    let mut cookie = format!("{AUTH_COOKIE}={value}; Max-Age={max_age_secs}; Path=/; HttpOnly; SameSite=Strict");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| ApiError::Internal(e.into()))
}

// -- Validation --

pub fn validate_username(username: &str) -> ApiResult<()> {
    let len = username.chars().count();
    if !(3..=30).contains(&len) || !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::bad_request(
            "Username must be 3-30 characters of letters, digits or underscores",
        ));
    }
    Ok(())
}

pub fn validate_full_name(full_name: &str) -> ApiResult<()> {
    let len = full_name.chars().count();
    if !(2..=100).contains(&len) {
        return Err(ApiError::bad_request("Full name must be 2-100 characters"));
    }
    Ok(())
}

/// `local@domain`, no whitespace, exactly one `@`.
pub fn validate_email(email: &str) -> ApiResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::bad_request("Invalid email format"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < 8 {
        return Err(ApiError::bad_request("Password must be at least 8 characters long"));
    }
    Ok(())
}

/// `http`, `https` or `ftp` URL whose host has a top-level domain. The
/// scheme may be left off (`example.com/me`). Empty clears the field.
pub fn validate_website_url(url: &str) -> ApiResult<()> {
    if url.is_empty() {
        return Ok(());
    }

    let candidate = if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    };

    let valid = match reqwest::Url::parse(&candidate) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https" | "ftp")
                && !url.chars().any(char::is_whitespace)
                && parsed.host_str().is_some_and(|host| {
                    host.rsplit_once('.')
                        .is_some_and(|(name, tld)| !name.is_empty() && tld.len() >= 2)
                })
        }
        Err(_) => false,
    };
    if !valid {
        return Err(ApiError::bad_request("Invalid website URL"));
    }
    Ok(())
}
