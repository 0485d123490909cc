//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::web::state::AppState;

const SESSION_COOKIE: &str = "session";
const SESSION_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

//=========================================================================================
// Cookie Helpers
//=========================================================================================

/// Extracts the auth session id from the `Cookie` header, if present.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

fn session_cookie(session_id: &str, max_age_secs: i64) -> String {
    format!(
        "{SESSION_COOKIE}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        session_id, max_age_secs
    )
}

/// Creates a server-side auth session and returns the `Set-Cookie` value for it.
async fn issue_session(state: &AppState, user_id: Uuid) -> ApiResult<String> {
    let auth_session_id = Uuid::new_v4().to_string();
    let lifetime = Duration::days(SESSION_DAYS);
    state
        .auth
        .create_auth_session(&auth_session_id, user_id, Utc::now() + lifetime)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            ApiError::Internal("Failed to create session".to_string())
        })?;
    Ok(session_cookie(&auth_session_id, lifetime.num_seconds()))
}

fn validate_credentials(req: &Credentials) -> ApiResult<()> {
    if !req.email.contains('@') || req.email.trim() != req.email {
        return Err(ApiError::BadRequest("A valid email address is required".to_string()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = Credentials,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> ApiResult<impl IntoResponse> {
    validate_credentials(&req)?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))?
        .to_string();

    let user = state
        .auth
        .create_user_with_email(&req.email, &password_hash)
        .await
        .map_err(|e| {
            warn!("Failed to create user: {:?}", e);
            ApiError::BadRequest("Could not create an account with that email".to_string())
        })?;

    let cookie = issue_session(&state, user.user_id).await?;
    info!(user_id = %user.user_id, "User signed up");

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user_id: user.user_id,
            email: user.email,
        }),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> ApiResult<impl IntoResponse> {
    let user_creds = state.auth.get_user_by_email(&req.email).await.map_err(|e| {
        warn!("Failed to get user: {:?}", e);
        ApiError::Unauthorized
    })?;

    let parsed_hash = PasswordHash::new(&user_creds.hashed_password)
        .map_err(|e| ApiError::Internal(format!("Failed to parse password hash: {e}")))?;

    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(ApiError::Unauthorized);
    }

    let cookie = issue_session(&state, user_creds.user_id).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user_id: user_creds.user_id,
            email: user_creds.email,
        }),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let auth_session_id = session_id_from_headers(&headers).ok_or(ApiError::Unauthorized)?;

    state.auth.delete_auth_session(auth_session_id).await?;

    Ok((StatusCode::OK, [(header::SET_COOKIE, session_cookie("", 0))]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn finds_session_among_other_cookies() {
        let h = headers("theme=dark; session=abc-123; lang=en");
        assert_eq!(session_id_from_headers(&h), Some("abc-123"));
    }

    #[test]
    fn missing_or_empty_session_is_none() {
        assert_eq!(session_id_from_headers(&HeaderMap::new()), None);
        assert_eq!(session_id_from_headers(&headers("theme=dark")), None);
        assert_eq!(session_id_from_headers(&headers("session=")), None);
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let cookie = session_cookie("", 0);
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.ends_with("Max-Age=0"));
    }

    #[test]
    fn credentials_are_validated() {
        let ok = Credentials {
            email: "reader@example.com".to_string(),
            password: "correct horse".to_string(),
        };
        assert!(validate_credentials(&ok).is_ok());

        let short = Credentials {
            password: "short".to_string(),
            ..ok
        };
        assert!(validate_credentials(&short).is_err());
    }
}
