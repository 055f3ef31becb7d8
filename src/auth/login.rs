//! Login and logout
//!
//! A client presents a signed token once; it is verified, the user
//! document is materialized, and the token is stored in the session cookie.

use axum::{Json, Router, extract::State, routing::post};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

use super::middleware::SESSION_COOKIE;
use super::session::verify_session_token;
use crate::AppState;
use crate::error::AppError;

/// Create authentication router
///
/// Routes:
/// - POST /api/login - Verify a token and start a cookie session
/// - POST /api/logout - Clear the session cookie
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub user_id: String,
    pub user_email: String,
}

/// POST /api/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let session = verify_session_token(&body.token, &state.config.auth.session_secret)
        .map_err(|error| {
            tracing::debug!(%error, "Login rejected");
            AppError::Unauthorized
        })?;

    state
        .store
        .ensure_user(
            &session.user_id,
            session.display_name.as_deref(),
            session.email.as_deref(),
        )
        .await?;

    let cookie = Cookie::build((SESSION_COOKIE, body.token.trim().to_string()))
        .path("/")
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax);

    tracing::info!(user_id = %session.user_id, "User logged in");

    let user_email = session
        .email
        .clone()
        .filter(|email| !email.is_empty())
        .or_else(|| session.display_name.clone())
        .unwrap_or_else(|| "No email".to_string());

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            message: "Login successful".to_string(),
            user_id: session.user_id,
            user_email,
        }),
    ))
}

/// POST /api/logout
async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(serde_json::json!({ "message": "Logged out" })))
}
