// =============================================================================
// Session Authentication — Axum extractors
// =============================================================================
//
// The login handler stores an opaque session id in the `session_id` cookie.
// Two extractors resolve it against the SessionStore:
//
//   async fn page(PageUser(name): PageUser, ...)  // redirects to /login
//   async fn api(ApiUser(name): ApiUser, ...)     // 401 JSON
//
// Either one short-circuits the request before the handler body runs.
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
    response::Redirect,
};
use tracing::debug;

use crate::app_state::AppState;
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "session_id";

/// Read the session id out of the request's `Cookie` headers.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value carrying a fresh session id.
pub fn session_cookie(id: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn current_user(parts: &Parts, state: &AppState) -> Option<String> {
    let id = session_id(&parts.headers)?;
    let session = state.sessions.resolve(&id);
    if session.is_none() {
        debug!(path = %parts.uri.path(), "request carried an unknown or expired session");
    }
    session.map(|s| s.username)
}

/// Logged-in user for HTML pages. Redirects to `/login` otherwise.
pub struct PageUser(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for PageUser {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        current_user(parts, state)
            .map(PageUser)
            .ok_or_else(|| Redirect::to("/login"))
    }
}

/// Logged-in user for JSON and socket endpoints. Answers 401 otherwise.
pub struct ApiUser(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ApiUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        current_user(parts, state)
            .map(ApiUser)
            .ok_or(AppError::Unauthorized)
    }
}
