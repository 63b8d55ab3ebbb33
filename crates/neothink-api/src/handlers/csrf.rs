//! CSRF token issuance.

use axum::Extension;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, SET_COOKIE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use neothink_core::Platform;
use serde::Serialize;

use super::ServerState;
use crate::auth::AuthUser;
use crate::models::{ApiResult, ErrorResponse, ok};

#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Clients should fetch a new token this often.
    pub refresh_interval_secs: u64,
}

/// `GET /api/csrf-token`
///
/// Returns the token in the body and sets the matching cookie. The token is
/// bound to the caller's `User-Agent` and, when signed in, to the user.
pub async fn csrf_token_handler(
    State(state): State<ServerState>,
    Extension(platform): Extension<Platform>,
    user: Option<AuthUser>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let issued = state
        .csrf
        .issue(platform, user.as_ref().map(AuthUser::id), user_agent)
        .await?;

    let cookie = HeaderValue::from_str(&state.csrf.cookie(&issued.token))
        .map_err(|e| ErrorResponse::internal(e.to_string()))?;

    let body = CsrfTokenResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        refresh_interval_secs: state.config.security.csrf_refresh_secs,
    };
    let mut response = ok(body).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
