//! Account endpoints.
//!
//! Each endpoint is one call to the platform's auth service plus one
//! `security_logs` row. Failed sign-ins are logged with the email domain
//! only.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use chrono::Utc;
use neothink_baas::{Credentials, Session, User, UserUpdate};
use neothink_core::{Outcome, Platform, SecurityLog};
use serde::Deserialize;
use serde_json::{Value, json};

use super::ServerState;
use super::common::ip_of;
use crate::auth::AuthUser;
use crate::models::{ApiResponse, ApiResult, ErrorResponse, ok};
use crate::security::ClientIp;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

pub fn validate_email(email: &str) -> ApiResult<String> {
    let email = email.trim();
    let valid = email.len() <= 254
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !domain.contains('@')
                    && !email.contains(char::is_whitespace)
            }
            None => false,
        };
    if valid {
        Ok(email.to_string())
    } else {
        Err(ErrorResponse::validation("Invalid email address"))
    }
}

pub fn validate_password(password: &str) -> ApiResult<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ErrorResponse::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ErrorResponse::validation(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn email_domain(email: &str) -> &str {
    email.rsplit_once('@').map(|(_, d)| d).unwrap_or("")
}

async fn audit(
    state: &ServerState,
    platform: Platform,
    ip: &str,
    action: &str,
    user_id: Option<&str>,
    outcome: Outcome,
    details: Value,
) {
    state
        .security_log
        .log_auth(SecurityLog {
            platform,
            user_id: user_id.map(str::to_string),
            action: action.to_string(),
            outcome,
            ip: ip.to_string(),
            details,
            created_at: Utc::now(),
        })
        .await;
}

/// `POST /api/auth/sign-in`
pub async fn sign_in_handler(
    State(state): State<ServerState>,
    Extension(platform): Extension<Platform>,
    ip: Option<Extension<ClientIp>>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Json<ApiResponse<Session>>> {
    let ip = ip_of(ip);
    let email = validate_email(&req.email)?;
    let client = state.clients.client(platform);

    let credentials = Credentials {
        email: email.clone(),
        password: req.password,
    };
    match client.auth.sign_in(&credentials).await {
        Ok(session) => {
            audit(
                &state,
                platform,
                &ip,
                "sign_in",
                Some(&session.user.id),
                Outcome::Success,
                json!({}),
            )
            .await;
            Ok(ok(session))
        }
        Err(e) => {
            audit(
                &state,
                platform,
                &ip,
                "sign_in",
                None,
                Outcome::Failure,
                json!({ "email_domain": email_domain(&email), "error": e.to_string() }),
            )
            .await;
            Err(match e {
                neothink_baas::Error::Unauthorized(_) | neothink_baas::Error::Rejected(_) => {
                    ErrorResponse::unauthorized("Invalid login credentials")
                }
                other => other.into(),
            })
        }
    }
}

/// `POST /api/auth/sign-up`
pub async fn sign_up_handler(
    State(state): State<ServerState>,
    Extension(platform): Extension<Platform>,
    ip: Option<Extension<ClientIp>>,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<Response> {
    let ip = ip_of(ip);
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    let mut metadata = match req.metadata {
        Some(Value::Object(map)) => Value::Object(map),
        None | Some(Value::Null) => json!({}),
        Some(_) => return Err(ErrorResponse::validation("metadata must be an object")),
    };
    metadata["platform"] = json!(platform);

    let credentials = Credentials {
        email: email.clone(),
        password: req.password,
    };
    let result = state
        .clients
        .client(platform)
        .auth
        .sign_up(&credentials, metadata)
        .await;
    match result {
        Ok(signup) => {
            audit(
                &state,
                platform,
                &ip,
                "sign_up",
                Some(&signup.user.id),
                Outcome::Success,
                json!({ "confirmed": signup.session.is_some() }),
            )
            .await;
            Ok((StatusCode::CREATED, ok(signup)).into_response())
        }
        Err(e) => {
            audit(
                &state,
                platform,
                &ip,
                "sign_up",
                None,
                Outcome::Failure,
                json!({ "email_domain": email_domain(&email), "error": e.to_string() }),
            )
            .await;
            Err(e.into())
        }
    }
}

/// `POST /api/auth/reset-password`
///
/// Answers the same way whether or not the address has an account.
pub async fn reset_password_handler(
    State(state): State<ServerState>,
    Extension(platform): Extension<Platform>,
    ip: Option<Extension<ClientIp>>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let ip = ip_of(ip);
    let email = validate_email(&req.email)?;
    let redirect_to = req
        .redirect_to
        .or_else(|| state.config.platform_urls.get(&platform).cloned());

    let result = state
        .clients
        .client(platform)
        .auth
        .reset_password(&email, redirect_to.as_deref())
        .await;
    let outcome = match &result {
        Ok(()) => Outcome::Success,
        Err(_) => Outcome::Failure,
    };
    audit(
        &state,
        platform,
        &ip,
        "reset_password",
        None,
        outcome,
        json!({ "email_domain": email_domain(&email) }),
    )
    .await;

    match result {
        Ok(()) | Err(neothink_baas::Error::NotFound(_)) => Ok(ok(json!({
            "message": "If the address has an account, a reset link has been sent"
        }))),
        Err(e) => Err(e.into()),
    }
}

/// `GET /api/auth/user`
pub async fn get_user_handler(user: AuthUser) -> Json<ApiResponse<User>> {
    ok(user.user)
}

/// `PUT /api/auth/user`
pub async fn update_user_handler(
    State(state): State<ServerState>,
    ip: Option<Extension<ClientIp>>,
    user: AuthUser,
    Json(update): Json<UserUpdate>,
) -> ApiResult<Json<ApiResponse<User>>> {
    let ip = ip_of(ip);
    let mut update = update;
    if let Some(email) = &update.email {
        update.email = Some(validate_email(email)?);
    }
    if let Some(password) = &update.password {
        validate_password(password)?;
    }
    if let Some(data) = &update.data {
        if !data.is_object() {
            return Err(ErrorResponse::validation("data must be an object"));
        }
    }
    if update.email.is_none() && update.password.is_none() && update.data.is_none() {
        return Err(ErrorResponse::bad_request("Nothing to update"));
    }

    let changed: Vec<&str> = [
        ("email", update.email.is_some()),
        ("password", update.password.is_some()),
        ("data", update.data.is_some()),
    ]
    .into_iter()
    .filter(|(_, set)| *set)
    .map(|(name, _)| name)
    .collect();

    let result = state
        .clients
        .client(user.platform)
        .auth
        .update_user(&user.access_token, &update)
        .await;
    let outcome = if result.is_ok() {
        Outcome::Success
    } else {
        Outcome::Failure
    };
    audit(
        &state,
        user.platform,
        &ip,
        "update_user",
        Some(user.id()),
        outcome,
        json!({ "fields": changed }),
    )
    .await;

    Ok(ok(result?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" a@b.co ").unwrap(), "a@b.co");
        for bad in ["", "ab.co", "@b.co", "a@b", "a@.co", "a@b.co.", "a b@c.co", "a@b@c.co"] {
            assert!(validate_email(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }
}
