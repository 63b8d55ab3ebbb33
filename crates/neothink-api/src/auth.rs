//! Bearer-token extractors.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use neothink_baas::{BaasClient, TableStore, User};
use neothink_core::Platform;

use crate::models::ErrorResponse;
use crate::server::ServerState;

/// Bearer token from the `Authorization` header.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    bearer_token_str(&parts.headers)
}

pub fn bearer_token_str(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Platform installed by the security middleware.
pub fn request_platform(parts: &Parts) -> Result<Platform, ErrorResponse> {
    parts
        .extensions
        .get::<Platform>()
        .copied()
        .ok_or_else(|| ErrorResponse::internal("Request did not pass the security pipeline"))
}

/// A user authenticated against the platform's auth service.
#[derive(Clone)]
pub struct AuthUser {
    pub user: User,
    pub access_token: String,
    pub platform: Platform,
    client: BaasClient,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// Table access under the user's row-level security.
    pub fn tables(&self) -> Arc<dyn TableStore> {
        self.client.for_user(&self.access_token)
    }

    /// Resolve an access token against the platform's auth service.
    pub async fn from_token(
        state: &ServerState,
        platform: Platform,
        token: String,
    ) -> Result<Self, ErrorResponse> {
        let client = state.clients.client(platform).clone();
        let user = client.auth.get_user(&token).await.map_err(|e| match e {
            neothink_baas::Error::Unauthorized(_) | neothink_baas::Error::NotFound(_) => {
                ErrorResponse::unauthorized("Invalid or expired token")
            }
            other => ErrorResponse::from(other),
        })?;

        Ok(Self {
            user,
            access_token: token,
            platform,
            client,
        })
    }
}

#[async_trait]
impl FromRequestParts<ServerState> for AuthUser {
    type Rejection = ErrorResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let platform = request_platform(parts)?;
        let token = bearer_token(parts)
            .ok_or_else(|| ErrorResponse::unauthorized("Missing bearer token"))?
            .to_string();
        Self::from_token(state, platform, token).await
    }
}

/// An authenticated user with the `admin` role.
#[derive(Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<ServerState> for AdminUser {
    type Rejection = ErrorResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.user.is_admin() {
            tracing::warn!(
                category = "auth",
                user_id = %user.id(),
                platform = %user.platform,
                "Admin access denied"
            );
            return Err(ErrorResponse::forbidden("Admin access required"));
        }
        Ok(Self(user))
    }
}
