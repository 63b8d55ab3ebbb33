//! Chat rooms.

use axum::Extension;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use neothink_baas::{fetch, insert_one};
use neothink_core::{ChatMessage, Platform, tables};
use serde::Deserialize;
use uuid::Uuid;

use super::ServerState;
use super::common::{clamp_limit, required_text};
use crate::auth::AuthUser;
use crate::models::{ApiResult, ErrorResponse, ok};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;
const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

/// Room names: 1 to 64 of `[a-z0-9_-]`.
pub fn validate_room(room: &str) -> ApiResult<()> {
    let valid = !room.is_empty()
        && room.len() <= 64
        && room
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(ErrorResponse::bad_request(format!("Invalid room name: {}", room)))
    }
}

/// `GET /api/chat/:room/messages`, newest first.
pub async fn list_messages_handler(
    State(state): State<ServerState>,
    Extension(platform): Extension<Platform>,
    Path(room): Path<String>,
    Query(params): Query<ListMessagesQuery>,
) -> ApiResult<Response> {
    validate_room(&room)?;
    let limit = clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT);

    let query = neothink_baas::Query::new()
        .eq("platform", platform)
        .eq("room", &room)
        .order_desc("created_at")
        .limit(limit);
    let store = state.clients.client(platform).tables.clone();
    let messages: Vec<ChatMessage> = fetch(store.as_ref(), tables::MESSAGES, &query).await?;
    Ok(ok(messages).into_response())
}

/// `POST /api/chat/:room/messages`
pub async fn post_message_handler(
    Path(room): Path<String>,
    user: AuthUser,
    axum::Json(req): axum::Json<PostMessageRequest>,
) -> ApiResult<Response> {
    validate_room(&room)?;
    let content = required_text("content", &req.content, MAX_CONTENT_CHARS)?;

    let message = ChatMessage {
        id: Uuid::new_v4(),
        platform: user.platform,
        room,
        user_id: user.id().to_string(),
        content,
        created_at: Utc::now(),
    };
    let store = user.tables();
    let stored = insert_one(store.as_ref(), tables::MESSAGES, &message).await?;
    tracing::debug!(
        category = "chat",
        platform = %stored.platform,
        room = %stored.room,
        "Message posted"
    );
    Ok((StatusCode::CREATED, ok(stored)).into_response())
}
