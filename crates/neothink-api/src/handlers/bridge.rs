//! Cross-platform bridge: per-platform preferences and state documents,
//! notifications, and a live event stream.
//!
//! Documents are keyed by `(user_id, platform)`. Reads go through the shared
//! TTL cache; writes upsert, drop the cached copy and publish a bridge event.

use std::convert::Infallible;
use std::time::Duration;

use axum::{Extension, Json};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::Stream;
use neothink_baas::{decode_first, fetch, insert_one};
use neothink_core::{Notification, Platform, tables};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::ServerState;
use super::common::{clamp_limit, required_text};
use crate::auth::{AuthUser, bearer_token_str};
use crate::bridge::{BridgeEvent, BridgeEventKind};
use crate::models::{ApiResponse, ApiResult, ErrorResponse, ok};

const MAX_TITLE_CHARS: usize = 200;
const MAX_BODY_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct PlatformQuery {
    pub platform: Option<Platform>,
}

/// The two per-platform documents a user owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    Preferences,
    State,
}

impl Document {
    fn table(&self) -> &'static str {
        match self {
            Document::Preferences => tables::PREFERENCES,
            Document::State => tables::STATE,
        }
    }

    fn field(&self) -> &'static str {
        match self {
            Document::Preferences => "preferences",
            Document::State => "state",
        }
    }

    fn event_kind(&self) -> BridgeEventKind {
        match self {
            Document::Preferences => BridgeEventKind::PreferencesUpdated,
            Document::State => BridgeEventKind::StateUpdated,
        }
    }

    pub fn cache_key(&self, platform: Platform, user_id: &str) -> String {
        format!("{}:{}:{}", self.field(), platform, user_id)
    }
}

fn document_row(
    user_id: &str,
    platform: Platform,
    doc: Document,
    body: Value,
    updated_at: Value,
) -> Value {
    let mut row = Map::new();
    row.insert("user_id".to_string(), json!(user_id));
    row.insert("platform".to_string(), json!(platform));
    row.insert(doc.field().to_string(), body);
    row.insert("updated_at".to_string(), updated_at);
    Value::Object(row)
}

async fn read_document(
    state: &ServerState,
    user: &AuthUser,
    doc: Document,
    platform: Platform,
) -> ApiResult<Value> {
    let key = doc.cache_key(platform, user.id());
    if let Some(cached) = state.cache.get(&key).await {
        return Ok(cached);
    }

    let query = neothink_baas::Query::new()
        .eq("user_id", user.id())
        .eq("platform", platform)
        .limit(1);
    let rows = user.tables().select(doc.table(), &query).await?;
    let value = match rows.into_iter().next() {
        Some(row) => row,
        None => document_row(user.id(), platform, doc, json!({}), Value::Null),
    };
    state.cache.put(key, value.clone()).await;
    Ok(value)
}

async fn write_document(
    state: &ServerState,
    user: &AuthUser,
    doc: Document,
    platform: Platform,
    body: Value,
) -> ApiResult<Value> {
    if !body.is_object() {
        return Err(ErrorResponse::validation(format!(
            "{} must be a JSON object",
            doc.field()
        )));
    }
    let row = document_row(user.id(), platform, doc, body, json!(Utc::now()));
    let stored = user
        .tables()
        .upsert(doc.table(), row, &["user_id", "platform"])
        .await?;

    state
        .cache
        .invalidate(&doc.cache_key(platform, user.id()))
        .await;
    let delivered = state.bridge.publish(BridgeEvent::new(
        doc.event_kind(),
        user.id(),
        platform,
        stored.get(doc.field()).cloned().unwrap_or(Value::Null),
    ));
    tracing::debug!(
        category = "bridge",
        kind = doc.event_kind().as_str(),
        platform = %platform,
        delivered,
        "Bridge document updated"
    );
    Ok(stored)
}

/// `GET /api/bridge/preferences?platform=`
pub async fn get_preferences_handler(
    State(state): State<ServerState>,
    user: AuthUser,
    Query(params): Query<PlatformQuery>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let platform = params.platform.unwrap_or(user.platform);
    Ok(ok(
        read_document(&state, &user, Document::Preferences, platform).await?,
    ))
}

/// `PUT /api/bridge/preferences?platform=`
pub async fn put_preferences_handler(
    State(state): State<ServerState>,
    user: AuthUser,
    Query(params): Query<PlatformQuery>,
    Json(body): Json<Value>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let platform = params.platform.unwrap_or(user.platform);
    Ok(ok(
        write_document(&state, &user, Document::Preferences, platform, body).await?,
    ))
}

/// `GET /api/bridge/state?platform=`
pub async fn get_state_handler(
    State(state): State<ServerState>,
    user: AuthUser,
    Query(params): Query<PlatformQuery>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let platform = params.platform.unwrap_or(user.platform);
    Ok(ok(
        read_document(&state, &user, Document::State, platform).await?,
    ))
}

/// `PUT /api/bridge/state?platform=`
pub async fn put_state_handler(
    State(state): State<ServerState>,
    user: AuthUser,
    Query(params): Query<PlatformQuery>,
    Json(body): Json<Value>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let platform = params.platform.unwrap_or(user.platform);
    Ok(ok(
        write_document(&state, &user, Document::State, platform, body).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    /// Defaults to the caller.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Defaults to the request's platform. Ignored when `broadcast` is set.
    #[serde(default)]
    pub platform: Option<Platform>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub broadcast: bool,
}

/// `POST /api/bridge/notifications`
///
/// Sending to anyone other than yourself requires the admin role.
pub async fn send_notification_handler(
    State(state): State<ServerState>,
    user: AuthUser,
    Json(req): Json<SendNotificationRequest>,
) -> ApiResult<Response> {
    let target = req.user_id.unwrap_or_else(|| user.id().to_string());
    if target != user.id() && !user.user.is_admin() {
        return Err(ErrorResponse::forbidden(
            "Admin access required to notify other users",
        ));
    }
    let title = required_text("title", &req.title, MAX_TITLE_CHARS)?;
    let body = required_text("body", &req.body, MAX_BODY_CHARS)?;

    let platforms: Vec<Platform> = if req.broadcast {
        Platform::ALL.to_vec()
    } else {
        vec![req.platform.unwrap_or(user.platform)]
    };

    // Rows for other users are outside the caller's row-level policies.
    let mut sent = Vec::with_capacity(platforms.len());
    for platform in platforms {
        let service = state.clients.service_for(platform);
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: target.clone(),
            platform,
            title: title.clone(),
            body: body.clone(),
            read: false,
            created_at: Utc::now(),
        };
        let stored = insert_one(service.as_ref(), tables::NOTIFICATIONS, &notification).await?;
        let payload = serde_json::to_value(&stored).unwrap_or(Value::Null);
        state.bridge.publish(BridgeEvent::new(
            BridgeEventKind::Notification,
            &stored.user_id,
            stored.platform,
            payload,
        ));
        sent.push(stored);
    }

    tracing::info!(
        category = "bridge",
        sender = %user.id(),
        recipient = %target,
        count = sent.len(),
        "Notifications sent"
    );
    Ok((StatusCode::CREATED, ok(sent)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub platform: Option<Platform>,
    pub limit: Option<usize>,
}

/// `GET /api/bridge/notifications`, newest first, across all platforms
/// unless `platform` is given.
pub async fn list_notifications_handler(
    user: AuthUser,
    Query(params): Query<ListNotificationsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Notification>>>> {
    let mut query = neothink_baas::Query::new().eq("user_id", user.id());
    if let Some(platform) = params.platform {
        query = query.eq("platform", platform);
    }
    if params.unread_only {
        query = query.eq("read", false);
    }
    let query = query
        .order_desc("created_at")
        .limit(clamp_limit(params.limit, 50, 200));

    let store = user.tables();
    let rows = fetch(store.as_ref(), tables::NOTIFICATIONS, &query).await?;
    Ok(ok(rows))
}

/// `POST /api/bridge/notifications/:id/read`
pub async fn mark_notification_read_handler(
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Notification>>> {
    let query = neothink_baas::Query::new()
        .eq("id", id)
        .eq("user_id", user.id());
    let rows = user
        .tables()
        .update(tables::NOTIFICATIONS, &query, json!({ "read": true }))
        .await?;
    Ok(ok(decode_first(rows, "notification")?))
}

#[derive(Debug, Deserialize)]
pub struct EventStreamParams {
    /// `EventSource` cannot set headers, so the token may come as a query
    /// parameter instead.
    pub token: Option<String>,
}

/// `GET /api/bridge/events`
///
/// Streams the caller's bridge events from every platform.
pub async fn bridge_events_handler(
    State(state): State<ServerState>,
    Extension(platform): Extension<Platform>,
    Query(params): Query<EventStreamParams>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let token = bearer_token_str(&headers)
        .map(str::to_string)
        .or(params.token)
        .ok_or_else(|| ErrorResponse::unauthorized("Missing bearer token"))?;
    let user = AuthUser::from_token(&state, platform, token).await?;
    let user_id = user.id().to_string();

    let rx = state.bridge.subscribe();
    tracing::debug!(category = "bridge", user_id = %user_id, "Event stream opened");

    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.user_id != user_id {
                        continue;
                    }
                    let sse_event = Event::default()
                        .event(event.kind.as_str())
                        .json_data(&event)
                        .unwrap_or_else(|_| Event::default().data(""));
                    yield Ok(sse_event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(category = "bridge", skipped, "Event stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keepalive"),
    ))
}
