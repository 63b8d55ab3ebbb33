//! User feedback and its admin review queue.

use axum::Json;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use neothink_baas::{decode_first, fetch, insert_one};
use neothink_core::{Feedback, FeedbackStatus, tables};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::common::{clamp_limit, required_text};
use crate::auth::{AdminUser, AuthUser};
use crate::models::{ApiResponse, ApiResult, ErrorResponse, ok};

const MAX_CATEGORY_CHARS: usize = 50;
const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct SubmitFeedbackRequest {
    pub category: String,
    pub rating: u8,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListFeedbackQuery {
    pub status: Option<FeedbackStatus>,
    pub category: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFeedbackRequest {
    pub status: FeedbackStatus,
}

/// `POST /api/feedback`
pub async fn submit_feedback_handler(
    user: AuthUser,
    Json(req): Json<SubmitFeedbackRequest>,
) -> ApiResult<Response> {
    if !(1..=5).contains(&req.rating) {
        return Err(ErrorResponse::validation("rating must be between 1 and 5"));
    }
    let feedback = Feedback {
        id: Uuid::new_v4(),
        platform: user.platform,
        user_id: user.id().to_string(),
        category: required_text("category", &req.category, MAX_CATEGORY_CHARS)?
            .to_ascii_lowercase(),
        rating: req.rating,
        message: required_text("message", &req.message, MAX_MESSAGE_CHARS)?,
        status: FeedbackStatus::New,
        created_at: Utc::now(),
    };

    let store = user.tables();
    let stored = insert_one(store.as_ref(), tables::FEEDBACK, &feedback).await?;
    tracing::info!(
        category = "feedback",
        platform = %stored.platform,
        rating = stored.rating,
        "Feedback submitted"
    );
    Ok((StatusCode::CREATED, ok(stored)).into_response())
}

/// `GET /api/admin/feedback`, newest first.
pub async fn list_feedback_handler(
    AdminUser(admin): AdminUser,
    Query(params): Query<ListFeedbackQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Feedback>>>> {
    let mut query = neothink_baas::Query::new().eq("platform", admin.platform);
    if let Some(status) = params.status {
        query = query.eq("status", status);
    }
    if let Some(category) = params.category {
        query = query.eq("category", category.to_ascii_lowercase());
    }
    let query = query
        .order_desc("created_at")
        .limit(clamp_limit(params.limit, 100, 500));

    let store = admin.tables();
    let rows = fetch(store.as_ref(), tables::FEEDBACK, &query).await?;
    Ok(ok(rows))
}

/// `PATCH /api/admin/feedback/:id`
pub async fn update_feedback_handler(
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFeedbackRequest>,
) -> ApiResult<Json<ApiResponse<Feedback>>> {
    let query = neothink_baas::Query::new()
        .eq("id", id)
        .eq("platform", admin.platform);
    let rows = admin
        .tables()
        .update(tables::FEEDBACK, &query, json!({ "status": req.status }))
        .await?;
    let updated: Feedback = decode_first(rows, "feedback")?;

    tracing::info!(
        category = "feedback",
        id = %id,
        status = ?req.status,
        admin = %admin.id(),
        "Feedback status updated"
    );
    Ok(ok(updated))
}
