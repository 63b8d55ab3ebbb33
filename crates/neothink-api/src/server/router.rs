//! Route table.

use std::any::Any;

use axum::Router;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::types::{MAX_REQUEST_BODY_SIZE, ServerState};
use crate::handlers::{analytics, auth, basic, bridge, chat, csrf, feedback};
use crate::models::ErrorResponse;
use crate::security::security_middleware;

/// Build the application router.
pub fn create_router(state: ServerState) -> Router {
    with_security_layers(api_routes(), state)
}

/// Every API route, without middleware.
pub fn api_routes() -> Router<ServerState> {
    let public_routes = Router::new()
        .route("/api/health", get(basic::health_handler))
        .route("/api/health/status", get(basic::health_status_handler))
        .route("/api/csrf-token", get(csrf::csrf_token_handler))
        .route("/api/auth/sign-in", post(auth::sign_in_handler))
        .route("/api/auth/login", post(auth::sign_in_handler))
        .route("/api/auth/sign-up", post(auth::sign_up_handler))
        .route("/api/auth/reset-password", post(auth::reset_password_handler))
        .route(
            "/api/chat/:room/messages",
            get(chat::list_messages_handler).post(chat::post_message_handler),
        );

    let user_routes = Router::new()
        .route(
            "/api/auth/user",
            get(auth::get_user_handler).put(auth::update_user_handler),
        )
        .route("/api/feedback", post(feedback::submit_feedback_handler))
        .route(
            "/api/bridge/preferences",
            get(bridge::get_preferences_handler).put(bridge::put_preferences_handler),
        )
        .route(
            "/api/bridge/state",
            get(bridge::get_state_handler).put(bridge::put_state_handler),
        )
        .route(
            "/api/bridge/notifications",
            get(bridge::list_notifications_handler).post(bridge::send_notification_handler),
        )
        .route(
            "/api/bridge/notifications/:id/read",
            post(bridge::mark_notification_read_handler),
        )
        .route("/api/bridge/events", get(bridge::bridge_events_handler));

    let admin_routes = Router::new()
        .route("/api/admin/feedback", get(feedback::list_feedback_handler))
        .route(
            "/api/admin/feedback/:id",
            patch(feedback::update_feedback_handler),
        )
        .route(
            "/api/admin/analytics/summary",
            get(analytics::analytics_summary_handler),
        );

    public_routes.merge(user_routes).merge(admin_routes)
}

/// Wrap `routes` in the panic guard, the security pipeline, tracing and the
/// body limit.
///
/// Every request, including unmatched ones, passes through the security
/// pipeline before routing.
pub fn with_security_layers(routes: Router<ServerState>, state: ServerState) -> Router {
    routes
        .fallback(|| async { ErrorResponse::not_found("Route") })
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            security_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_SIZE))
        .with_state(state)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(category = "http", panic = %detail, "Handler panicked");
    ErrorResponse::internal("Internal server error").into_response()
}
