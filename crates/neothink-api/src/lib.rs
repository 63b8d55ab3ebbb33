//! HTTP front end for the Neothink platforms.
//!
//! Every request passes through the security pipeline (platform resolution,
//! rate limiting, attack-pattern screening, CSRF validation, response
//! headers) before reaching the auth, chat, feedback, analytics and bridge
//! handlers.

pub mod auth;
pub mod bridge;
pub mod cache;
pub mod handlers;
pub mod models;
pub mod security;
pub mod server;
pub mod shutdown;
pub mod timing;

pub use auth::{AdminUser, AuthUser};
pub use bridge::{BridgeEvent, BridgeEventKind, BridgeHub};
pub use cache::{CacheStats, TtlCache};
pub use models::{ApiResponse, ApiResult, ErrorResponse};
pub use server::{ServerState, api_routes, cleanup_task, create_router, run, with_security_layers};
pub use timing::RequestTimings;
