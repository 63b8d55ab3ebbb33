//! API handlers.

pub mod analytics;
pub mod auth;
pub mod basic;
pub mod bridge;
pub mod chat;
pub mod common;
pub mod csrf;
pub mod feedback;

pub use crate::server::ServerState;
