//! Core types for the Neothink edge service.
//!
//! Platforms, configuration and the BaaS row models shared by every crate.

pub mod config;
pub mod models;
pub mod platform;

pub use config::{
    BaasEndpoint, BaasMode, BaasSettings, Config, ConfigError, RateBudget, RateLimitBackend,
    RateLimitRule, SecuritySettings, default_rate_limit_rules, select_budget,
};
pub use models::{
    ChatMessage, CsrfToken, Feedback, FeedbackStatus, Notification, Outcome, PlatformPreference,
    PlatformState, RateLimitRecord, SecurityEvent, SecurityEventType, SecurityLog, Severity,
    tables,
};
pub use platform::{Platform, PlatformResolver, UnknownPlatform, platform_from_host};
