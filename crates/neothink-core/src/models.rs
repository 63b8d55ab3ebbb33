//! Rows of the BaaS tables this service reads and writes.
//!
//! The schemas are owned by the database migrations; these types only mirror
//! the columns the service touches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::platform::Platform;

/// Table names.
pub mod tables {
    pub const SECURITY_EVENTS: &str = "security_events";
    pub const SECURITY_LOGS: &str = "security_logs";
    pub const RATE_LIMITS: &str = "rate_limits";
    pub const CSRF_TOKENS: &str = "csrf_tokens";
    pub const MESSAGES: &str = "messages";
    pub const FEEDBACK: &str = "feedback";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const PREFERENCES: &str = "user_platform_preferences";
    pub const STATE: &str = "user_platform_state";
}

/// Security event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Kind of flagged request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    RateLimitExceeded,
    SuspiciousActivity,
    CsrfValidationFailed,
    /// Written by other services sharing the table.
    #[serde(other)]
    Other,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::SuspiciousActivity => "suspicious_activity",
            SecurityEventType::CsrfValidationFailed => "csrf_validation_failed",
            SecurityEventType::Other => "other",
        }
    }
}

/// A flagged request. Insert-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub platform: Platform,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    #[serde(default)]
    pub user_id: Option<String>,
    pub request_ip: String,
    pub request_path: String,
    pub request_method: String,
    #[serde(default)]
    pub request_headers: serde_json::Value,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub details: serde_json::Value,
    pub suspicious_activity: bool,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(platform: Platform, event_type: SecurityEventType, severity: Severity) -> Self {
        Self {
            id: None,
            platform,
            event_type,
            severity,
            user_id: None,
            request_ip: "unknown".to_string(),
            request_path: String::new(),
            request_method: String::new(),
            request_headers: serde_json::Value::Object(Default::default()),
            context: serde_json::Value::Object(Default::default()),
            details: serde_json::Value::Object(Default::default()),
            suspicious_activity: false,
            created_at: Utc::now(),
        }
    }

    /// Set the request coordinates.
    pub fn with_request(
        mut self,
        ip: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.request_ip = ip.into();
        self.request_method = method.into();
        self.request_path = path.into();
        self
    }

    pub fn with_headers(mut self, headers: serde_json::Value) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn suspicious(mut self) -> Self {
        self.suspicious_activity = true;
        self
    }
}

/// Outcome of an audited auth action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// Auth audit trail row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityLog {
    pub platform: Platform,
    #[serde(default)]
    pub user_id: Option<String>,
    pub action: String,
    pub outcome: Outcome,
    pub ip: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fixed-window request counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// `platform:ip:path`
    pub identifier: String,
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Stored CSRF token. Only the SHA-256 of the token is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfToken {
    pub token_hash: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Chat room message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub platform: Platform,
    pub room: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Review state of a feedback item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    #[default]
    New,
    Reviewed,
    Resolved,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::New => "new",
            FeedbackStatus::Reviewed => "reviewed",
            FeedbackStatus::Resolved => "resolved",
        }
    }
}

/// User feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub platform: Platform,
    pub user_id: String,
    pub category: String,
    pub rating: u8,
    pub message: String,
    #[serde(default)]
    pub status: FeedbackStatus,
    pub created_at: DateTime<Utc>,
}

/// In-app notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub platform: Platform,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-user, per-platform preferences document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformPreference {
    pub user_id: String,
    pub platform: Platform,
    pub preferences: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Per-user, per-platform UI state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformState {
    pub user_id: String,
    pub platform: Platform,
    pub state: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_event_serialization() {
        let event = SecurityEvent::new(
            Platform::Hub,
            SecurityEventType::SuspiciousActivity,
            Severity::High,
        )
        .with_request("10.0.0.1", "GET", "/api/x")
        .suspicious();

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["platform"], "hub");
        assert_eq!(json["event_type"], "suspicious_activity");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["suspicious_activity"], true);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_unknown_event_type_deserializes() {
        let mut json = serde_json::to_value(SecurityEvent::new(
            Platform::Hub,
            SecurityEventType::RateLimitExceeded,
            Severity::Medium,
        ))
        .unwrap();
        json["event_type"] = serde_json::json!("login_anomaly");
        let event: SecurityEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.event_type, SecurityEventType::Other);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }
}
