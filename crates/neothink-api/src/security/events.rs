//! Best-effort persistence of security events and auth audit rows.

use axum::http::HeaderMap;
use neothink_baas::{ServiceStores, encode_row};
use neothink_core::{Platform, SecurityEvent, SecurityLog, tables};
use serde_json::{Map, Value};

const REDACTED: &str = "[REDACTED]";

/// Headers whose values never reach the `security_events` table.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-csrf-token",
    "x-api-key",
    "apikey",
];

/// Request headers as a JSON object with credentials redacted.
pub fn redact_headers(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for (name, value) in headers {
        let key = name.as_str();
        let value = if SENSITIVE_HEADERS.contains(&key) {
            REDACTED.to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        out.insert(key.to_string(), Value::String(value));
    }
    Value::Object(out)
}

/// Writes to `security_events` and `security_logs` in the project of the
/// row's platform. Failures are logged and swallowed; they never change the
/// response of the request being audited.
#[derive(Clone)]
pub struct SecurityLogger {
    stores: ServiceStores,
}

impl SecurityLogger {
    pub fn new(stores: ServiceStores) -> Self {
        Self { stores }
    }

    pub async fn log_event(&self, event: SecurityEvent) {
        tracing::warn!(
            category = "security",
            platform = %event.platform,
            event_type = event.event_type.as_str(),
            severity = event.severity.as_str(),
            ip = %event.request_ip,
            method = %event.request_method,
            path = %event.request_path,
            "Security event"
        );
        if let Err(e) = self.insert(event.platform, tables::SECURITY_EVENTS, &event).await {
            tracing::error!(
                category = "security",
                error = %e,
                "Failed to persist security event"
            );
        }
    }

    pub async fn log_auth(&self, entry: SecurityLog) {
        tracing::info!(
            category = "audit",
            platform = %entry.platform,
            action = %entry.action,
            outcome = ?entry.outcome,
            user_id = entry.user_id.as_deref().unwrap_or("-"),
            ip = %entry.ip,
            "Auth action"
        );
        if let Err(e) = self.insert(entry.platform, tables::SECURITY_LOGS, &entry).await {
            tracing::error!(
                category = "audit",
                error = %e,
                "Failed to persist security log"
            );
        }
    }

    async fn insert<T: serde::Serialize + Sync>(
        &self,
        platform: Platform,
        table: &str,
        row: &T,
    ) -> neothink_baas::Result<()> {
        self.stores
            .get(platform)
            .insert(table, vec![encode_row(row)?])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use neothink_baas::{Error, MemoryBaas, Query, TableStore};
    use neothink_core::{SecurityEventType, Severity};

    /// Store whose writes always fail.
    struct Broken;

    #[async_trait]
    impl TableStore for Broken {
        async fn select(&self, _: &str, _: &Query) -> neothink_baas::Result<Vec<Value>> {
            Err(Error::Unsupported("select".into()))
        }
        async fn insert(&self, _: &str, _: Vec<Value>) -> neothink_baas::Result<Vec<Value>> {
            Err(Error::Status { status: 503, body: "down".into() })
        }
        async fn upsert(&self, _: &str, _: Value, _: &[&str]) -> neothink_baas::Result<Value> {
            Err(Error::Unsupported("upsert".into()))
        }
        async fn update(&self, _: &str, _: &Query, _: Value) -> neothink_baas::Result<Vec<Value>> {
            Err(Error::Unsupported("update".into()))
        }
        async fn delete(&self, _: &str, _: &Query) -> neothink_baas::Result<Vec<Value>> {
            Err(Error::Unsupported("delete".into()))
        }
        async fn count(&self, _: &str, _: &Query) -> neothink_baas::Result<u64> {
            Err(Error::Unsupported("count".into()))
        }
        async fn rpc(&self, _: &str, _: Value) -> neothink_baas::Result<Value> {
            Err(Error::Unsupported("rpc".into()))
        }
        fn as_user(&self, _: &str) -> Arc<dyn TableStore> {
            Arc::new(Broken)
        }
    }

    fn event() -> SecurityEvent {
        SecurityEvent::new(
            Platform::Hub,
            SecurityEventType::CsrfValidationFailed,
            Severity::High,
        )
        .with_request("10.0.0.1", "POST", "/api/feedback")
    }

    #[test]
    fn test_redact_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("cookie", HeaderValue::from_static("csrf_token=abc"));
        headers.insert("x-csrf-token", HeaderValue::from_static("abc"));
        headers.insert("user-agent", HeaderValue::from_static("agent/1.0"));

        let json = redact_headers(&headers);
        assert_eq!(json["authorization"], REDACTED);
        assert_eq!(json["cookie"], REDACTED);
        assert_eq!(json["x-csrf-token"], REDACTED);
        assert_eq!(json["user-agent"], "agent/1.0");
    }

    #[tokio::test]
    async fn test_log_event_persists() {
        let baas = MemoryBaas::new();
        let logger = SecurityLogger::new(ServiceStores::shared(Arc::new(baas.clone())));
        logger.log_event(event()).await;

        let rows = baas.rows(tables::SECURITY_EVENTS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["event_type"], "csrf_validation_failed");
        assert_eq!(rows[0]["request_path"], "/api/feedback");
    }

    #[tokio::test]
    async fn test_rows_go_to_the_platform_project() {
        let shared = MemoryBaas::new();
        let immortals = MemoryBaas::new();
        let stores = {
            let shared: Arc<dyn TableStore> = Arc::new(shared.clone());
            let immortals: Arc<dyn TableStore> = Arc::new(immortals.clone());
            ServiceStores::per_platform(|platform| match platform {
                Platform::Immortals => immortals.clone(),
                _ => shared.clone(),
            })
        };
        let logger = SecurityLogger::new(stores);

        logger.log_event(event()).await;
        let mut other = event();
        other.platform = Platform::Immortals;
        logger.log_event(other).await;

        assert_eq!(shared.rows(tables::SECURITY_EVENTS).len(), 1);
        let rows = immortals.rows(tables::SECURITY_EVENTS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["platform"], "immortals");
    }

    #[tokio::test]
    async fn test_log_failure_is_swallowed() {
        let logger = SecurityLogger::new(ServiceStores::shared(Arc::new(Broken)));
        logger.log_event(event()).await;
    }
}
