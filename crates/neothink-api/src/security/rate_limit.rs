//! Fixed-window rate limiting keyed by `platform:ip:path`.
//!
//! Each hit is one atomic read-modify-write: the in-memory store holds the
//! key's shard lock for the update, the BaaS store calls a stored procedure.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use neothink_baas::{INCREMENT_RATE_LIMIT, TableStore};
use neothink_core::{Platform, RateBudget, RateLimitRecord};
use serde::Deserialize;
use serde_json::json;

/// Counter key for one client on one path.
pub fn identifier(platform: Platform, ip: &str, path: &str) -> String {
    format!("{}:{}:{}", platform, ip, path)
}

/// Outcome of one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { count: u32, limit: u32 },
    Limited { retry_after_secs: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

fn window_end(window_start: DateTime<Utc>, budget: RateBudget) -> DateTime<Utc> {
    window_start + chrono::Duration::seconds(budget.window_secs as i64)
}

/// Seconds until the window closes, rounded up, at least 1.
pub fn retry_after(window_start: DateTime<Utc>, budget: RateBudget, now: DateTime<Utc>) -> u64 {
    let remaining_ms = (window_end(window_start, budget) - now).num_milliseconds();
    let secs = (remaining_ms + 999).div_euclid(1000);
    secs.max(1) as u64
}

/// Apply one request to the current counter row.
///
/// - no row, or the window has elapsed: the row resets to count 1;
/// - `count >= max_requests`: rejected, row unchanged;
/// - otherwise the count is incremented.
pub fn apply_rate_limit(
    identifier: &str,
    current: Option<&RateLimitRecord>,
    budget: RateBudget,
    now: DateTime<Utc>,
) -> (RateLimitRecord, RateLimitDecision) {
    match current {
        Some(row) if now < window_end(row.window_start, budget) => {
            if row.count >= budget.max_requests {
                (
                    row.clone(),
                    RateLimitDecision::Limited {
                        retry_after_secs: retry_after(row.window_start, budget, now),
                    },
                )
            } else {
                let next = RateLimitRecord {
                    count: row.count + 1,
                    ..row.clone()
                };
                let decision = RateLimitDecision::Allowed {
                    count: next.count,
                    limit: budget.max_requests,
                };
                (next, decision)
            }
        }
        _ => (
            RateLimitRecord {
                identifier: identifier.to_string(),
                count: 1,
                window_start: now,
            },
            RateLimitDecision::Allowed {
                count: 1,
                limit: budget.max_requests,
            },
        ),
    }
}

/// Counter storage.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(
        &self,
        identifier: &str,
        budget: RateBudget,
        now: DateTime<Utc>,
    ) -> neothink_baas::Result<RateLimitDecision>;

    /// Drop rows whose window closed before `now`. Returns how many were dropped.
    async fn cleanup(&self, _now: DateTime<Utc>) -> neothink_baas::Result<usize> {
        Ok(0)
    }
}

struct Counter {
    record: RateLimitRecord,
    window_secs: u64,
}

/// Process-local counters.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    counters: DashMap<String, Counter>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(
        &self,
        identifier: &str,
        budget: RateBudget,
        now: DateTime<Utc>,
    ) -> neothink_baas::Result<RateLimitDecision> {
        let mut entry = self
            .counters
            .entry(identifier.to_string())
            .or_insert_with(|| Counter {
                record: RateLimitRecord {
                    identifier: identifier.to_string(),
                    count: 0,
                    window_start: now,
                },
                window_secs: budget.window_secs,
            });
        let current = (entry.record.count > 0).then_some(&entry.record);
        let (next, decision) = apply_rate_limit(identifier, current, budget, now);
        entry.record = next;
        entry.window_secs = budget.window_secs;
        Ok(decision)
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> neothink_baas::Result<usize> {
        let before = self.counters.len();
        self.counters.retain(|_, c| {
            now < c.record.window_start + chrono::Duration::seconds(c.window_secs as i64)
        });
        Ok(before.saturating_sub(self.counters.len()))
    }
}

#[derive(Debug, Deserialize)]
struct IncrementResult {
    count: u32,
    window_start: DateTime<Utc>,
    allowed: bool,
}

/// Counters in the `rate_limits` table, updated by `increment_rate_limit`.
pub struct BaasRateLimitStore {
    store: Arc<dyn TableStore>,
}

impl BaasRateLimitStore {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RateLimitStore for BaasRateLimitStore {
    async fn hit(
        &self,
        identifier: &str,
        budget: RateBudget,
        now: DateTime<Utc>,
    ) -> neothink_baas::Result<RateLimitDecision> {
        let args = json!({
            "identifier": identifier,
            "window_seconds": budget.window_secs,
            "max_requests": budget.max_requests,
        });
        let row: IncrementResult =
            serde_json::from_value(self.store.rpc(INCREMENT_RATE_LIMIT, args).await?)?;
        if row.allowed {
            Ok(RateLimitDecision::Allowed {
                count: row.count,
                limit: budget.max_requests,
            })
        } else {
            Ok(RateLimitDecision::Limited {
                retry_after_secs: retry_after(row.window_start, budget, now),
            })
        }
    }
}

/// 429 response.
#[derive(Debug)]
pub struct RateLimitExceeded {
    pub retry_after_secs: u64,
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let body = json!({
            "error": "Too Many Requests",
            "retry_after": self.retry_after_secs,
        });
        (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", self.retry_after_secs.to_string())],
            axum::Json(body),
        )
            .into_response()
    }
}
