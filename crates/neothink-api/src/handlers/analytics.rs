//! Admin analytics summary.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Duration, Utc};
use neothink_baas::fetch;
use neothink_core::{Feedback, Platform, SecurityEvent, tables};
use serde::{Deserialize, Serialize};

use super::ServerState;
use crate::auth::AdminUser;
use crate::models::{ApiResponse, ApiResult, ErrorResponse, ok};

const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct FeedbackSummary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct SecuritySummary {
    pub total: usize,
    pub suspicious: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub platform: Platform,
    pub since: DateTime<Utc>,
    pub feedback: FeedbackSummary,
    pub security: SecuritySummary,
}

pub fn summarize_feedback(rows: &[Feedback]) -> FeedbackSummary {
    let mut summary = FeedbackSummary {
        total: rows.len(),
        ..Default::default()
    };
    let mut rating_sum = 0u64;
    for row in rows {
        *summary
            .by_status
            .entry(row.status.as_str().to_string())
            .or_default() += 1;
        *summary.by_category.entry(row.category.clone()).or_default() += 1;
        rating_sum += u64::from(row.rating);
    }
    if !rows.is_empty() {
        summary.average_rating = Some(rating_sum as f64 / rows.len() as f64);
    }
    summary
}

pub fn summarize_security(rows: &[SecurityEvent]) -> SecuritySummary {
    let mut summary = SecuritySummary {
        total: rows.len(),
        ..Default::default()
    };
    for row in rows {
        if row.suspicious_activity {
            summary.suspicious += 1;
        }
        *summary
            .by_severity
            .entry(row.severity.as_str().to_string())
            .or_default() += 1;
        *summary
            .by_type
            .entry(row.event_type.as_str().to_string())
            .or_default() += 1;
    }
    summary
}

/// `GET /api/admin/analytics/summary?days=`
pub async fn analytics_summary_handler(
    State(state): State<ServerState>,
    AdminUser(admin): AdminUser,
    Query(params): Query<SummaryQuery>,
) -> ApiResult<Json<ApiResponse<AnalyticsSummary>>> {
    let days = params.days.unwrap_or(DEFAULT_DAYS);
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(ErrorResponse::validation(format!(
            "days must be between 1 and {}",
            MAX_DAYS
        )));
    }
    let since = Utc::now() - Duration::days(days);
    let window = neothink_baas::Query::new()
        .eq("platform", admin.platform)
        .gte("created_at", since);

    let feedback_store = admin.tables();
    let feedback: Vec<Feedback> =
        fetch(feedback_store.as_ref(), tables::FEEDBACK, &window).await?;

    // Security tables are only readable with the service role.
    let service = state.clients.service_for(admin.platform);
    let events: Vec<SecurityEvent> =
        fetch(service.as_ref(), tables::SECURITY_EVENTS, &window).await?;

    Ok(ok(AnalyticsSummary {
        platform: admin.platform,
        since,
        feedback: summarize_feedback(&feedback),
        security: summarize_security(&events),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neothink_core::{FeedbackStatus, SecurityEventType, Severity};
    use uuid::Uuid;

    fn feedback(category: &str, rating: u8, status: FeedbackStatus) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            platform: Platform::Hub,
            user_id: "u1".to_string(),
            category: category.to_string(),
            rating,
            message: "m".to_string(),
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_feedback() {
        let rows = vec![
            feedback("bug", 1, FeedbackStatus::New),
            feedback("bug", 4, FeedbackStatus::Resolved),
            feedback("idea", 5, FeedbackStatus::New),
        ];
        let summary = summarize_feedback(&rows);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_status["new"], 2);
        assert_eq!(summary.by_status["resolved"], 1);
        assert_eq!(summary.by_category["bug"], 2);
        assert!((summary.average_rating.unwrap() - 10.0 / 3.0).abs() < 1e-9);

        assert_eq!(summarize_feedback(&[]).average_rating, None);
    }

    #[test]
    fn test_summarize_security() {
        let rows = vec![
            SecurityEvent::new(
                Platform::Hub,
                SecurityEventType::SuspiciousActivity,
                Severity::High,
            )
            .suspicious(),
            SecurityEvent::new(
                Platform::Hub,
                SecurityEventType::RateLimitExceeded,
                Severity::Medium,
            ),
        ];
        let summary = summarize_security(&rows);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.suspicious, 1);
        assert_eq!(summary.by_severity["high"], 1);
        assert_eq!(summary.by_type["rate_limit_exceeded"], 1);
    }
}
