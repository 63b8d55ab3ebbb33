//! Shared handler helpers.

use axum::Extension;

use crate::models::{ApiResult, ErrorResponse};
use crate::security::ClientIp;

/// Client IP recorded by the security pipeline.
pub fn ip_of(ip: Option<Extension<ClientIp>>) -> String {
    ip.map(|Extension(ClientIp(ip))| ip)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Clamp an optional `limit` parameter to `1..=max`.
pub fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(1, max)
}

/// Trimmed text of `1..=max` characters.
pub fn required_text(field: &str, value: &str, max: usize) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ErrorResponse::validation(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(ErrorResponse::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 50, 200), 50);
        assert_eq!(clamp_limit(Some(0), 50, 200), 1);
        assert_eq!(clamp_limit(Some(1000), 50, 200), 200);
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("content", "  hi  ", 10).unwrap(), "hi");
        assert!(required_text("content", "   ", 10).is_err());
        assert!(required_text("content", "ééééé", 4).is_err());
    }
}
