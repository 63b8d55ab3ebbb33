//! The security pipeline as a single axum middleware.

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use neothink_core::{Platform, SecurityEvent, SecurityEventType, Severity, select_budget};
use serde_json::json;

use super::csrf::{CSRF_COOKIE, CSRF_HEADER, CsrfFailure, cookie_value};
use super::events::redact_headers;
use super::headers::CspNonce;
use super::rate_limit::{RateLimitDecision, RateLimitExceeded, identifier};
use crate::auth::bearer_token_str;
use crate::server::ServerState;
use crate::timing::RequestTimings;

/// Client address as seen by the pipeline, for handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Client address for rate limiting and events.
///
/// When the peer is one of `trusted` proxies, the first `X-Forwarded-For`
/// entry wins, then `X-Real-IP`. Otherwise the peer address is used and the
/// forwarding headers are ignored.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> String {
    let peer_ip = peer.map(|addr| addr.ip().to_canonical());
    let peer_str = || {
        peer_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    };
    if !peer_ip.is_some_and(|ip| trusted.contains(&ip)) {
        return peer_str();
    }

    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .unwrap_or_else(peer_str)
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn is_exempt(exempt: &[String], path: &str) -> bool {
    exempt.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Terminal outcomes of the pipeline.
#[derive(Debug)]
enum Rejection {
    UnknownPlatform,
    RateLimited(u64),
    Suspicious,
    Csrf,
    Internal,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Rejection::UnknownPlatform => (StatusCode::NOT_FOUND, "Unknown platform"),
            Rejection::RateLimited(retry_after_secs) => {
                return RateLimitExceeded { retry_after_secs }.into_response();
            }
            Rejection::Suspicious => (StatusCode::BAD_REQUEST, "Bad Request"),
            Rejection::Csrf => (StatusCode::FORBIDDEN, "Invalid CSRF Token"),
            Rejection::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

/// Request facts recorded with every security event.
struct RequestFacts {
    platform: Platform,
    ip: String,
    method: String,
    path: String,
    user_agent: String,
    headers: serde_json::Value,
    bearer: Option<String>,
}

impl RequestFacts {
    fn event(&self, event_type: SecurityEventType, severity: Severity) -> SecurityEvent {
        SecurityEvent::new(self.platform, event_type, severity)
            .with_request(&self.ip, &self.method, &self.path)
            .with_headers(self.headers.clone())
            .with_context(json!({ "user_agent": self.user_agent }))
    }

    /// Persist `event`, attributed to the bearer token's user when the token
    /// resolves. Tokens are only looked up here, never on the happy path.
    async fn record(&self, state: &ServerState, event: SecurityEvent) {
        let user_id = match &self.bearer {
            Some(token) => state
                .clients
                .client(self.platform)
                .auth
                .get_user(token)
                .await
                .ok()
                .map(|user| user.id),
            None => None,
        };
        state.security_log.log_event(event.with_user(user_id)).await;
    }
}

/// Security pipeline middleware.
///
/// Installs [`Platform`], [`ClientIp`] and [`CspNonce`] into the request
/// extensions for handlers.
pub async fn security_middleware(
    State(state): State<ServerState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let mut timings = RequestTimings::start();

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default()
        .to_string();
    let platform = match state.resolver.resolve(&host) {
        Some(platform) => platform,
        None => {
            tracing::warn!(category = "security", host = %host, "Unknown platform");
            return Rejection::UnknownPlatform.into_response();
        }
    };
    timings.mark("platform");

    let path = request.uri().path().to_string();
    let facts = RequestFacts {
        platform,
        ip: client_ip(
            request.headers(),
            connect_info.map(|ConnectInfo(addr)| addr),
            &state.config.security.trusted_proxies,
        ),
        method: request.method().to_string(),
        path: path.clone(),
        user_agent: request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        headers: redact_headers(request.headers()),
        bearer: bearer_token_str(request.headers()).map(str::to_string),
    };

    if let Some(budget) = select_budget(&state.config.security.rate_limits, &path) {
        let key = identifier(platform, &facts.ip, &path);
        match state.rate_limiter.hit(&key, *budget, Utc::now()).await {
            Ok(RateLimitDecision::Allowed { .. }) => {}
            Ok(RateLimitDecision::Limited { retry_after_secs }) => {
                let event = facts
                    .event(SecurityEventType::RateLimitExceeded, Severity::Medium)
                    .with_details(json!({
                        "identifier": key,
                        "max_requests": budget.max_requests,
                        "window_secs": budget.window_secs,
                        "retry_after": retry_after_secs,
                    }));
                facts.record(&state, event).await;
                return Rejection::RateLimited(retry_after_secs).into_response();
            }
            Err(e) => {
                tracing::error!(category = "security", error = %e, "Rate limit check failed");
                return Rejection::Internal.into_response();
            }
        }
    }
    timings.mark("rate_limit");

    if let Some(kind) = state.detector.detect(&path, request.uri().query()) {
        let event = facts
            .event(SecurityEventType::SuspiciousActivity, Severity::High)
            .with_details(json!({
                "pattern": kind.as_str(),
                "query": request.uri().query(),
            }))
            .suspicious();
        facts.record(&state, event).await;
        return Rejection::Suspicious.into_response();
    }
    timings.mark("patterns");

    if is_mutating(request.method())
        && !is_exempt(&state.config.security.csrf_exempt_paths, &path)
    {
        let header_token = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let cookie_token = cookie_value(request.headers(), CSRF_COOKIE);
        let verdict = state
            .csrf
            .validate_token(
                platform,
                header_token.as_deref(),
                cookie_token.as_deref(),
                &facts.user_agent,
            )
            .await;
        match verdict {
            Ok(Ok(())) => {}
            Ok(Err(failure)) => {
                log_csrf_failure(&state, &facts, failure).await;
                return Rejection::Csrf.into_response();
            }
            Err(e) => {
                tracing::error!(category = "security", error = %e, "CSRF check failed");
                return Rejection::Internal.into_response();
            }
        }
    }
    timings.mark("csrf");

    let nonce = CspNonce::generate();
    request.extensions_mut().insert(platform);
    request.extensions_mut().insert(ClientIp(facts.ip.clone()));
    request.extensions_mut().insert(nonce.clone());

    let mut response = next.run(request).await;
    timings.mark("handler");

    state.headers.apply(response.headers_mut(), &nonce);
    let server_timing = timings.server_timing();
    if let Ok(value) = HeaderValue::from_str(&server_timing) {
        response.headers_mut().insert("server-timing", value);
    }
    tracing::debug!(
        category = "http",
        platform = %platform,
        method = %facts.method,
        path = %facts.path,
        status = response.status().as_u16(),
        timings = %server_timing,
        "Request complete"
    );
    response
}

async fn log_csrf_failure(state: &ServerState, facts: &RequestFacts, failure: CsrfFailure) {
    let event = facts
        .event(SecurityEventType::CsrfValidationFailed, Severity::High)
        .with_details(json!({ "reason": failure.as_str() }));
    facts.record(state, event).await;
}
