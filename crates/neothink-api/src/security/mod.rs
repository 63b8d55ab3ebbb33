//! Request security pipeline.
//!
//! Every request runs, in order: platform resolution, rate limiting,
//! suspicious-pattern detection, CSRF validation for mutating methods, and
//! finally the handler, whose response receives the security headers.

pub mod csrf;
pub mod events;
pub mod headers;
pub mod middleware;
pub mod patterns;
pub mod rate_limit;

pub use csrf::{CSRF_COOKIE, CSRF_HEADER, CsrfFailure, CsrfService, IssuedToken, generate_token};
pub use events::{SecurityLogger, redact_headers};
pub use headers::{CspNonce, SecurityHeaders};
pub use middleware::{ClientIp, client_ip, security_middleware};
pub use patterns::{PatternDetector, PatternKind};
pub use rate_limit::{
    BaasRateLimitStore, MemoryRateLimitStore, RateLimitDecision, RateLimitExceeded,
    RateLimitStore,
};
