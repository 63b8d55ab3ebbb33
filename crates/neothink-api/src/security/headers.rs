//! Response security headers and the per-request CSP nonce.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;

/// Nonce for inline scripts, available to handlers through request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspNonce(pub String);

impl CspNonce {
    /// 16 random bytes, base64-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const X_XSS_PROTECTION: HeaderName = HeaderName::from_static("x-xss-protection");
const X_PERMITTED_CROSS_DOMAIN_POLICIES: HeaderName =
    HeaderName::from_static("x-permitted-cross-domain-policies");

/// Fixed headers added to every forwarded response.
const FIXED: [(HeaderName, &str); 6] = [
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains",
    ),
    (X_PERMITTED_CROSS_DOMAIN_POLICIES, "none"),
];

/// Builds the `Content-Security-Policy` value.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    /// Extra `connect-src` and `form-action` origins (the tenant base URLs
    /// and the BaaS URL).
    origins: Vec<String>,
}

impl SecurityHeaders {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origins: origins
                .into_iter()
                .map(Into::into)
                .map(|o| o.trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        }
    }

    pub fn content_security_policy(&self, nonce: &CspNonce) -> String {
        let origins = self
            .origins
            .iter()
            .map(|o| format!(" {}", o))
            .collect::<String>();
        format!(
            "default-src 'self'; \
             script-src 'self' 'nonce-{nonce}' 'strict-dynamic'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             font-src 'self' data:; \
             connect-src 'self'{origins}; \
             form-action 'self'{origins}; \
             frame-ancestors 'none'; \
             base-uri 'self'; \
             object-src 'none'",
            nonce = nonce.as_str(),
            origins = origins,
        )
    }

    /// Set every security header on `headers`, replacing existing values.
    pub fn apply(&self, headers: &mut HeaderMap, nonce: &CspNonce) {
        for (name, value) in FIXED {
            headers.insert(name, HeaderValue::from_static(value));
        }
        match HeaderValue::from_str(&self.content_security_policy(nonce)) {
            Ok(value) => {
                headers.insert(header::CONTENT_SECURITY_POLICY, value);
            }
            Err(e) => {
                tracing::error!(category = "security", error = %e, "Invalid CSP header value");
                headers.insert(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static("default-src 'self'; frame-ancestors 'none'"),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_unique() {
        let a = CspNonce::generate();
        let b = CspNonce::generate();
        assert_ne!(a, b);
        assert_eq!(STANDARD.decode(a.as_str()).unwrap().len(), 16);
    }

    #[test]
    fn test_apply_sets_all_headers() {
        let headers_cfg = SecurityHeaders::new(["https://hub.example.com/"]);
        let nonce = CspNonce("abc123==".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        headers_cfg.apply(&mut headers, &nonce);

        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers["x-xss-protection"], "1; mode=block");
        assert_eq!(headers[header::REFERRER_POLICY], "strict-origin-when-cross-origin");
        assert_eq!(headers["x-permitted-cross-domain-policies"], "none");
        assert!(headers[header::STRICT_TRANSPORT_SECURITY]
            .to_str()
            .unwrap()
            .starts_with("max-age=31536000"));

        let csp = headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
        assert!(csp.contains("'nonce-abc123=='"));
        assert!(csp.contains("connect-src 'self' https://hub.example.com;"));
    }
}
