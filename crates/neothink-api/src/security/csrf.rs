//! Double-submit CSRF tokens.
//!
//! Tokens are handed to the client twice (response body and cookie) and must
//! come back twice (header and cookie). Only `sha256(token)` is stored, in the
//! project of the platform that issued it, and a stored token is deleted on
//! its first successful use.

use std::time::Duration;

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use chrono::{DateTime, Utc};
use neothink_baas::{Query, ServiceStores, decode_rows, encode_row};
use neothink_core::{CsrfToken, Platform, tables};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Request header carrying the token.
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Cookie carrying the token.
pub const CSRF_COOKIE: &str = "csrf_token";

/// 32 bytes from the OS RNG, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Value of cookie `name` from the `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfFailure {
    MissingHeader,
    MissingCookie,
    Mismatch,
    UnknownToken,
    Expired,
    UserAgentMismatch,
}

impl CsrfFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsrfFailure::MissingHeader => "missing_header",
            CsrfFailure::MissingCookie => "missing_cookie",
            CsrfFailure::Mismatch => "token_mismatch",
            CsrfFailure::UnknownToken => "unknown_token",
            CsrfFailure::Expired => "expired",
            CsrfFailure::UserAgentMismatch => "user_agent_mismatch",
        }
    }
}

/// A freshly issued token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token issuance and validation against the `csrf_tokens` table.
#[derive(Clone)]
pub struct CsrfService {
    stores: ServiceStores,
    ttl: Duration,
    cookie_domain: Option<String>,
}

impl CsrfService {
    pub fn new(stores: ServiceStores, ttl: Duration, cookie_domain: Option<String>) -> Self {
        Self {
            stores,
            ttl,
            cookie_domain,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist the hash of `token` for `user_agent`.
    pub async fn store_token(
        &self,
        platform: Platform,
        token: &str,
        user_id: Option<&str>,
        user_agent: &str,
    ) -> neothink_baas::Result<CsrfToken> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(1));
        let row = CsrfToken {
            token_hash: hash_token(token),
            user_id: user_id.map(str::to_string),
            expires_at: now + ttl,
            user_agent: user_agent.to_string(),
            created_at: now,
        };
        self.stores
            .get(platform)
            .insert(tables::CSRF_TOKENS, vec![encode_row(&row)?])
            .await?;
        Ok(row)
    }

    /// Generate and store a new token.
    pub async fn issue(
        &self,
        platform: Platform,
        user_id: Option<&str>,
        user_agent: &str,
    ) -> neothink_baas::Result<IssuedToken> {
        let token = generate_token();
        let row = self.store_token(platform, &token, user_id, user_agent).await?;
        Ok(IssuedToken {
            token,
            expires_at: row.expires_at,
        })
    }

    /// Check a header/cookie pair and consume the stored token.
    ///
    /// `Ok(Err(_))` is a refused token; `Err(_)` is a BaaS failure.
    pub async fn validate_token(
        &self,
        platform: Platform,
        header: Option<&str>,
        cookie: Option<&str>,
        user_agent: &str,
    ) -> neothink_baas::Result<Result<(), CsrfFailure>> {
        let header = match header.filter(|h| !h.is_empty()) {
            Some(h) => h,
            None => return Ok(Err(CsrfFailure::MissingHeader)),
        };
        let cookie = match cookie.filter(|c| !c.is_empty()) {
            Some(c) => c,
            None => return Ok(Err(CsrfFailure::MissingCookie)),
        };
        if !bool::from(header.as_bytes().ct_eq(cookie.as_bytes())) {
            return Ok(Err(CsrfFailure::Mismatch));
        }

        let store = self.stores.get(platform);
        let by_hash = Query::new().eq("token_hash", hash_token(header));
        let rows: Vec<CsrfToken> =
            decode_rows(store.select(tables::CSRF_TOKENS, &by_hash).await?)?;
        let stored = match rows.into_iter().next() {
            Some(row) => row,
            None => return Ok(Err(CsrfFailure::UnknownToken)),
        };
        if stored.expires_at <= Utc::now() {
            return Ok(Err(CsrfFailure::Expired));
        }
        if stored.user_agent != user_agent {
            return Ok(Err(CsrfFailure::UserAgentMismatch));
        }

        // A concurrent request may have consumed it between select and delete.
        let deleted = store.delete(tables::CSRF_TOKENS, &by_hash).await?;
        if deleted.is_empty() {
            return Ok(Err(CsrfFailure::UnknownToken));
        }
        Ok(Ok(()))
    }

    /// Delete expired tokens from every project. Returns how many were removed.
    pub async fn purge_expired(&self) -> neothink_baas::Result<usize> {
        let expired = Query::new().lt("expires_at", Utc::now());
        let mut removed = 0;
        for store in self.stores.distinct() {
            removed += store.delete(tables::CSRF_TOKENS, &expired).await?.len();
        }
        Ok(removed)
    }

    /// `Set-Cookie` value for `token`.
    pub fn cookie(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; Secure; SameSite=Strict",
            CSRF_COOKIE,
            token,
            self.ttl.as_secs()
        );
        if let Some(domain) = &self.cookie_domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use axum::http::HeaderValue;
    use neothink_baas::{MemoryBaas, TableStore};
    use serde_json::json;

    const HUB: Platform = Platform::Hub;

    fn service(baas: &MemoryBaas) -> CsrfService {
        CsrfService::new(
            ServiceStores::shared(Arc::new(baas.clone())),
            Duration::from_secs(3600),
            None,
        )
    }

    #[test]
    fn test_generate_token() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; csrf_token=abc; other=1"),
        );
        assert_eq!(cookie_value(&headers, CSRF_COOKIE), Some("abc".to_string()));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let baas = MemoryBaas::new();
        let plain = service(&baas).cookie("t");
        assert_eq!(plain, "csrf_token=t; Path=/; Max-Age=3600; Secure; SameSite=Strict");

        let scoped = CsrfService::new(
            ServiceStores::shared(Arc::new(baas)),
            Duration::from_secs(60),
            Some(".example.com".to_string()),
        );
        assert!(scoped.cookie("t").ends_with("; Domain=.example.com"));
    }

    #[tokio::test]
    async fn test_valid_token_is_single_use() {
        let baas = MemoryBaas::new();
        let csrf = service(&baas);
        let issued = csrf.issue(HUB, None, "agent/1.0").await.unwrap();

        let stored = baas.rows(tables::CSRF_TOKENS);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["token_hash"], hash_token(&issued.token));

        let t = Some(issued.token.as_str());
        assert_eq!(csrf.validate_token(HUB, t, t, "agent/1.0").await.unwrap(), Ok(()));
        assert!(baas.rows(tables::CSRF_TOKENS).is_empty());
        assert_eq!(
            csrf.validate_token(HUB, t, t, "agent/1.0").await.unwrap(),
            Err(CsrfFailure::UnknownToken)
        );
    }

    #[tokio::test]
    async fn test_refusals() {
        let baas = MemoryBaas::new();
        let csrf = service(&baas);
        let issued = csrf.issue(HUB, Some("u1"), "agent/1.0").await.unwrap();
        let t = Some(issued.token.as_str());

        assert_eq!(
            csrf.validate_token(HUB, None, t, "agent/1.0").await.unwrap(),
            Err(CsrfFailure::MissingHeader)
        );
        assert_eq!(
            csrf.validate_token(HUB, t, None, "agent/1.0").await.unwrap(),
            Err(CsrfFailure::MissingCookie)
        );
        assert_eq!(
            csrf.validate_token(HUB, t, Some("other"), "agent/1.0").await.unwrap(),
            Err(CsrfFailure::Mismatch)
        );
        assert_eq!(
            csrf.validate_token(HUB, t, t, "curl/8").await.unwrap(),
            Err(CsrfFailure::UserAgentMismatch)
        );
        let forged = generate_token();
        let f = Some(forged.as_str());
        assert_eq!(
            csrf.validate_token(HUB, f, f, "agent/1.0").await.unwrap(),
            Err(CsrfFailure::UnknownToken)
        );
        // Refusals do not consume the stored token.
        assert_eq!(csrf.validate_token(HUB, t, t, "agent/1.0").await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_tokens_live_in_the_issuing_project() {
        let shared = MemoryBaas::new();
        let immortals = MemoryBaas::new();
        let stores = {
            let shared: Arc<dyn neothink_baas::TableStore> = Arc::new(shared.clone());
            let immortals: Arc<dyn neothink_baas::TableStore> = Arc::new(immortals.clone());
            ServiceStores::per_platform(|platform| match platform {
                Platform::Immortals => immortals.clone(),
                _ => shared.clone(),
            })
        };
        let csrf = CsrfService::new(stores, Duration::from_secs(3600), None);

        let issued = csrf.issue(Platform::Immortals, None, "agent/1.0").await.unwrap();
        assert!(shared.rows(tables::CSRF_TOKENS).is_empty());
        assert_eq!(immortals.rows(tables::CSRF_TOKENS).len(), 1);

        let t = Some(issued.token.as_str());
        assert_eq!(
            csrf.validate_token(HUB, t, t, "agent/1.0").await.unwrap(),
            Err(CsrfFailure::UnknownToken)
        );
        assert_eq!(
            csrf.validate_token(Platform::Immortals, t, t, "agent/1.0")
                .await
                .unwrap(),
            Ok(())
        );

        csrf.issue(HUB, None, "agent/1.0").await.unwrap();
        assert_eq!(csrf.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refused_and_purged() {
        let baas = MemoryBaas::new();
        let csrf = service(&baas);
        let token = generate_token();
        baas.insert(
            tables::CSRF_TOKENS,
            vec![json!({
                "token_hash": hash_token(&token),
                "user_id": null,
                "expires_at": Utc::now() - chrono::Duration::minutes(1),
                "user_agent": "agent/1.0",
                "created_at": Utc::now() - chrono::Duration::hours(1),
            })],
        )
        .await
        .unwrap();
        csrf.issue(HUB, None, "agent/1.0").await.unwrap();

        let t = Some(token.as_str());
        assert_eq!(
            csrf.validate_token(HUB, t, t, "agent/1.0").await.unwrap(),
            Err(CsrfFailure::Expired)
        );
        assert_eq!(csrf.purge_expired().await.unwrap(), 1);
        assert_eq!(baas.rows(tables::CSRF_TOKENS).len(), 1);
    }
}
