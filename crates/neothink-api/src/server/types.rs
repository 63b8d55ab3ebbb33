//! Shared server state.

use std::sync::Arc;
use std::time::Duration;

use neothink_baas::{ClientFactory, INCREMENT_RATE_LIMIT};
use neothink_core::{Config, PlatformResolver, RateLimitBackend};

use crate::bridge::BridgeHub;
use crate::cache::TtlCache;
use crate::security::{
    BaasRateLimitStore, CsrfService, MemoryRateLimitStore, PatternDetector, RateLimitStore,
    SecurityHeaders, SecurityLogger,
};

/// Maximum request body size (1 MiB).
pub const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024;

/// Everything handlers and the security pipeline share.
///
/// Built once at startup; every field is cheap to clone.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub clients: Arc<ClientFactory>,
    pub resolver: PlatformResolver,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub detector: Arc<PatternDetector>,
    pub csrf: CsrfService,
    pub headers: Arc<SecurityHeaders>,
    pub security_log: SecurityLogger,
    pub cache: TtlCache,
    pub bridge: BridgeHub,
    /// Unix timestamp of startup.
    pub started_at: i64,
}

impl ServerState {
    /// Build clients from the configuration and assemble the state.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let clients = ClientFactory::from_settings(&config.baas)?;
        Self::with_clients(config, clients)
    }

    /// Assemble the state around an existing client factory.
    pub fn with_clients(config: Config, clients: ClientFactory) -> anyhow::Result<Self> {
        let services = clients.services();

        // Counter identifiers carry the platform, so one project holds them all.
        let rate_limiter: Arc<dyn RateLimitStore> = match config.security.rate_limit_backend {
            RateLimitBackend::Memory => Arc::new(MemoryRateLimitStore::new()),
            RateLimitBackend::Baas => {
                tracing::warn!(
                    category = "security",
                    procedure = INCREMENT_RATE_LIMIT,
                    "BaaS rate limiting requires crates/neothink-baas/sql/increment_rate_limit.sql \
                     to be deployed; requests fail with 500 until it is"
                );
                Arc::new(BaasRateLimitStore::new(clients.service()))
            }
        };

        let mut origins: Vec<String> = config.platform_urls.values().cloned().collect();
        if config.baas.default.url.starts_with("http") {
            origins.push(config.baas.default.url.clone());
        }
        origins.extend(config.baas.overrides.values().map(|e| e.url.clone()));

        Ok(Self {
            resolver: PlatformResolver::new()
                .with_dev_fallback(config.security.dev_fallback_platform),
            rate_limiter,
            detector: Arc::new(PatternDetector::new()?),
            csrf: CsrfService::new(
                services.clone(),
                Duration::from_secs(config.security.csrf_ttl_secs),
                config.cookie_domain.clone(),
            ),
            headers: Arc::new(SecurityHeaders::new(origins)),
            security_log: SecurityLogger::new(services),
            cache: TtlCache::new(Duration::from_secs(config.cache_ttl_secs)),
            bridge: BridgeHub::new(),
            clients: Arc::new(clients),
            config: Arc::new(config),
            started_at: chrono::Utc::now().timestamp(),
        })
    }
}
