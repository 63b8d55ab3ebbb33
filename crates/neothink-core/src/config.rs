//! Service configuration.
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. `config.toml` (or the file named by `NEOTHINK_CONFIG`)
//! 3. Environment variables
//!
//! Missing BaaS credentials are fatal: [`Config::load`] returns a
//! [`ConfigError`] and the binary refuses to start.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::platform::Platform;

/// Environment variable names.
pub mod env_vars {
    pub const SUPABASE_URL: &str = "SUPABASE_URL";
    pub const SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
    pub const SUPABASE_SERVICE_ROLE_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
    pub const COOKIE_DOMAIN: &str = "COOKIE_DOMAIN";
    pub const BIND: &str = "NEOTHINK_BIND";
    pub const BAAS_MODE: &str = "NEOTHINK_BAAS";
    pub const CONFIG_PATH: &str = "NEOTHINK_CONFIG";
    pub const LOG_JSON: &str = "NEOTHINK_LOG_JSON";
    /// Comma-separated proxy addresses whose forwarding headers are honoured.
    pub const TRUSTED_PROXIES: &str = "NEOTHINK_TRUSTED_PROXIES";
}

/// Default values.
pub mod defaults {
    pub const BIND: &str = "127.0.0.1:8080";
    pub const CONFIG_FILE: &str = "config.toml";
    /// CSRF tokens live for one hour.
    pub const CSRF_TTL_SECS: u64 = 3600;
    /// Clients are told to fetch a fresh token every 15 minutes.
    pub const CSRF_REFRESH_SECS: u64 = 900;
    /// Platform bridge cache entries live for 5 minutes.
    pub const CACHE_TTL_SECS: u64 = 300;
    pub const BAAS_TIMEOUT_SECS: u64 = 10;
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Which BaaS client implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaasMode {
    /// Remote BaaS over HTTP.
    #[default]
    Rest,
    /// In-process tables, for local development and tests.
    Memory,
}

impl BaasMode {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::invalid(
                env_vars::BAAS_MODE,
                format!("expected 'rest' or 'memory', got '{}'", other),
            )),
        }
    }
}

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Process-local counters.
    Memory,
    /// `rate_limits` table, updated through the `increment_rate_limit` procedure.
    /// The procedure ships in `crates/neothink-baas/sql/increment_rate_limit.sql`
    /// and must be deployed before this backend is selected.
    Baas,
}

/// Request budget: at most `max_requests` per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateBudget {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// One entry of the ordered rate-limit table.
///
/// `prefix = None` matches every path. A prefix matches the path itself and
/// anything below it (`/api/auth` matches `/api/auth/login` but not
/// `/api/authors`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(flatten)]
    pub budget: RateBudget,
}

impl RateLimitRule {
    pub fn prefix(prefix: &str, budget: RateBudget) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            budget,
        }
    }

    pub fn any(budget: RateBudget) -> Self {
        Self {
            prefix: None,
            budget,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match &self.prefix {
            None => true,
            Some(prefix) => {
                let prefix = prefix.trim_end_matches('/');
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

/// Default budgets, evaluated in order.
pub fn default_rate_limit_rules() -> Vec<RateLimitRule> {
    vec![
        RateLimitRule::prefix("/api/auth", RateBudget::new(5, 60)),
        RateLimitRule::prefix("/api/admin", RateBudget::new(20, 60)),
        RateLimitRule::prefix("/api", RateBudget::new(60, 60)),
        RateLimitRule::any(RateBudget::new(120, 60)),
    ]
}

/// First matching budget for `path`.
pub fn select_budget<'a>(rules: &'a [RateLimitRule], path: &str) -> Option<&'a RateBudget> {
    rules.iter().find(|r| r.matches(path)).map(|r| &r.budget)
}

/// URL and keys of one BaaS project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaasEndpoint {
    pub url: String,
    pub anon_key: String,
    /// Project-specific service-role key. `None` falls back to
    /// [`BaasSettings::service_role_key`].
    pub service_role_key: Option<String>,
}

impl BaasEndpoint {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            service_role_key: None,
        }
    }

    pub fn with_service_role_key(mut self, key: impl Into<String>) -> Self {
        self.service_role_key = Some(key.into());
        self
    }
}

/// BaaS connection settings.
#[derive(Debug, Clone)]
pub struct BaasSettings {
    pub mode: BaasMode,
    pub default: BaasEndpoint,
    /// Used for the security tables, which clients never touch directly.
    pub service_role_key: String,
    /// Per-platform projects, when a tenant does not share the default one.
    pub overrides: BTreeMap<Platform, BaasEndpoint>,
    pub timeout_secs: u64,
}

impl BaasSettings {
    pub fn endpoint_for(&self, platform: Platform) -> &BaasEndpoint {
        self.overrides.get(&platform).unwrap_or(&self.default)
    }

    /// Service-role key for `platform`'s project.
    pub fn service_key_for(&self, platform: Platform) -> &str {
        self.endpoint_for(platform)
            .service_role_key
            .as_deref()
            .unwrap_or(&self.service_role_key)
    }
}

/// Security pipeline settings.
#[derive(Debug, Clone)]
pub struct SecuritySettings {
    pub csrf_ttl_secs: u64,
    pub csrf_refresh_secs: u64,
    pub csrf_exempt_paths: Vec<String>,
    pub dev_fallback_platform: Option<Platform>,
    pub rate_limits: Vec<RateLimitRule>,
    pub rate_limit_backend: RateLimitBackend,
    /// Peers allowed to set `X-Forwarded-For` and `X-Real-IP`. Empty means
    /// the socket address is always used.
    pub trusted_proxies: Vec<IpAddr>,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub baas: BaasSettings,
    pub security: SecuritySettings,
    pub cookie_domain: Option<String>,
    pub platform_urls: BTreeMap<Platform, String>,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    bind: Option<String>,
    cookie_domain: Option<String>,
    cache_ttl_secs: Option<u64>,
    baas: FileBaas,
    security: FileSecurity,
    platforms: BTreeMap<Platform, FilePlatform>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileBaas {
    mode: Option<BaasMode>,
    url: Option<String>,
    anon_key: Option<String>,
    service_role_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSecurity {
    csrf_ttl_secs: Option<u64>,
    csrf_refresh_secs: Option<u64>,
    csrf_exempt_paths: Option<Vec<String>>,
    dev_fallback_platform: Option<Platform>,
    rate_limits: Option<Vec<RateLimitRule>>,
    rate_limit_backend: Option<RateLimitBackend>,
    trusted_proxies: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FilePlatform {
    url: Option<String>,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    supabase_service_role_key: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_proxies<'a>(values: impl IntoIterator<Item = &'a str>) -> Result<Vec<IpAddr>, ConfigError> {
    values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<IpAddr>().map_err(|e| {
                ConfigError::invalid(env_vars::TRUSTED_PROXIES, format!("{}: {}", v, e))
            })
        })
        .collect()
}

impl Config {
    /// Load from the process environment and the optional config file.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(env_vars::CONFIG_PATH)
            .unwrap_or_else(|_| defaults::CONFIG_FILE.to_string());
        let content = if Path::new(&path).exists() {
            info!(category = "config", path = %path, "Loading config file");
            Some(std::fs::read_to_string(&path)?)
        } else {
            None
        };
        Self::from_sources(content.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build a configuration from file content and an environment lookup.
    pub fn from_sources<F>(file: Option<&str>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match file {
            Some(content) => toml::from_str(content)?,
            None => FileConfig::default(),
        };
        let env = |key: &str| non_empty(env(key));

        let mode = match env(env_vars::BAAS_MODE) {
            Some(value) => BaasMode::parse(&value)?,
            None => file.baas.mode.unwrap_or_default(),
        };

        let bind_str = env(env_vars::BIND)
            .or(file.bind)
            .unwrap_or_else(|| defaults::BIND.to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|e| ConfigError::invalid(env_vars::BIND, format!("{}: {}", bind_str, e)))?;

        let url = env(env_vars::SUPABASE_URL).or(non_empty(file.baas.url));
        let anon_key = env(env_vars::SUPABASE_ANON_KEY).or(non_empty(file.baas.anon_key));
        let service_role_key =
            env(env_vars::SUPABASE_SERVICE_ROLE_KEY).or(non_empty(file.baas.service_role_key));

        let (url, anon_key, service_role_key) = match mode {
            BaasMode::Rest => (
                url.ok_or(ConfigError::Missing(env_vars::SUPABASE_URL))?,
                anon_key.ok_or(ConfigError::Missing(env_vars::SUPABASE_ANON_KEY))?,
                service_role_key.ok_or(ConfigError::Missing(env_vars::SUPABASE_SERVICE_ROLE_KEY))?,
            ),
            BaasMode::Memory => (
                url.unwrap_or_else(|| "memory://local".to_string()),
                anon_key.unwrap_or_default(),
                service_role_key.unwrap_or_default(),
            ),
        };
        if mode == BaasMode::Rest && !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::invalid(
                env_vars::SUPABASE_URL,
                "must be an http(s) URL",
            ));
        }

        let mut overrides = BTreeMap::new();
        let mut platform_urls = BTreeMap::new();
        let mut file_platforms = file.platforms;
        for platform in Platform::ALL {
            let prefix = platform.env_prefix();
            let from_file = file_platforms.remove(&platform).unwrap_or_default();

            if let Some(app_url) = env(&format!("{}_URL", prefix)).or(non_empty(from_file.url)) {
                platform_urls.insert(platform, app_url);
            }

            let p_url =
                env(&format!("{}_SUPABASE_URL", prefix)).or(non_empty(from_file.supabase_url));
            let p_key = env(&format!("{}_SUPABASE_ANON_KEY", prefix))
                .or(non_empty(from_file.supabase_anon_key));
            let p_service = env(&format!("{}_SUPABASE_SERVICE_ROLE_KEY", prefix))
                .or(non_empty(from_file.supabase_service_role_key));
            match (p_url, p_key) {
                (Some(url), Some(anon_key)) => {
                    overrides.insert(
                        platform,
                        BaasEndpoint {
                            url,
                            anon_key,
                            service_role_key: p_service,
                        },
                    );
                }
                (None, None) if p_service.is_some() => {
                    return Err(ConfigError::invalid(
                        format!("{}_SUPABASE_SERVICE_ROLE_KEY", prefix),
                        "per-platform service key needs a per-platform URL and anon key",
                    ));
                }
                (None, None) => {}
                _ => {
                    return Err(ConfigError::invalid(
                        format!("{}_SUPABASE_URL", prefix),
                        "per-platform URL and anon key must be set together",
                    ));
                }
            }
        }

        let security = file.security;
        let rate_limits = security
            .rate_limits
            .unwrap_or_else(default_rate_limit_rules);
        if rate_limits.is_empty() {
            return Err(ConfigError::invalid(
                "security.rate_limits",
                "at least one rule is required",
            ));
        }
        if let Some(rule) = rate_limits
            .iter()
            .find(|r| r.budget.max_requests == 0 || r.budget.window_secs == 0)
        {
            return Err(ConfigError::invalid(
                "security.rate_limits",
                format!("rule {:?} must have a positive budget and window", rule.prefix),
            ));
        }

        let csrf_ttl_secs = security.csrf_ttl_secs.unwrap_or(defaults::CSRF_TTL_SECS);
        if csrf_ttl_secs == 0 {
            return Err(ConfigError::invalid("security.csrf_ttl_secs", "must be positive"));
        }

        // The BaaS backend needs a stored procedure, so it is opt-in.
        let rate_limit_backend = security
            .rate_limit_backend
            .unwrap_or(RateLimitBackend::Memory);

        let trusted_proxies = match env(env_vars::TRUSTED_PROXIES) {
            Some(list) => parse_proxies(list.split(','))?,
            None => parse_proxies(
                security
                    .trusted_proxies
                    .iter()
                    .flatten()
                    .map(String::as_str),
            )?,
        };

        Ok(Self {
            bind,
            baas: BaasSettings {
                mode,
                default: BaasEndpoint::new(url, anon_key),
                service_role_key,
                overrides,
                timeout_secs: file.baas.timeout_secs.unwrap_or(defaults::BAAS_TIMEOUT_SECS),
            },
            security: SecuritySettings {
                csrf_ttl_secs,
                csrf_refresh_secs: security
                    .csrf_refresh_secs
                    .unwrap_or(defaults::CSRF_REFRESH_SECS),
                csrf_exempt_paths: security.csrf_exempt_paths.unwrap_or_default(),
                dev_fallback_platform: security.dev_fallback_platform,
                rate_limits,
                rate_limit_backend,
                trusted_proxies,
            },
            cookie_domain: env(env_vars::COOKIE_DOMAIN).or(non_empty(file.cookie_domain)),
            platform_urls,
            cache_ttl_secs: file.cache_ttl_secs.unwrap_or(defaults::CACHE_TTL_SECS),
        })
    }

    /// In-memory configuration for tests and local runs.
    pub fn memory() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            baas: BaasSettings {
                mode: BaasMode::Memory,
                default: BaasEndpoint::new("memory://local", ""),
                service_role_key: String::new(),
                overrides: BTreeMap::new(),
                timeout_secs: defaults::BAAS_TIMEOUT_SECS,
            },
            security: SecuritySettings {
                csrf_ttl_secs: defaults::CSRF_TTL_SECS,
                csrf_refresh_secs: defaults::CSRF_REFRESH_SECS,
                csrf_exempt_paths: Vec::new(),
                dev_fallback_platform: None,
                rate_limits: default_rate_limit_rules(),
                rate_limit_backend: RateLimitBackend::Memory,
                trusted_proxies: Vec::new(),
            },
            cookie_domain: None,
            platform_urls: BTreeMap::new(),
            cache_ttl_secs: defaults::CACHE_TTL_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn rest_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (env_vars::SUPABASE_URL, "https://project.supabase.co"),
            (env_vars::SUPABASE_ANON_KEY, "anon"),
            (env_vars::SUPABASE_SERVICE_ROLE_KEY, "service"),
        ]
    }

    #[test]
    fn test_missing_url_is_fatal() {
        let err = Config::from_sources(None, env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(env_vars::SUPABASE_URL)));
    }

    #[test]
    fn test_missing_service_key_is_fatal() {
        let env = env_of(&[
            (env_vars::SUPABASE_URL, "https://project.supabase.co"),
            (env_vars::SUPABASE_ANON_KEY, "anon"),
        ]);
        let err = Config::from_sources(None, env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(env_vars::SUPABASE_SERVICE_ROLE_KEY)));
    }

    #[test]
    fn test_rest_config_from_env() {
        let mut pairs = rest_env();
        pairs.push(("HUB_URL", "https://hub.neothink.io"));
        pairs.push((env_vars::COOKIE_DOMAIN, ".neothink.io"));
        let config = Config::from_sources(None, env_of(&pairs)).unwrap();

        assert_eq!(config.baas.mode, BaasMode::Rest);
        assert_eq!(config.security.rate_limit_backend, RateLimitBackend::Memory);
        assert!(config.security.trusted_proxies.is_empty());
        assert_eq!(config.cookie_domain.as_deref(), Some(".neothink.io"));
        assert_eq!(
            config.platform_urls.get(&Platform::Hub).map(String::as_str),
            Some("https://hub.neothink.io")
        );
        assert_eq!(config.bind, defaults::BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(config.security.rate_limits, default_rate_limit_rules());
    }

    #[test]
    fn test_platform_override_requires_both_values() {
        let mut pairs = rest_env();
        pairs.push(("IMMORTALS_SUPABASE_URL", "https://immortals.supabase.co"));
        assert!(Config::from_sources(None, env_of(&pairs)).is_err());

        pairs.push(("IMMORTALS_SUPABASE_ANON_KEY", "immortal-anon"));
        let config = Config::from_sources(None, env_of(&pairs)).unwrap();
        assert_eq!(
            config.baas.endpoint_for(Platform::Immortals).url,
            "https://immortals.supabase.co"
        );
        assert_eq!(
            config.baas.endpoint_for(Platform::Hub).url,
            "https://project.supabase.co"
        );
        // No project-specific service key: the shared one is used.
        assert_eq!(config.baas.service_key_for(Platform::Immortals), "service");

        pairs.push(("IMMORTALS_SUPABASE_SERVICE_ROLE_KEY", "immortal-service"));
        let config = Config::from_sources(None, env_of(&pairs)).unwrap();
        assert_eq!(
            config.baas.service_key_for(Platform::Immortals),
            "immortal-service"
        );
        assert_eq!(config.baas.service_key_for(Platform::Hub), "service");
    }

    #[test]
    fn test_platform_service_key_without_project_rejected() {
        let mut pairs = rest_env();
        pairs.push(("ASCENDERS_SUPABASE_SERVICE_ROLE_KEY", "ascenders-service"));
        assert!(matches!(
            Config::from_sources(None, env_of(&pairs)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_trusted_proxies() {
        let file = r#"
            [baas]
            mode = "memory"

            [security]
            trusted_proxies = ["10.0.0.1", "::1"]
        "#;
        let config = Config::from_sources(Some(file), env_of(&[])).unwrap();
        assert_eq!(
            config.security.trusted_proxies,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );

        let env = env_of(&[(env_vars::TRUSTED_PROXIES, "172.16.0.5, 172.16.0.6")]);
        let config = Config::from_sources(Some(file), env).unwrap();
        assert_eq!(config.security.trusted_proxies.len(), 2);
        assert_eq!(config.security.trusted_proxies[0].to_string(), "172.16.0.5");

        let env = env_of(&[(env_vars::TRUSTED_PROXIES, "not-an-ip")]);
        assert!(Config::from_sources(Some(file), env).is_err());
    }

    #[test]
    fn test_file_layer_and_env_priority() {
        let file = r#"
            bind = "0.0.0.0:9000"
            cache_ttl_secs = 60

            [baas]
            url = "https://file.supabase.co"
            anon_key = "file-anon"
            service_role_key = "file-service"

            [security]
            csrf_exempt_paths = ["/api/webhooks"]
            dev_fallback_platform = "hub"
            rate_limit_backend = "memory"

            [[security.rate_limits]]
            prefix = "/api/auth"
            max_requests = 3
            window_secs = 30

            [[security.rate_limits]]
            max_requests = 100
            window_secs = 60
        "#;
        let env = env_of(&[(env_vars::SUPABASE_URL, "https://env.supabase.co")]);
        let config = Config::from_sources(Some(file), env).unwrap();

        assert_eq!(config.baas.default.url, "https://env.supabase.co");
        assert_eq!(config.baas.default.anon_key, "file-anon");
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.security.dev_fallback_platform, Some(Platform::Hub));
        assert_eq!(config.security.rate_limit_backend, RateLimitBackend::Memory);
        assert_eq!(config.security.rate_limits.len(), 2);
        assert_eq!(
            select_budget(&config.security.rate_limits, "/api/auth/login"),
            Some(&RateBudget::new(3, 30))
        );
    }

    #[test]
    fn test_zero_budget_rejected() {
        let file = r#"
            [baas]
            mode = "memory"

            [[security.rate_limits]]
            max_requests = 0
            window_secs = 60
        "#;
        assert!(Config::from_sources(Some(file), env_of(&[])).is_err());
    }

    #[test]
    fn test_memory_mode_from_env() {
        let config =
            Config::from_sources(None, env_of(&[(env_vars::BAAS_MODE, "memory")])).unwrap();
        assert_eq!(config.baas.mode, BaasMode::Memory);
        assert_eq!(config.baas.default.url, "memory://local");
        assert_eq!(config.security.rate_limit_backend, RateLimitBackend::Memory);
    }

    #[test]
    fn test_memory_config() {
        let config = Config::memory();
        assert_eq!(config.baas.mode, BaasMode::Memory);
        assert_eq!(config.security.rate_limit_backend, RateLimitBackend::Memory);
        assert_eq!(config.security.csrf_ttl_secs, defaults::CSRF_TTL_SECS);
    }

    #[test]
    fn test_rule_ordering_and_prefix_boundaries() {
        let rules = default_rate_limit_rules();
        assert_eq!(select_budget(&rules, "/api/auth"), Some(&RateBudget::new(5, 60)));
        assert_eq!(select_budget(&rules, "/api/auth/login"), Some(&RateBudget::new(5, 60)));
        assert_eq!(select_budget(&rules, "/api/authors"), Some(&RateBudget::new(60, 60)));
        assert_eq!(select_budget(&rules, "/api/admin/feedback"), Some(&RateBudget::new(20, 60)));
        assert_eq!(select_budget(&rules, "/api/chat/general"), Some(&RateBudget::new(60, 60)));
        assert_eq!(select_budget(&rules, "/dashboard"), Some(&RateBudget::new(120, 60)));
    }

    #[test]
    fn test_invalid_bind() {
        let mut pairs = rest_env();
        pairs.push((env_vars::BIND, "not-an-address"));
        assert!(matches!(
            Config::from_sources(None, env_of(&pairs)),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
