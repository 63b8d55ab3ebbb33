//! Tenant ("platform") model and hostname resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the branded sub-applications sharing this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Hub,
    Ascenders,
    Immortals,
    Neothinkers,
}

impl Platform {
    /// Every platform, in display order.
    pub const ALL: [Platform; 4] = [
        Platform::Hub,
        Platform::Ascenders,
        Platform::Immortals,
        Platform::Neothinkers,
    ];

    /// Slug used in hostnames, table rows and identifiers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Hub => "hub",
            Platform::Ascenders => "ascenders",
            Platform::Immortals => "immortals",
            Platform::Neothinkers => "neothinkers",
        }
    }

    /// Prefix for per-platform environment variables (`HUB_URL`, ...).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Platform::Hub => "HUB",
            Platform::Ascenders => "ASCENDERS",
            Platform::Immortals => "IMMORTALS",
            Platform::Neothinkers => "NEOTHINKERS",
        }
    }

    /// Parse a slug. Matching is case-insensitive.
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(slug))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known platform slug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slug(s).ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

/// Strip the port from a `Host` header value and lowercase it.
///
/// Handles bracketed IPv6 literals (`[::1]:8080`).
pub fn hostname(host: &str) -> String {
    let host = host.trim();
    let bare = if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        host.split(':').next().unwrap_or(host)
    };
    bare.to_ascii_lowercase()
}

/// Resolve the platform from a `Host` header using its first label.
///
/// Returns `None` for any host whose first label is not a platform slug.
pub fn platform_from_host(host: &str) -> Option<Platform> {
    let name = hostname(host);
    let first = name.split('.').next()?;
    Platform::from_slug(first)
}

fn is_loopback(name: &str) -> bool {
    matches!(name, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}

/// Host-to-platform resolution with an optional, explicit development fallback.
#[derive(Debug, Clone, Default)]
pub struct PlatformResolver {
    dev_fallback: Option<Platform>,
}

impl PlatformResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve loopback hosts (and only those) to `platform`.
    pub fn with_dev_fallback(mut self, platform: Option<Platform>) -> Self {
        self.dev_fallback = platform;
        self
    }

    pub fn resolve(&self, host: &str) -> Option<Platform> {
        if let Some(platform) = platform_from_host(host) {
            return Some(platform);
        }
        match self.dev_fallback {
            Some(fallback) if is_loopback(&hostname(host)) => Some(fallback),
            _ => None,
        }
    }
}
