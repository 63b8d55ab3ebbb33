//! Per-platform client construction.

use std::sync::Arc;
use std::time::Duration;

use neothink_core::{BaasMode, BaasSettings, Platform};
use tracing::{info, warn};

use crate::error::Result;
use crate::memory::MemoryBaas;
use crate::rest::RestBaas;
use crate::store::{AuthProvider, TableStore};

/// A BaaS client bound to one platform.
#[derive(Clone)]
pub struct BaasClient {
    pub platform: Platform,
    /// Anonymous-key access. Use [`BaasClient::for_user`] for row-level access.
    pub tables: Arc<dyn TableStore>,
    pub auth: Arc<dyn AuthProvider>,
}

impl BaasClient {
    /// Table access acting as the signed-in user.
    pub fn for_user(&self, access_token: &str) -> Arc<dyn TableStore> {
        self.tables.as_user(access_token)
    }
}

/// Service-role stores, one per platform. Platforms sharing a project share
/// the same store.
#[derive(Clone)]
pub struct ServiceStores {
    /// Indexed by [`slot`].
    stores: Arc<Vec<Arc<dyn TableStore>>>,
}

impl ServiceStores {
    /// Every platform uses `store`.
    pub fn shared(store: Arc<dyn TableStore>) -> Self {
        Self::per_platform(|_| store.clone())
    }

    /// One store per platform, built by `store_for`.
    pub fn per_platform<F>(store_for: F) -> Self
    where
        F: Fn(Platform) -> Arc<dyn TableStore>,
    {
        Self {
            stores: Arc::new(Platform::ALL.into_iter().map(store_for).collect()),
        }
    }

    pub fn get(&self, platform: Platform) -> Arc<dyn TableStore> {
        self.stores[slot(platform)].clone()
    }

    /// Each distinct store once, for maintenance that spans projects.
    pub fn distinct(&self) -> Vec<Arc<dyn TableStore>> {
        let mut out: Vec<Arc<dyn TableStore>> = Vec::new();
        for store in self.stores.iter() {
            if !out.iter().any(|seen| Arc::ptr_eq(seen, store)) {
                out.push(store.clone());
            }
        }
        out
    }
}

/// Builds and caches one [`BaasClient`] per platform plus the service-role
/// stores for the security and cross-user tables.
#[derive(Clone)]
pub struct ClientFactory {
    /// Indexed by [`slot`], in `Platform::ALL` order.
    clients: Vec<BaasClient>,
    services: ServiceStores,
}

fn slot(platform: Platform) -> usize {
    match platform {
        Platform::Hub => 0,
        Platform::Ascenders => 1,
        Platform::Immortals => 2,
        Platform::Neothinkers => 3,
    }
}

impl ClientFactory {
    pub fn from_settings(settings: &BaasSettings) -> Result<Self> {
        match settings.mode {
            BaasMode::Memory => {
                info!(category = "baas", "Using in-memory BaaS");
                Ok(Self::memory(MemoryBaas::new()))
            }
            BaasMode::Rest => Self::rest(settings),
        }
    }

    fn rest(settings: &BaasSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        let mut clients = Vec::with_capacity(Platform::ALL.len());
        for platform in Platform::ALL {
            let endpoint = settings.endpoint_for(platform);
            let rest = Arc::new(RestBaas::with_client(
                http.clone(),
                &endpoint.url,
                &endpoint.anon_key,
            ));
            info!(
                category = "baas",
                platform = %platform,
                url = %endpoint.url,
                "Configured BaaS client"
            );
            clients.push(BaasClient {
                platform,
                tables: rest.clone(),
                auth: rest,
            });
        }

        let shared: Arc<dyn TableStore> = Arc::new(RestBaas::with_client(
            http.clone(),
            &settings.default.url,
            &settings.service_role_key,
        ));
        let services = ServiceStores::per_platform(|platform| {
            match settings.overrides.get(&platform) {
                None => shared.clone(),
                Some(endpoint) => {
                    if endpoint.service_role_key.is_none() {
                        warn!(
                            category = "baas",
                            platform = %platform,
                            "No project-specific service key; using the shared one"
                        );
                    }
                    let store: Arc<dyn TableStore> = Arc::new(RestBaas::with_client(
                        http.clone(),
                        &endpoint.url,
                        settings.service_key_for(platform),
                    ));
                    store
                }
            }
        });
        Ok(Self { clients, services })
    }

    /// Every platform shares one in-memory backend.
    pub fn memory(baas: MemoryBaas) -> Self {
        let shared = Arc::new(baas);
        let clients = Platform::ALL
            .into_iter()
            .map(|platform| BaasClient {
                platform,
                tables: shared.clone(),
                auth: shared.clone(),
            })
            .collect();
        Self {
            clients,
            services: ServiceStores::shared(shared),
        }
    }

    /// Replace the service-role stores, keeping the per-platform clients.
    pub fn with_services(mut self, services: ServiceStores) -> Self {
        self.services = services;
        self
    }

    /// Client for `platform`.
    pub fn client(&self, platform: Platform) -> &BaasClient {
        &self.clients[slot(platform)]
    }

    /// Service-role store for `platform`'s project. Bypasses row-level
    /// security.
    pub fn service_for(&self, platform: Platform) -> Arc<dyn TableStore> {
        self.services.get(platform)
    }

    /// Service-role store of the default project.
    pub fn service(&self) -> Arc<dyn TableStore> {
        self.services.get(Platform::Hub)
    }

    pub fn services(&self) -> ServiceStores {
        self.services.clone()
    }
}
