//! Per-call storage selection
//!
//! Every operation asks the coordinator for a store. The answer depends on
//! configuration and on the cached result of discovery:
//!
//! | setting                          | mode                  | store                   |
//! |----------------------------------|-----------------------|-------------------------|
//! | `HANDOFF_SERVER=none`            | `standalone-explicit` | local store             |
//! | `HANDOFF_SERVER=<url>`           | `shared`              | remote client           |
//! | discovery found or started one   | `shared`              | remote client + retry   |
//! | otherwise                        | `standalone`          | local store             |
//!
//! The local store is created once and survives mode switches, so records
//! saved while standalone are still there after the server comes back.

use crate::autoconnect::{AutoConnect, AutoConnectResult, ServerDiscovery};
use crate::config::{ConnectionConfig, ServerSetting};
use crate::launcher::ProcessLauncher;
use crate::remote::{ReconnectFn, RemoteClient};
use anyhow::{Context, Result};
use futures::FutureExt;
use handoff_core::{Config, HandoffStore, LocalStore};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

static GLOBAL: OnceCell<StorageCoordinator> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Shared,
    Standalone,
    StandaloneExplicit,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Shared => write!(f, "shared"),
            StorageMode::Standalone => write!(f, "standalone"),
            StorageMode::StandaloneExplicit => write!(f, "standalone-explicit"),
        }
    }
}

/// What discovery last concluded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryCache {
    pub server_url: Option<String>,
    pub auto_started: bool,
    pub previous_mode: Option<StorageMode>,
}

impl DiscoveryCache {
    fn from_result(result: AutoConnectResult, previous_mode: Option<StorageMode>) -> Self {
        Self {
            server_url: result.url,
            auto_started: result.auto_started,
            previous_mode,
        }
    }
}

/// Holder for the discovery cache
///
/// The lock is held across discovery, so concurrent first calls wait for a
/// single run instead of each scanning the range.
#[derive(Debug, Default)]
pub struct DiscoveryContext {
    cache: Mutex<Option<DiscoveryCache>>,
}

impl DiscoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result, running discovery first if nothing is cached
    pub async fn get_or_init(&self, discovery: &dyn ServerDiscovery) -> DiscoveryCache {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            return cached.clone();
        }
        let fresh = DiscoveryCache::from_result(discovery.discover().await, None);
        *cache = Some(fresh.clone());
        fresh
    }

    pub async fn get(&self) -> Option<DiscoveryCache> {
        self.cache.lock().await.clone()
    }

    /// Throw away the cached result and discover again
    pub async fn force_retry(&self, discovery: &dyn ServerDiscovery) -> DiscoveryCache {
        let mut cache = self.cache.lock().await;
        let previous_mode = cache.as_ref().and_then(|c| c.previous_mode);
        let fresh = DiscoveryCache::from_result(discovery.discover().await, previous_mode);
        *cache = Some(fresh.clone());
        fresh
    }

    pub async fn reset(&self) {
        *self.cache.lock().await = None;
    }

    async fn record_mode(&self, mode: StorageMode) -> Option<StorageMode> {
        let mut cache = self.cache.lock().await;
        cache.as_mut().and_then(|cached| cached.previous_mode.replace(mode))
    }
}

/// A store picked for one call, along with how it was picked
#[derive(Clone)]
pub struct StorageHandle {
    pub mode: StorageMode,
    pub store: Arc<dyn HandoffStore>,
    pub server_url: Option<String>,
    pub auto_started: bool,
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("mode", &self.mode)
            .field("server_url", &self.server_url)
            .field("auto_started", &self.auto_started)
            .finish()
    }
}

pub struct StorageCoordinator {
    connection: ConnectionConfig,
    local: Arc<LocalStore>,
    discovery: Arc<dyn ServerDiscovery>,
    context: Arc<DiscoveryContext>,
    http: reqwest::Client,
}

impl fmt::Debug for StorageCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCoordinator")
            .field("server", &self.connection.server)
            .field("local_handoffs", &self.local.len())
            .finish()
    }
}

impl StorageCoordinator {
    pub fn new(
        connection: ConnectionConfig,
        limits: Config,
        discovery: Arc<dyn ServerDiscovery>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(connection.fetch_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            connection,
            local: Arc::new(LocalStore::new(limits)),
            discovery,
            context: Arc::new(DiscoveryContext::new()),
            http,
        })
    }

    /// Coordinator configured from `HANDOFF_*` variables, discovering over
    /// the configured port range and launching the server binary when needed
    pub fn from_env() -> Result<Self> {
        let connection = ConnectionConfig::from_env();
        let limits = Config::from_env();

        let probe_http = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        let launcher = ProcessLauncher::locate(
            connection.server_binary.clone(),
            connection.server_ttl,
        );
        let discovery = AutoConnect::new(probe_http, &connection, Arc::new(launcher));

        Self::new(connection, limits, Arc::new(discovery))
    }

    /// Process-wide coordinator, built from the environment on first use
    pub fn global() -> Result<&'static StorageCoordinator> {
        GLOBAL.get_or_try_init(Self::from_env)
    }

    /// Pick the store for the next operation
    pub async fn storage(&self) -> StorageHandle {
        match &self.connection.server {
            ServerSetting::Disabled => StorageHandle {
                mode: StorageMode::StandaloneExplicit,
                store: self.local.clone(),
                server_url: None,
                auto_started: false,
            },
            ServerSetting::Explicit(url) => {
                let client =
                    RemoteClient::with_client(self.http.clone(), url.clone(), &self.connection);
                StorageHandle {
                    mode: StorageMode::Shared,
                    store: Arc::new(client),
                    server_url: Some(url.clone()),
                    auto_started: false,
                }
            }
            ServerSetting::Auto => {
                let cache = self.context.get_or_init(self.discovery.as_ref()).await;
                let handle = match cache.server_url {
                    Some(url) => {
                        let client = RemoteClient::with_client(
                            self.http.clone(),
                            url.clone(),
                            &self.connection,
                        )
                        .with_reconnect(self.reconnect_fn());
                        StorageHandle {
                            mode: StorageMode::Shared,
                            store: Arc::new(client),
                            server_url: Some(url),
                            auto_started: cache.auto_started,
                        }
                    }
                    None => StorageHandle {
                        mode: StorageMode::Standalone,
                        store: self.local.clone(),
                        server_url: None,
                        auto_started: false,
                    },
                };

                match self.context.record_mode(handle.mode).await {
                    Some(previous) if previous != handle.mode => {
                        info!("Storage mode changed from {} to {}", previous, handle.mode)
                    }
                    None => debug!("Storage mode: {}", handle.mode),
                    _ => {}
                }
                handle
            }
        }
    }

    fn reconnect_fn(&self) -> ReconnectFn {
        let context = self.context.clone();
        let discovery = self.discovery.clone();
        Arc::new(move || {
            let context = context.clone();
            let discovery = discovery.clone();
            async move {
                context
                    .force_retry(discovery.as_ref())
                    .await
                    .server_url
            }
            .boxed()
        })
    }

    /// Discard cached discovery and run it again
    ///
    /// Only auto mode discovers; with discovery disabled or an explicit
    /// server URL the cache is returned untouched.
    pub async fn force_retry(&self) -> DiscoveryCache {
        if self.connection.server != ServerSetting::Auto {
            debug!(
                "Discovery not used with {:?}, skipping retry",
                self.connection.server
            );
            return self.context.get().await.unwrap_or_default();
        }
        self.context.force_retry(self.discovery.as_ref()).await
    }

    /// Forget discovery entirely; the next call starts from scratch
    pub async fn reset(&self) {
        self.context.reset().await;
    }

    pub fn context(&self) -> &DiscoveryContext {
        &self.context
    }

    /// Standalone store, the same instance for the whole process
    pub fn local_store(&self) -> Arc<LocalStore> {
        self.local.clone()
    }

    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }
}
