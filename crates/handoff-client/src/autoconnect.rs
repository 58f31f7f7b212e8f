//! Find-or-create a shared server
//!
//! 1. Scan the port range for a running server and use it if found.
//! 2. Otherwise pick the first free port, launch a server there and poll
//!    it until it answers.
//!
//! Two processes may both decide to launch at the same moment. The loser's
//! server cannot bind its port, its readiness poll never succeeds, and that
//! process carries on in standalone mode. Nothing tries to prevent this.

use crate::config::ConnectionConfig;
use crate::discovery::{find_free_port, probe_port, scan_for_server, server_url};
use crate::launcher::ServerLauncher;
use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const READY_ATTEMPTS: u32 = 10;
pub const READY_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a discovery run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoConnectResult {
    /// Base URL of a usable server, `None` to fall back to standalone
    pub url: Option<String>,
    /// Whether this run launched the server
    pub auto_started: bool,
}

impl AutoConnectResult {
    pub fn found(url: String) -> Self {
        Self {
            url: Some(url),
            auto_started: false,
        }
    }

    pub fn started(url: String) -> Self {
        Self {
            url: Some(url),
            auto_started: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// Source of a shared server URL
#[async_trait]
pub trait ServerDiscovery: Send + Sync {
    async fn discover(&self) -> AutoConnectResult;
}

pub struct AutoConnect {
    http: reqwest::Client,
    port_range: RangeInclusive<u16>,
    launcher: Arc<dyn ServerLauncher>,
    ready_attempts: u32,
    ready_interval: Duration,
}

impl AutoConnect {
    pub fn new(
        http: reqwest::Client,
        config: &ConnectionConfig,
        launcher: Arc<dyn ServerLauncher>,
    ) -> Self {
        Self {
            http,
            port_range: config.port_range.clone(),
            launcher,
            ready_attempts: READY_ATTEMPTS,
            ready_interval: READY_INTERVAL,
        }
    }

    pub fn with_readiness(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_attempts = attempts;
        self.ready_interval = interval;
        self
    }

    pub async fn connect(&self) -> AutoConnectResult {
        if let Some(port) = scan_for_server(&self.http, self.port_range.clone()).await {
            info!("Found handoff server on port {}", port);
            return AutoConnectResult::found(server_url(port));
        }

        let Some(port) = find_free_port(self.port_range.clone()).await else {
            warn!(
                "No free port in {}-{}, using standalone storage",
                self.port_range.start(),
                self.port_range.end()
            );
            return AutoConnectResult::none();
        };

        if let Err(e) = self.launcher.launch(port).await {
            warn!("Could not start handoff server: {:#}", e);
            return AutoConnectResult::none();
        }

        if self.wait_until_ready(port).await {
            info!("Auto-started handoff server on port {}", port);
            AutoConnectResult::started(server_url(port))
        } else {
            warn!(
                "Handoff server on port {} not ready after {} attempts, using standalone storage",
                port, self.ready_attempts
            );
            AutoConnectResult::none()
        }
    }

    async fn wait_until_ready(&self, port: u16) -> bool {
        for attempt in 1..=self.ready_attempts {
            tokio::time::sleep(self.ready_interval).await;
            if probe_port(&self.http, port).await {
                debug!("Server on port {} ready after {} attempts", port, attempt);
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl ServerDiscovery for AutoConnect {
    async fn discover(&self) -> AutoConnectResult {
        self.connect().await
    }
}
