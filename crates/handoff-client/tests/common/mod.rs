//! Shared fixtures for client integration tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use handoff_client::ServerLauncher;
use handoff_core::{Config, LocalStore};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A real handoff server on a loopback port, running inside the test
pub struct TestServer {
    pub port: u16,
    pub url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Self::on_listener(listener)
    }

    pub async fn start_on(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        Self::on_listener(listener)
    }

    fn on_listener(listener: TcpListener) -> Result<Self> {
        let port = listener.local_addr()?.port();
        let store = Arc::new(LocalStore::new(Config::default()));
        let (tx, rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let _ = handoff_server::serve_until(listener, store, None, async {
                let _ = rx.await;
            })
            .await;
        });

        Ok(Self {
            port,
            url: format!("http://127.0.0.1:{}", port),
            shutdown: Some(tx),
            handle,
        })
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

/// A loopback port with nothing listening on it
pub fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr").port()
}

pub fn dead_url() -> String {
    format!("http://127.0.0.1:{}", dead_port())
}

/// Starts an in-process server instead of spawning the binary
#[derive(Default)]
pub struct InProcessLauncher {
    launches: AtomicUsize,
    servers: Mutex<Vec<TestServer>>,
}

impl InProcessLauncher {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Stop every server this launcher started
    pub async fn stop_all(&self) {
        let servers: Vec<TestServer> = std::mem::take(&mut *self.servers.lock());
        for server in servers {
            server.shutdown().await;
        }
    }
}

#[async_trait]
impl ServerLauncher for InProcessLauncher {
    async fn launch(&self, port: u16) -> Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let server = TestServer::start_on(port).await?;
        self.servers.lock().push(server);
        Ok(())
    }
}

/// Pretends to launch but never starts anything
#[derive(Default)]
pub struct SilentLauncher {
    pub launches: AtomicUsize,
}

#[async_trait]
impl ServerLauncher for SilentLauncher {
    async fn launch(&self, _port: u16) -> Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every launch
pub struct FailingLauncher;

#[async_trait]
impl ServerLauncher for FailingLauncher {
    async fn launch(&self, _port: u16) -> Result<()> {
        anyhow::bail!("no server binary available")
    }
}
