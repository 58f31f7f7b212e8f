//! Finding a running server, or a port to start one on
//!
//! A port counts as "in use by us" only when `GET /` answers with our
//! identity; refusing the probe says nothing about whether the port is free.
//! Only [`find_free_port`]'s own bind attempt decides that.

use futures::future::join_all;
use handoff_core::SERVER_NAME;
use serde::Deserialize;
use std::future::Future;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::debug;

/// Maximum probes in flight during a scan
pub const SCAN_BATCH_SIZE: usize = 10;

/// Deadline for a single identity probe
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Debug, Deserialize)]
struct Identity {
    name: String,
}

/// Base URL of a server on loopback
pub fn server_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

/// Whether the server at `base_url` answers `GET /` with our identity
pub async fn probe_url(http: &reqwest::Client, base_url: &str) -> bool {
    let response = match http
        .get(format!("{}/", base_url))
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => response,
        Err(_) => return false,
    };
    if !response.status().is_success() {
        return false;
    }
    match response.json::<Identity>().await {
        Ok(identity) => identity.name == SERVER_NAME,
        Err(_) => false,
    }
}

/// Whether a compatible server listens on `port`
pub async fn probe_port(http: &reqwest::Client, port: u16) -> bool {
    probe_url(http, &server_url(port)).await
}

/// Probe `range` in batches of [`SCAN_BATCH_SIZE`], stopping after the
/// first batch that contains a match
///
/// Within a batch the lowest matching port wins.
pub async fn scan_ports<F, Fut>(range: RangeInclusive<u16>, probe: F) -> Option<u16>
where
    F: Fn(u16) -> Fut,
    Fut: Future<Output = bool>,
{
    let ports: Vec<u16> = range.collect();
    for batch in ports.chunks(SCAN_BATCH_SIZE) {
        let results = join_all(batch.iter().map(|&port| probe(port))).await;
        if let Some((&port, _)) = batch.iter().zip(results).find(|(_, found)| *found) {
            return Some(port);
        }
    }
    None
}

/// Scan `range` for a running compatible server
pub async fn scan_for_server(http: &reqwest::Client, range: RangeInclusive<u16>) -> Option<u16> {
    debug!("Scanning ports {}-{} for a handoff server", range.start(), range.end());
    scan_ports(range, |port| probe_port(http, port)).await
}

/// First port in `range` that loopback can bind, released immediately
pub async fn find_free_port(range: RangeInclusive<u16>) -> Option<u16> {
    for port in range {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => {
                drop(listener);
                return Some(port);
            }
            Err(e) => debug!("Port {} unavailable: {}", port, e),
        }
    }
    None
}
