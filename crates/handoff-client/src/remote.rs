//! HTTP client for the shared server with bounded reconnection
//!
//! When a request cannot reach the server (refused, reset, timed out) the
//! client asks its reconnect function for a server URL, adopts it and
//! issues the same request again. The number of reconnect attempts is
//! capped per client and the counter goes back to zero after any answer
//! from a server. Answers with an error status are final and never retried.

use crate::config::ConnectionConfig;
use anyhow::Context;
use async_trait::async_trait;
use futures::future::BoxFuture;
use handoff_core::{
    ClearOutcome, Handoff, HandoffStore, HandoffSummary, MergeOutcome, MergeSpec,
    MessageResponse, SaveInput, SaveOutcome, StorageError, StorageResult, StoreStats,
};
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Produces a fresh server URL after a connection failure, or `None` if no
/// server can be found
pub type ReconnectFn = Arc<dyn Fn() -> BoxFuture<'static, Option<String>> + Send + Sync>;

const RECOVERY_SUGGESTION: &str = "Check that a handoff server is running, or set \
HANDOFF_SERVER=none to keep working with local storage. The next call will try to \
discover or start a server again.";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct RemoteClient {
    http: reqwest::Client,
    server_url: RwLock<String>,
    reconnect_attempts: AtomicU32,
    max_reconnect_attempts: u32,
    retry_interval: Duration,
    reconnect: Option<ReconnectFn>,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("server_url", &*self.server_url.read())
            .field("reconnect_attempts", &self.reconnect_attempts)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish()
    }
}

impl RemoteClient {
    /// Client with its own HTTP connection pool
    pub fn new(base_url: impl Into<String>, config: &ConnectionConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_client(http, base_url, config))
    }

    /// Client sharing an existing HTTP pool; the pool's timeout applies
    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        config: &ConnectionConfig,
    ) -> Self {
        Self {
            http,
            server_url: RwLock::new(base_url.into()),
            reconnect_attempts: AtomicU32::new(0),
            max_reconnect_attempts: config.retry_count,
            retry_interval: config.retry_interval,
            reconnect: None,
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectFn) -> Self {
        self.reconnect = Some(reconnect);
        self
    }

    pub fn server_url(&self) -> String {
        self.server_url.read().clone()
    }

    /// Reconnect attempts since the last answer from a server
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Vec<u8>), reqwest::Error> {
        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?.to_vec();
        Ok((status, bytes))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        pending: Option<&SaveInput>,
    ) -> StorageResult<T> {
        loop {
            let base = self.server_url();
            let url = format!("{}{}", base, path);
            match self.send_once(&method, &url, body.as_ref()).await {
                Ok((status, bytes)) => {
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    return decode(status, &bytes);
                }
                Err(e) => {
                    debug!("{} {} failed: {}", method, url, e);
                    self.reconnect(&base, &e, pending).await?;
                }
            }
        }
    }

    /// Adopt a new server URL or fail with a connectivity error
    async fn reconnect(
        &self,
        base: &str,
        error: &reqwest::Error,
        pending: Option<&SaveInput>,
    ) -> StorageResult<()> {
        let Some(reconnect) = &self.reconnect else {
            return Err(connectivity_error(base, error, pending));
        };

        let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
        if attempts >= self.max_reconnect_attempts {
            warn!(
                "Giving up on handoff server after {} reconnect attempts",
                attempts
            );
            return Err(connectivity_error(base, error, pending));
        }
        if attempts > 0 {
            tokio::time::sleep(self.retry_interval).await;
        }

        let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(
            "Handoff server at {} unreachable, reconnect attempt {}/{}",
            base, attempt, self.max_reconnect_attempts
        );

        match reconnect().await {
            Some(url) => {
                info!("Reconnected to handoff server at {}", url);
                *self.server_url.write() = url;
                Ok(())
            }
            None => Err(connectivity_error(base, error, pending)),
        }
    }
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.to_string()
    }
}

fn connectivity_error(
    base: &str,
    error: &reqwest::Error,
    pending: Option<&SaveInput>,
) -> StorageError {
    let mut message = format!(
        "Cannot reach handoff server at {}: {}",
        base,
        describe_transport_error(error)
    );
    if pending.is_some() {
        message.push_str(". The handoff was not saved; its content is attached for manual recovery");
    }
    StorageError::Connectivity {
        message,
        suggestion: RECOVERY_SUGGESTION.to_string(),
        pending: pending.map(|input| Box::new(input.clone())),
    }
}

fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> StorageResult<T> {
    if status.is_success() {
        return serde_json::from_slice(body).map_err(|e| StorageError::Protocol(e.to_string()));
    }

    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|body| body.error)
        .unwrap_or_else(|_| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text
            }
        });

    Err(match status {
        StatusCode::BAD_REQUEST => StorageError::Validation(message),
        StatusCode::NOT_FOUND => StorageError::NotFound(message),
        _ => StorageError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

fn to_body<T: serde::Serialize>(value: &T) -> StorageResult<Value> {
    serde_json::to_value(value).map_err(|e| StorageError::Protocol(e.to_string()))
}

fn handoff_path(key: &str) -> String {
    format!("/handoff/{}", urlencoding::encode(key))
}

#[async_trait]
impl HandoffStore for RemoteClient {
    async fn save(&self, input: SaveInput) -> StorageResult<SaveOutcome> {
        let body = to_body(&input)?;
        self.execute(Method::POST, "/handoff", Some(body), Some(&input))
            .await
    }

    async fn list(&self) -> StorageResult<Vec<HandoffSummary>> {
        self.execute(Method::GET, "/handoff", None, None).await
    }

    async fn load(&self, key: &str, max_messages: Option<usize>) -> StorageResult<Handoff> {
        let mut path = handoff_path(key);
        if let Some(max) = max_messages {
            path.push_str(&format!("?max_messages={}", max));
        }
        self.execute(Method::GET, &path, None, None).await
    }

    async fn delete(&self, key: &str) -> StorageResult<MessageResponse> {
        self.execute(Method::DELETE, &handoff_path(key), None, None)
            .await
    }

    async fn delete_all(&self) -> StorageResult<ClearOutcome> {
        self.execute(Method::DELETE, "/handoff", None, None).await
    }

    async fn stats(&self) -> StorageResult<StoreStats> {
        self.execute(Method::GET, "/stats", None, None).await
    }

    async fn merge(&self, spec: MergeSpec) -> StorageResult<MergeOutcome> {
        let body = to_body(&spec)?;
        self.execute(Method::POST, "/handoff/merge", Some(body), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success_and_protocol_error() {
        let ok: MessageResponse = decode(StatusCode::OK, br#"{"message":"done"}"#).unwrap();
        assert_eq!(ok.message, "done");

        let err = decode::<MessageResponse>(StatusCode::OK, b"<html>").unwrap_err();
        assert!(matches!(err, StorageError::Protocol(_)));
    }

    #[test]
    fn test_decode_maps_error_statuses() {
        let err = decode::<MessageResponse>(StatusCode::BAD_REQUEST, br#"{"error":"bad key"}"#)
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(ref m) if m == "bad key"));

        let err = decode::<MessageResponse>(StatusCode::NOT_FOUND, br#"{"error":"gone"}"#)
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(ref m) if m == "gone"));

        let err = decode::<MessageResponse>(StatusCode::SERVICE_UNAVAILABLE, b"").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Rejected { status: 503, ref message } if message == "Service Unavailable"
        ));
    }

    #[test]
    fn test_handoff_path_encodes_key() {
        assert_eq!(handoff_path("plain-key_1"), "/handoff/plain-key_1");
        assert_eq!(handoff_path("a/b c"), "/handoff/a%2Fb%20c");
    }
}
