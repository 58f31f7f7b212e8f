use crate::idle::{track_activity, wait_until_idle};
use crate::routes::{handoff_routes, health_routes, stats_routes};
use crate::{AppState, Result, ServerError};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, request::Parts, HeaderValue, Method};
use axum::{middleware, Router};
use handoff_core::{env_number, Config, LocalStore};
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;
use url::Url;

/// Default idle TTL: 24 hours
pub const DEFAULT_SERVER_TTL_MS: u64 = 24 * 60 * 60 * 1000;
const MAX_SERVER_TTL_MS: u64 = 7 * DEFAULT_SERVER_TTL_MS;

/// Allowance for JSON framing and escaping on top of the field limits
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Shut down after this long without requests; `None` runs forever
    pub idle_ttl: Option<Duration>,
    pub limits: Config,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            idle_ttl: Some(Duration::from_millis(DEFAULT_SERVER_TTL_MS)),
            limits: Config::default(),
        }
    }

    /// Limits and idle TTL from the environment
    pub fn from_env(port: u16) -> Self {
        let ttl_ms = env_number(
            "HANDOFF_SERVER_TTL",
            DEFAULT_SERVER_TTL_MS,
            0..=MAX_SERVER_TTL_MS,
        );
        Self {
            port,
            idle_ttl: ttl_from_millis(ttl_ms),
            limits: Config::from_env(),
        }
    }
}

/// `0` disables idle shutdown
pub fn ttl_from_millis(ttl_ms: u64) -> Option<Duration> {
    (ttl_ms > 0).then(|| Duration::from_millis(ttl_ms))
}

/// Largest request body accepted, derived from the store limits
pub fn body_limit(limits: &Config) -> usize {
    2 * (limits.max_conversation_bytes + limits.max_summary_bytes) + BODY_OVERHEAD_BYTES
}

fn is_loopback_origin(origin: &HeaderValue) -> bool {
    origin
        .to_str()
        .ok()
        .and_then(|origin| Url::parse(origin).ok())
        .and_then(|url| {
            url.host_str()
                .map(|host| host == "localhost" || host == "127.0.0.1")
        })
        .unwrap_or(false)
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _parts: &Parts| is_loopback_origin(origin),
        ))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let limit = body_limit(state.store.config());
    let activity = state.activity.clone();

    Router::new()
        .merge(health_routes())
        .merge(handoff_routes())
        .merge(stats_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(limit))
        .layer(middleware::from_fn_with_state(activity, track_activity))
        .layer(cors)
}

/// Serve `store` on an already bound listener until idle
pub async fn serve(
    listener: TcpListener,
    store: Arc<LocalStore>,
    idle_ttl: Option<Duration>,
) -> Result<()> {
    serve_until(listener, store, idle_ttl, std::future::pending()).await
}

/// Serve `store` until idle or until `shutdown` resolves
pub async fn serve_until<F>(
    listener: TcpListener,
    store: Arc<LocalStore>,
    idle_ttl: Option<Duration>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let port = listener.local_addr()?.port();
    let state = AppState::new(store, port);
    let activity = state.activity.clone();
    let app = build_router(state);

    let stop = async move {
        match idle_ttl {
            Some(ttl) => {
                tokio::select! {
                    _ = wait_until_idle(activity, ttl) => {}
                    _ = shutdown => {}
                }
            }
            None => shutdown.await,
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(stop)
        .await
        .map_err(ServerError::Io)?;

    info!("Handoff server on port {} stopped", port);
    Ok(())
}

/// Bind loopback on `config.port` and serve a fresh store
///
/// Binding fails when another process already holds the port, which is how
/// a launch that lost a discovery race ends.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        ServerError::Config(format!("Failed to bind {}: {}", addr, e))
    })?;

    info!(
        "Starting handoff server on http://{} (idle ttl: {:?})",
        addr, config.idle_ttl
    );

    let store = Arc::new(LocalStore::new(config.limits));
    serve_until(listener, store, config.idle_ttl, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
