//! Connection settings read from the environment

use handoff_core::env_number;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 1099..=1200;
pub const DEFAULT_RETRY_COUNT: u32 = 30;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_SERVER_TTL_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// How the coordinator should find a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSetting {
    /// Scan for a server and start one if none is found
    Auto,
    /// Never look for a server; always use the local store
    Disabled,
    /// Use this server URL and nothing else
    Explicit(String),
}

impl ServerSetting {
    /// Interpret a `HANDOFF_SERVER` value
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Auto,
            Some(value) if value.eq_ignore_ascii_case("none") => Self::Disabled,
            Some(value) => Self::Explicit(value.trim_end_matches('/').to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub server: ServerSetting,

    /// Ports scanned for a running server and tried for a new one
    pub port_range: RangeInclusive<u16>,

    /// Reconnect attempts a client may make before giving up
    pub retry_count: u32,

    /// Delay between reconnect attempts
    pub retry_interval: Duration,

    /// Idle TTL handed to servers this process starts (zero = never stop)
    pub server_ttl: Duration,

    /// Deadline for each HTTP request to the server
    pub fetch_timeout: Duration,

    /// Server executable to launch; defaults to `handoff-server` next to
    /// the current executable, then `PATH`
    pub server_binary: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server: ServerSetting::Auto,
            port_range: DEFAULT_PORT_RANGE,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            server_ttl: Duration::from_millis(DEFAULT_SERVER_TTL_MS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            server_binary: None,
        }
    }
}

impl ConnectionConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let server = ServerSetting::parse(std::env::var("HANDOFF_SERVER").ok().as_deref());

        let port_range = match std::env::var("HANDOFF_PORT_RANGE") {
            Ok(raw) if !raw.trim().is_empty() => parse_port_range(&raw).unwrap_or_else(|| {
                warn!(
                    "HANDOFF_PORT_RANGE={:?} is not a valid 'start-end' range, using default {}-{}",
                    raw,
                    DEFAULT_PORT_RANGE.start(),
                    DEFAULT_PORT_RANGE.end()
                );
                DEFAULT_PORT_RANGE
            }),
            _ => DEFAULT_PORT_RANGE,
        };

        let server_binary = std::env::var_os("HANDOFF_SERVER_BIN")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Self {
            server,
            port_range,
            retry_count: env_number("HANDOFF_RETRY_COUNT", DEFAULT_RETRY_COUNT, 1..=100),
            retry_interval: Duration::from_millis(env_number(
                "HANDOFF_RETRY_INTERVAL",
                DEFAULT_RETRY_INTERVAL_MS,
                1000..=60_000,
            )),
            server_ttl: Duration::from_millis(env_number(
                "HANDOFF_SERVER_TTL",
                DEFAULT_SERVER_TTL_MS,
                0..=7 * DEFAULT_SERVER_TTL_MS,
            )),
            fetch_timeout: Duration::from_millis(env_number(
                "HANDOFF_FETCH_TIMEOUT",
                DEFAULT_FETCH_TIMEOUT_MS,
                1000..=300_000,
            )),
            server_binary,
        }
    }

    pub fn with_server(mut self, server: ServerSetting) -> Self {
        self.server = server;
        self
    }

    pub fn with_port_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.port_range = range;
        self
    }

    pub fn with_retry(mut self, count: u32, interval: Duration) -> Self {
        self.retry_count = count;
        self.retry_interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Parse `start-end` into an inclusive port range
pub fn parse_port_range(raw: &str) -> Option<RangeInclusive<u16>> {
    let (start, end) = raw.trim().split_once('-')?;
    let start: u16 = start.trim().parse().ok()?;
    let end: u16 = end.trim().parse().ok()?;
    if start == 0 || start > end {
        return None;
    }
    Some(start..=end)
}
