//! Capacity limits for the handoff store
//!
//! Limits are read once from the environment. Values that fail to parse or
//! fall outside their allowed range are logged and replaced by the default,
//! so a bad variable never prevents startup.

use regex::Regex;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::warn;

/// Allowed characters for handoff keys
pub const KEY_PATTERN: &str = r"^[A-Za-z0-9_-]+$";

static KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(KEY_PATTERN).expect("valid key regex"));

pub const DEFAULT_MAX_HANDOFFS: usize = 100;
pub const DEFAULT_MAX_CONVERSATION_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_SUMMARY_BYTES: usize = 10_000;
pub const DEFAULT_MAX_TITLE_LENGTH: usize = 200;
pub const DEFAULT_MAX_KEY_LENGTH: usize = 100;

/// Store capacity limits
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of handoffs held at once
    pub max_handoffs: usize,

    /// Maximum conversation size in bytes (UTF-8)
    pub max_conversation_bytes: usize,

    /// Maximum summary size in bytes (UTF-8)
    pub max_summary_bytes: usize,

    /// Maximum title length in characters
    pub max_title_length: usize,

    /// Maximum key length in characters
    pub max_key_length: usize,

    /// Pattern every key must match
    pub key_pattern: Regex,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_handoffs: DEFAULT_MAX_HANDOFFS,
            max_conversation_bytes: DEFAULT_MAX_CONVERSATION_BYTES,
            max_summary_bytes: DEFAULT_MAX_SUMMARY_BYTES,
            max_title_length: DEFAULT_MAX_TITLE_LENGTH,
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            key_pattern: KEY_REGEX.clone(),
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            max_handoffs: env_number("HANDOFF_MAX_COUNT", DEFAULT_MAX_HANDOFFS, 1..=10_000),
            max_conversation_bytes: env_number(
                "HANDOFF_MAX_CONVERSATION_BYTES",
                DEFAULT_MAX_CONVERSATION_BYTES,
                1024..=100 * 1024 * 1024,
            ),
            max_summary_bytes: env_number(
                "HANDOFF_MAX_SUMMARY_BYTES",
                DEFAULT_MAX_SUMMARY_BYTES,
                100..=1024 * 1024,
            ),
            max_title_length: env_number(
                "HANDOFF_MAX_TITLE_LENGTH",
                DEFAULT_MAX_TITLE_LENGTH,
                10..=10_000,
            ),
            max_key_length: env_number("HANDOFF_MAX_KEY_LENGTH", DEFAULT_MAX_KEY_LENGTH, 10..=1000),
            key_pattern: KEY_REGEX.clone(),
        }
    }

    /// Same limits with a different capacity
    pub fn with_max_handoffs(mut self, max_handoffs: usize) -> Self {
        self.max_handoffs = max_handoffs;
        self
    }

    pub fn with_max_conversation_bytes(mut self, bytes: usize) -> Self {
        self.max_conversation_bytes = bytes;
        self
    }

    pub fn with_max_summary_bytes(mut self, bytes: usize) -> Self {
        self.max_summary_bytes = bytes;
        self
    }
}

/// Read a numeric environment variable, falling back to `default` when the
/// variable is unset, empty, unparseable or outside `range`.
pub fn env_number<T>(name: &str, default: T, range: RangeInclusive<T>) -> T
where
    T: FromStr + PartialOrd + Copy + Display,
{
    let raw = match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        _ => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(value) if range.contains(&value) => value,
        Ok(value) => {
            warn!(
                "{}={} is outside [{}, {}], using default {}",
                name,
                value,
                range.start(),
                range.end(),
                default
            );
            default
        }
        Err(_) => {
            warn!("{}={:?} is not a number, using default {}", name, raw, default);
            default
        }
    }
}
