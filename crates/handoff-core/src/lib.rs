//! Core types and the in-process store for conversation handoffs
//!
//! A handoff is a named record of conversational context that one AI client
//! session leaves for another. This crate owns everything that does not
//! touch the network:
//!
//! - the data model ([`Handoff`], [`HandoffSummary`], [`SaveInput`], [`MergeSpec`])
//! - capacity limits parsed from the environment ([`Config`])
//! - the [`HandoffStore`] trait shared by the local and remote backends
//! - [`LocalStore`], the bounded FIFO-evicting map with its merge algorithm
//!
//! The shared server keeps its canonical copy in a [`LocalStore`], and every
//! client keeps one as its standalone fallback.

pub mod config;
pub mod error;
pub mod events;
pub mod local;
pub mod merge;
pub mod messages;
pub mod store;
pub mod types;

pub use config::{env_number, Config, KEY_PATTERN};
pub use error::{StorageError, StorageResult};
pub use events::{EventRecorder, HandoffEvent, HandoffEventKind, TracingRecorder};
pub use local::{Clock, LocalStore};
pub use messages::{truncate_messages, MAX_MESSAGES_RANGE};
pub use store::HandoffStore;
pub use types::{
    ClearOutcome, Handoff, HandoffSummary, LimitsSnapshot, MergeOutcome, MergeSpec,
    MergeStrategy, MessageResponse, SaveInput, SaveOutcome, StoreStats, UsageSnapshot,
};

/// Name the shared server reports from `GET /`, used to tell it apart from
/// unrelated services during port scanning.
pub const SERVER_NAME: &str = "handoff-server";
