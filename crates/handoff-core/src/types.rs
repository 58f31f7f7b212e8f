//! Handoff data model and operation results
//!
//! These types are the JSON bodies of the shared server's HTTP surface as
//! well as the in-process API, so their field names are part of the wire
//! format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored handoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub key: String,
    pub title: String,
    pub summary: String,
    pub conversation: String,
    pub from_ai: String,
    pub from_project: String,
    /// Creation time of this version; orders FIFO eviction and chronological merge
    pub created_at: DateTime<Utc>,
}

/// Listing projection of a [`Handoff`] without the conversation body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffSummary {
    pub key: String,
    pub title: String,
    pub summary: String,
    pub from_ai: String,
    pub from_project: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Handoff> for HandoffSummary {
    fn from(handoff: &Handoff) -> Self {
        Self {
            key: handoff.key.clone(),
            title: handoff.title.clone(),
            summary: handoff.summary.clone(),
            from_ai: handoff.from_ai.clone(),
            from_project: handoff.from_project.clone(),
            created_at: handoff.created_at,
        }
    }
}

/// Input for saving a handoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveInput {
    pub key: String,
    pub title: String,
    pub summary: String,
    pub conversation: String,
    #[serde(default = "default_from_ai")]
    pub from_ai: String,
    #[serde(default)]
    pub from_project: String,
}

fn default_from_ai() -> String {
    "unknown".to_string()
}

impl SaveInput {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        conversation: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            summary: summary.into(),
            conversation: conversation.into(),
            from_ai: default_from_ai(),
            from_project: String::new(),
        }
    }

    pub fn from_ai(mut self, from_ai: impl Into<String>) -> Self {
        self.from_ai = from_ai.into();
        self
    }

    pub fn from_project(mut self, from_project: impl Into<String>) -> Self {
        self.from_project = from_project.into();
        self
    }
}

/// How merge orders its sources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Oldest `created_at` first
    #[default]
    Chronological,
    /// The order keys were given in
    Sequential,
}

/// Request to merge two or more handoffs into one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSpec {
    pub keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_summary: Option<String>,
    #[serde(default)]
    pub delete_sources: bool,
    #[serde(default)]
    pub strategy: MergeStrategy,
}

impl MergeSpec {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            new_key: None,
            new_title: None,
            new_summary: None,
            delete_sources: false,
            strategy: MergeStrategy::default(),
        }
    }

    pub fn strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn delete_sources(mut self, delete: bool) -> Self {
        self.delete_sources = delete;
        self
    }

    pub fn new_key(mut self, key: impl Into<String>) -> Self {
        self.new_key = Some(key.into());
        self
    }

    pub fn new_title(mut self, title: impl Into<String>) -> Self {
        self.new_title = Some(title.into());
        self
    }

    pub fn new_summary(mut self, summary: impl Into<String>) -> Self {
        self.new_summary = Some(summary.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub message: String,
    /// Key removed to make room, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evicted: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearOutcome {
    pub message: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub message: String,
    pub merged_key: String,
    pub source_count: usize,
    pub deleted_sources: bool,
}

/// Usage and limits snapshot returned by `stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub current: UsageSnapshot,
    pub limits: LimitsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub handoffs: usize,
    pub total_bytes: usize,
    pub usage_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsSnapshot {
    pub max_handoffs: usize,
    pub max_conversation_bytes: usize,
    pub max_summary_bytes: usize,
    pub max_title_length: usize,
    pub max_key_length: usize,
}
