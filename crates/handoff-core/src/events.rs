//! Audit events emitted by the store
//!
//! The audit logger itself lives outside this crate; the store only needs
//! something it can hand events to.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffEventKind {
    Saved,
    Updated,
    Evicted,
    Deleted,
    Cleared,
    Merged,
}

impl fmt::Display for HandoffEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Saved => "saved",
            Self::Updated => "updated",
            Self::Evicted => "evicted",
            Self::Deleted => "deleted",
            Self::Cleared => "cleared",
            Self::Merged => "merged",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffEvent {
    pub kind: HandoffEventKind,
    pub key: Option<String>,
    pub detail: Option<String>,
}

impl HandoffEvent {
    pub fn new(kind: HandoffEventKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: Some(key.into()),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Sink for store audit events
pub trait EventRecorder: Send + Sync {
    fn record(&self, event: &HandoffEvent);
}

/// Records events as structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, event: &HandoffEvent) {
        tracing::info!(
            event = %event.kind,
            key = event.key.as_deref().unwrap_or(""),
            detail = event.detail.as_deref().unwrap_or(""),
            "handoff event"
        );
    }
}
