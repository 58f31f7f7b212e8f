//! Storage abstraction shared by the local and remote backends

use crate::error::StorageResult;
use crate::types::{
    ClearOutcome, Handoff, HandoffSummary, MergeOutcome, MergeSpec, MessageResponse, SaveInput,
    SaveOutcome, StoreStats,
};
use async_trait::async_trait;

/// Operations available on a handoff store
///
/// Implemented by [`LocalStore`](crate::LocalStore) for in-process storage
/// and by the HTTP client that talks to the shared server. Callers get one
/// of the two from the storage coordinator and should not care which.
#[async_trait]
pub trait HandoffStore: Send + Sync {
    /// Create or replace the handoff named by `input.key`
    async fn save(&self, input: SaveInput) -> StorageResult<SaveOutcome>;

    /// All handoffs without their conversations, oldest first
    async fn list(&self) -> StorageResult<Vec<HandoffSummary>>;

    /// Fetch one handoff, optionally keeping only its last `max_messages` messages
    async fn load(&self, key: &str, max_messages: Option<usize>) -> StorageResult<Handoff>;

    async fn delete(&self, key: &str) -> StorageResult<MessageResponse>;

    async fn delete_all(&self) -> StorageResult<ClearOutcome>;

    async fn stats(&self) -> StorageResult<StoreStats>;

    async fn merge(&self, spec: MergeSpec) -> StorageResult<MergeOutcome>;
}
