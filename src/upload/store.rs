//! Storage seam for upload session records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::session::{MarkOutcome, NewUploadSession, UploadSession};
use crate::Result;

/// Durable bookkeeping for upload sessions.
///
/// Implementations must make [`SessionStore::mark_received`] atomic: the
/// set of received indices and the derived count change together, and
/// recording an index twice has no effect.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session with no received chunks.
    async fn insert(&self, session: &NewUploadSession) -> Result<UploadSession>;

    /// Look up a session by id.
    async fn get(&self, id: &str) -> Result<Option<UploadSession>>;

    /// Sessions owned by a user, newest first.
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UploadSession>>;

    /// Sessions created at or before `cutoff`.
    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadSession>>;

    /// Record chunk `index` as received.
    ///
    /// Fails with `NotFound` for an unknown session and `OutOfRange` for an
    /// index outside `0..total_chunks`.
    async fn mark_received(&self, id: &str, index: u32) -> Result<MarkOutcome>;

    /// Received indices in ascending order.
    async fn received_indices(&self, id: &str) -> Result<Vec<u32>>;

    /// Remove a session and its received-index set. Returns false if it did
    /// not exist.
    async fn delete(&self, id: &str) -> Result<bool>;
}
