//! Upload session lifecycle: creation, lookup, progress and reclamation.
//!
//! A session is two resources, a store record and a staging directory. The
//! registry creates and destroys them together.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::session::{missing_indices, MarkOutcome, NewUploadSession, UploadSession};
use super::store::SessionStore;
use crate::file::ChunkStore;
use crate::{HoardError, Result};

/// What a new session needs besides its id and staging directory.
#[derive(Debug, Clone)]
pub struct SessionDraft {
    /// Owning user.
    pub owner_id: i64,
    /// Sanitized file name.
    pub filename: String,
    /// Declared file size.
    pub total_size: u64,
    /// Declared chunk count.
    pub total_chunks: u32,
    /// Sandbox-validated destination.
    pub target_path: PathBuf,
}

/// Registry of in-flight uploads.
#[derive(Clone)]
pub struct UploadSessionRegistry {
    store: Arc<dyn SessionStore>,
    chunks: ChunkStore,
}

impl UploadSessionRegistry {
    /// Create a registry over a session store and a staging area.
    pub fn new(store: Arc<dyn SessionStore>, chunks: ChunkStore) -> Self {
        Self { store, chunks }
    }

    /// The staging area.
    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    /// Create a session stamped with the current time.
    pub async fn create(&self, draft: SessionDraft) -> Result<UploadSession> {
        self.create_at(draft, Utc::now()).await
    }

    /// Create a session with an explicit creation time.
    ///
    /// The staging directory is created first; if the record cannot be
    /// stored, the directory is removed again so neither half persists.
    pub async fn create_at(
        &self,
        draft: SessionDraft,
        created_at: chrono::DateTime<Utc>,
    ) -> Result<UploadSession> {
        let id = Uuid::new_v4().to_string();
        let temp_path = self.chunks.create_staging(&id).await?;

        let new_session = NewUploadSession {
            id: id.clone(),
            owner_id: draft.owner_id,
            filename: draft.filename,
            total_size: draft.total_size,
            total_chunks: draft.total_chunks,
            temp_path,
            target_path: draft.target_path,
            created_at,
        };

        match self.store.insert(&new_session).await {
            Ok(session) => {
                debug!(session_id = %id, user_id = session.owner_id, "Created upload session");
                Ok(session)
            }
            Err(e) => {
                if let Err(cleanup) = self.chunks.discard(&id).await {
                    warn!(session_id = %id, "Failed to roll back staging directory: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    /// Look up a session.
    pub async fn get(&self, id: &str) -> Result<UploadSession> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| HoardError::NotFound("upload session".to_string()))
    }

    /// Sessions owned by a user, newest first.
    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UploadSession>> {
        self.store.list_by_owner(owner_id).await
    }

    /// Record a received chunk index.
    pub async fn mark_received(&self, id: &str, index: u32) -> Result<MarkOutcome> {
        self.store.mark_received(id, index).await
    }

    /// Indices of `session` not yet received.
    pub async fn missing(&self, session: &UploadSession) -> Result<Vec<u32>> {
        let received = self.store.received_indices(&session.id).await?;
        Ok(missing_indices(session.total_chunks, &received))
    }

    /// Delete a session's record, then its staging directory.
    ///
    /// Returns false if no record existed. A staging directory left behind
    /// by a failed removal is reclaimed by [`Self::sweep_orphans`].
    pub async fn destroy(&self, id: &str) -> Result<bool> {
        let existed = self.store.delete(id).await?;
        if let Err(e) = self.chunks.discard(id).await {
            warn!(session_id = id, "Failed to remove staging directory: {}", e);
        }
        Ok(existed)
    }

    /// Sessions created at least `max_age` ago, oldest first.
    pub async fn expired(&self, max_age: Duration) -> Result<Vec<UploadSession>> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| HoardError::Validation(format!("max age: {e}")))?;
        self.store.list_created_before(Utc::now() - max_age).await
    }

    /// Destroy every session created at least `max_age` ago. Returns the
    /// number reclaimed.
    pub async fn garbage_collect(&self, max_age: Duration) -> Result<usize> {
        let mut reclaimed = 0;
        for session in self.expired(max_age).await? {
            if self.destroy(&session.id).await? {
                debug!(session_id = %session.id, user_id = session.owner_id, "Reclaimed expired upload session");
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            info!(reclaimed, "Garbage-collected expired upload sessions");
        }
        Ok(reclaimed)
    }

    /// Remove staging directories that have no session record and have not
    /// been modified for `max_age`. Returns the number removed.
    ///
    /// Such directories are left by a crash between staging creation and
    /// record insertion, or by a failed discard.
    pub async fn sweep_orphans(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in self.chunks.list_staging().await? {
            let age = now.duration_since(entry.modified).unwrap_or_default();
            if age < max_age {
                continue;
            }
            if self.store.get(&entry.session_id).await?.is_some() {
                continue;
            }
            match self.chunks.discard(&entry.session_id).await {
                Ok(()) => removed += 1,
                // Not a name a session could have produced.
                Err(HoardError::Validation(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        if removed > 0 {
            info!(removed, "Removed orphaned staging directories");
        }
        Ok(removed)
    }
}
