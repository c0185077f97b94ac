//! Chunked upload orchestration.
//!
//! Operations on one session are serialized through a per-session
//! read/write lock: chunk writes share the read side, completion and
//! cancellation take the write side. Completion therefore never observes
//! a chunk that is still being written.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::registry::{SessionDraft, UploadSessionRegistry};
use super::session::UploadSession;
use crate::file::{sanitize_filename, PathSandbox};
use crate::{HoardError, Result};

/// The caller of an upload operation.
#[derive(Debug, Clone)]
pub struct UserScope {
    /// Authenticated user id.
    pub user_id: i64,
    /// The user's storage root, as configured now.
    pub sandbox: PathSandbox,
}

/// Parameters of a new upload.
#[derive(Debug, Clone)]
pub struct InitUpload {
    /// Client-supplied file name, sanitized before use.
    pub filename: String,
    /// Declared size of the file in bytes.
    pub total_size: u64,
    /// Declared number of chunks.
    pub total_chunks: u32,
    /// Destination directory relative to the user's root.
    pub dest_dir: String,
}

/// Progress after a chunk was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Distinct chunk indices received.
    pub uploaded_count: u32,
    /// Declared chunk count.
    pub total_chunks: u32,
}

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    /// File name of the merged file.
    pub filename: String,
    /// Path relative to the user's root.
    pub path: String,
    /// Bytes written.
    pub size: u64,
}

/// Session progress with the indices still outstanding.
#[derive(Debug, Clone)]
pub struct UploadStatus {
    /// The session record.
    pub session: UploadSession,
    /// Indices not yet received, ascending.
    pub missing: Vec<u32>,
}

/// Drives upload sessions from init to completion.
pub struct UploadCoordinator {
    registry: UploadSessionRegistry,
    chunk_size: u64,
    max_file_size: u64,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl UploadCoordinator {
    /// Create a coordinator.
    ///
    /// `chunk_size` bounds the size of every accepted chunk and is returned
    /// to clients at init; `max_file_size` bounds the declared file size.
    pub fn new(registry: UploadSessionRegistry, chunk_size: u64, max_file_size: u64) -> Self {
        Self {
            registry,
            chunk_size,
            max_file_size,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The session registry.
    pub fn registry(&self) -> &UploadSessionRegistry {
        &self.registry
    }

    /// Chunk size clients must use.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Start an upload. Returns the new session.
    pub async fn init(&self, scope: &UserScope, request: InitUpload) -> Result<UploadSession> {
        if request.total_size == 0 {
            return Err(HoardError::Validation(
                "totalSize must be positive".to_string(),
            ));
        }
        if request.total_chunks == 0 {
            return Err(HoardError::Validation(
                "totalChunks must be positive".to_string(),
            ));
        }
        if request.total_size > self.max_file_size {
            return Err(HoardError::Validation(format!(
                "totalSize exceeds the limit of {} bytes",
                self.max_file_size
            )));
        }
        if u64::from(request.total_chunks) > request.total_size {
            return Err(HoardError::Validation(
                "totalChunks exceeds totalSize".to_string(),
            ));
        }
        if u64::from(request.total_chunks) < request.total_size.div_ceil(self.chunk_size) {
            return Err(HoardError::Validation(format!(
                "totalChunks too small for a chunk size of {} bytes",
                self.chunk_size
            )));
        }

        let filename = sanitize_filename(&request.filename)?;
        let dest = format!("{}/{}", request.dest_dir.trim_end_matches('/'), filename);
        let target = scope.sandbox.resolve(&dest)?;
        scope.sandbox.verify_links(&target.absolute).await?;

        if tokio::fs::symlink_metadata(&target.absolute).await.is_ok() {
            return Err(HoardError::Conflict(format!("/{}", target.relative)));
        }

        let session = self
            .registry
            .create(SessionDraft {
                owner_id: scope.user_id,
                filename,
                total_size: request.total_size,
                total_chunks: request.total_chunks,
                target_path: target.absolute,
            })
            .await?;

        info!(
            session_id = %session.id,
            user_id = scope.user_id,
            filename = %session.filename,
            total_chunks = session.total_chunks,
            "Upload session started"
        );
        Ok(session)
    }

    /// Store one chunk. Re-sending an index replaces its bytes without
    /// changing the count.
    pub async fn accept_chunk(
        &self,
        caller_id: i64,
        session_id: &str,
        index: u32,
        bytes: &[u8],
    ) -> Result<ChunkProgress> {
        let lock = self.session_lock(session_id);
        let _guard = lock.read().await;

        let session = self.owned_session(caller_id, session_id).await?;
        if index >= session.total_chunks {
            return Err(HoardError::OutOfRange {
                index: u64::from(index),
                total: u64::from(session.total_chunks),
            });
        }
        if bytes.is_empty() {
            return Err(HoardError::Validation("chunk is empty".to_string()));
        }
        if bytes.len() as u64 > self.chunk_size {
            return Err(HoardError::Validation(format!(
                "chunk exceeds {} bytes",
                self.chunk_size
            )));
        }

        self.registry
            .chunks()
            .write_chunk(session_id, index, bytes)
            .await?;
        let outcome = self.registry.mark_received(session_id, index).await?;

        Ok(ChunkProgress {
            uploaded_count: outcome.uploaded,
            total_chunks: session.total_chunks,
        })
    }

    /// Merge all chunks into the target file and end the session.
    ///
    /// Every failure leaves the session in place so completion can be
    /// retried without re-sending chunks.
    pub async fn complete(&self, scope: &UserScope, session_id: &str) -> Result<CompletedUpload> {
        let lock = self.session_lock(session_id);
        let _guard = lock.write().await;

        let session = self.owned_session(scope.user_id, session_id).await?;
        if !session.is_complete() {
            return Err(HoardError::Incomplete {
                uploaded: session.uploaded_chunks,
                total: session.total_chunks,
            });
        }

        // The user's root may have changed since init.
        let target = &session.target_path;
        if !scope.sandbox.contains(target) || target == scope.sandbox.root() {
            warn!(
                session_id,
                user_id = scope.user_id,
                path = %target.display(),
                "Upload target no longer inside storage root"
            );
            return Err(HoardError::SandboxViolation(target.display().to_string()));
        }
        scope.sandbox.verify_links(target).await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HoardError::MergeFailed(format!("cannot create directory: {e}")))?;
            scope.sandbox.verify_links(parent).await?;
        }

        let size = self
            .registry
            .chunks()
            .merge(session_id, session.total_chunks, target)
            .await?;

        // The file is published; a leftover record is reclaimed by GC.
        if let Err(e) = self.registry.destroy(session_id).await {
            warn!(session_id, "Failed to remove completed upload session: {}", e);
        }
        self.forget_lock(session_id);

        info!(
            session_id,
            user_id = scope.user_id,
            path = %target.display(),
            size,
            "Upload completed"
        );
        Ok(CompletedUpload {
            filename: session.filename,
            path: relative_to(scope.sandbox.root(), target),
            size,
        })
    }

    /// Abandon a session and discard its chunks.
    pub async fn cancel(&self, caller_id: i64, session_id: &str) -> Result<()> {
        let lock = self.session_lock(session_id);
        let _guard = lock.write().await;

        self.owned_session(caller_id, session_id).await?;
        self.registry.destroy(session_id).await?;
        self.forget_lock(session_id);

        info!(session_id, user_id = caller_id, "Upload cancelled");
        Ok(())
    }

    /// The caller's sessions, newest first.
    pub async fn list_sessions(&self, caller_id: i64) -> Result<Vec<UploadSession>> {
        self.registry.list_by_owner(caller_id).await
    }

    /// Progress of one session, including the indices still missing.
    pub async fn status(&self, caller_id: i64, session_id: &str) -> Result<UploadStatus> {
        let session = self.owned_session(caller_id, session_id).await?;
        let missing = self.registry.missing(&session).await?;
        Ok(UploadStatus { session, missing })
    }

    /// Reclaim sessions older than `max_age` and staging directories with
    /// no session. Returns the number of sessions reclaimed.
    ///
    /// Each session is destroyed under its write lock, so a chunk write or
    /// merge in progress finishes first.
    pub async fn garbage_collect(&self, max_age: Duration) -> Result<usize> {
        let mut reclaimed = 0;
        for session in self.registry.expired(max_age).await? {
            let lock = self.session_lock(&session.id);
            let _guard = lock.write().await;
            if self.registry.destroy(&session.id).await? {
                debug!(session_id = %session.id, user_id = session.owner_id, "Reclaimed expired upload session");
                reclaimed += 1;
            }
            self.forget_lock(&session.id);
        }
        if reclaimed > 0 {
            info!(reclaimed, "Garbage-collected expired upload sessions");
        }

        self.registry.sweep_orphans(max_age).await?;
        self.prune_locks();
        Ok(reclaimed)
    }

    async fn owned_session(&self, caller_id: i64, session_id: &str) -> Result<UploadSession> {
        let session = match self.registry.get(session_id).await {
            Ok(session) => session,
            Err(e @ HoardError::NotFound(_)) => {
                // Unknown ids must not accumulate lock entries.
                self.forget_lock(session_id);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        if session.owner_id != caller_id {
            warn!(session_id, user_id = caller_id, "Access to another user's upload session");
            return Err(HoardError::Forbidden(
                "upload session belongs to another user".to_string(),
            ));
        }
        Ok(session)
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<String, Arc<RwLock<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_lock(&self, session_id: &str) -> Arc<RwLock<()>> {
        Arc::clone(self.lock_table().entry(session_id.to_string()).or_default())
    }

    fn forget_lock(&self, session_id: &str) {
        self.lock_table().remove(session_id);
    }

    /// Drop lock entries nobody is holding.
    fn prune_locks(&self) {
        self.lock_table()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}
