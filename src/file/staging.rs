//! On-disk staging area for in-progress uploads.
//!
//! Layout:
//! ```text
//! {staging_root}/
//! ├── 3f2c…-session-id/
//! │   ├── 0
//! │   ├── 1
//! │   └── 2.<nonce>.part   (chunk being written)
//! └── …
//! ```
//!
//! A chunk becomes visible under its final name only after it has been
//! written in full.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{HoardError, Result};

const MERGE_BUFFER_SIZE: usize = 1024 * 1024;

/// A staging directory found on disk.
#[derive(Debug, Clone)]
pub struct StagingEntry {
    /// Directory name, which is the session id.
    pub session_id: String,
    /// Last modification time of the directory.
    pub modified: SystemTime,
}

/// Manages one staging directory per upload session.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    base_path: PathBuf,
}

impl ChunkStore {
    /// Create a chunk store rooted at `base_path`. Nothing is created on disk
    /// until the first session is staged.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// The staging root.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of a session's staging directory.
    pub fn staging_dir(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.base_path.join(session_id))
    }

    /// Create an empty staging directory for a session.
    ///
    /// Fails with [`HoardError::StagingCreateFailed`] if the directory
    /// already exists or cannot be created.
    pub async fn create_staging(&self, session_id: &str) -> Result<PathBuf> {
        let dir = self.staging_dir(session_id)?;

        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| HoardError::StagingCreateFailed(e.to_string()))?;

        match fs::create_dir(&dir).await {
            Ok(()) => {
                debug!(session_id, path = %dir.display(), "Created staging directory");
                Ok(dir)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(
                HoardError::StagingCreateFailed(format!("{} already exists", dir.display())),
            ),
            Err(e) => Err(HoardError::StagingCreateFailed(e.to_string())),
        }
    }

    /// Store the bytes of one chunk, replacing any earlier upload of the
    /// same index.
    pub async fn write_chunk(&self, session_id: &str, index: u32, bytes: &[u8]) -> Result<()> {
        let dir = self.staging_dir(session_id)?;
        let final_path = dir.join(index.to_string());
        // Unique per write so concurrent uploads of one index never share a file.
        let part_path = dir.join(format!("{index}.{}.part", Uuid::new_v4().simple()));

        let result: std::io::Result<()> = async {
            let mut file = File::create(&part_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&part_path, &final_path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&part_path).await;
            return Err(HoardError::ChunkWriteFailed(format!("chunk {index}: {e}")));
        }

        debug!(session_id, chunk_index = index, len = bytes.len(), "Stored chunk");
        Ok(())
    }

    /// Concatenate chunks `0..total_chunks` into `target`.
    ///
    /// The output is assembled in a hidden `.partial` file beside the target
    /// and linked into place only once complete, so a failed merge never
    /// leaves a truncated file under the target name. An existing target is
    /// never overwritten. Returns the number of bytes written.
    pub async fn merge(&self, session_id: &str, total_chunks: u32, target: &Path) -> Result<u64> {
        let dir = self.staging_dir(session_id)?;
        let partial = partial_path(target, session_id)?;

        if fs::symlink_metadata(target).await.is_ok() {
            return Err(HoardError::MergeFailed(
                "destination already exists".to_string(),
            ));
        }

        let result = async {
            let written = assemble(&dir, total_chunks, &partial).await?;
            publish(&partial, target).await?;
            Ok::<u64, HoardError>(written)
        }
        .await;

        // After a hard link the partial is a second name for the target.
        remove_partial(&partial).await;

        let written = result?;
        debug!(session_id, target = %target.display(), bytes = written, "Merged chunks");
        Ok(written)
    }

    /// Remove a session's staging directory. Removing an absent directory is
    /// not an error.
    pub async fn discard(&self, session_id: &str) -> Result<()> {
        let dir = self.staging_dir(session_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(session_id, "Discarded staging directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All staging directories currently on disk.
    pub async fn list_staging(&self) -> Result<Vec<StagingEntry>> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            found.push(StagingEntry {
                session_id: name,
                modified: metadata.modified()?,
            });
        }
        Ok(found)
    }
}

async fn assemble(dir: &Path, total_chunks: u32, partial: &Path) -> Result<u64> {
    let mut out = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(partial)
        .await
        .map_err(|e| HoardError::MergeFailed(format!("cannot create output: {e}")))?;

    let mut written = 0u64;
    for index in 0..total_chunks {
        let chunk = File::open(dir.join(index.to_string()))
            .await
            .map_err(|e| HoardError::MergeFailed(format!("chunk {index}: {e}")))?;
        let mut reader = BufReader::with_capacity(MERGE_BUFFER_SIZE, chunk);
        written += tokio::io::copy_buf(&mut reader, &mut out)
            .await
            .map_err(|e| HoardError::MergeFailed(format!("chunk {index}: {e}")))?;
    }

    out.flush()
        .await
        .map_err(|e| HoardError::MergeFailed(e.to_string()))?;
    out.sync_all()
        .await
        .map_err(|e| HoardError::MergeFailed(e.to_string()))?;
    Ok(written)
}

/// Best-effort removal of a merge's partial file. A leftover stays hidden
/// from listings.
async fn remove_partial(partial: &Path) {
    if let Err(e) = fs::remove_file(partial).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %partial.display(), "Failed to remove partial file: {}", e);
        }
    }
}

/// Move the finished file into place without replacing an existing one.
/// The partial file may remain afterwards.
async fn publish(partial: &Path, target: &Path) -> Result<()> {
    match fs::hard_link(partial, target).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(HoardError::MergeFailed(
            "destination already exists".to_string(),
        )),
        // Filesystems without hard links fall back to a checked rename.
        Err(_) => {
            if fs::symlink_metadata(target).await.is_ok() {
                return Err(HoardError::MergeFailed(
                    "destination already exists".to_string(),
                ));
            }
            fs::rename(partial, target)
                .await
                .map_err(|e| HoardError::MergeFailed(e.to_string()))
        }
    }
}

fn partial_path(target: &Path, session_id: &str) -> Result<PathBuf> {
    let parent = target
        .parent()
        .ok_or_else(|| HoardError::MergeFailed("target has no parent directory".to_string()))?;
    let name = target
        .file_name()
        .ok_or_else(|| HoardError::MergeFailed("target has no file name".to_string()))?;
    Ok(parent.join(format!(".{}.{session_id}.partial", name.to_string_lossy())))
}

fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(HoardError::Validation(format!(
            "invalid session id: {session_id:?}"
        )))
    }
}
