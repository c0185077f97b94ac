//! Upload session records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// An in-flight chunked upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Session id (UUID v4).
    pub id: String,
    /// User that initiated the upload.
    pub owner_id: i64,
    /// Sanitized file name.
    pub filename: String,
    /// Declared size of the final file. Advisory only.
    pub total_size: u64,
    /// Declared number of chunks.
    pub total_chunks: u32,
    /// Number of distinct chunk indices received.
    pub uploaded_chunks: u32,
    /// Staging directory holding the received chunks.
    pub temp_path: PathBuf,
    /// Absolute destination of the merged file.
    pub target_path: PathBuf,
    /// Creation time, used for garbage collection.
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    /// Whether every declared chunk has arrived.
    pub fn is_complete(&self) -> bool {
        self.uploaded_chunks >= self.total_chunks
    }
}

/// Fields of a session about to be stored.
#[derive(Debug, Clone)]
pub struct NewUploadSession {
    /// Session id.
    pub id: String,
    /// Owning user.
    pub owner_id: i64,
    /// Sanitized file name.
    pub filename: String,
    /// Declared file size.
    pub total_size: u64,
    /// Declared chunk count.
    pub total_chunks: u32,
    /// Staging directory.
    pub temp_path: PathBuf,
    /// Destination path.
    pub target_path: PathBuf,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<NewUploadSession> for UploadSession {
    fn from(new: NewUploadSession) -> Self {
        Self {
            id: new.id,
            owner_id: new.owner_id,
            filename: new.filename,
            total_size: new.total_size,
            total_chunks: new.total_chunks,
            uploaded_chunks: 0,
            temp_path: new.temp_path,
            target_path: new.target_path,
            created_at: new.created_at,
        }
    }
}

/// Result of recording a chunk index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkOutcome {
    /// False when the index had already been recorded.
    pub newly_received: bool,
    /// Distinct indices recorded after this call.
    pub uploaded: u32,
}

/// Indices in `0..total` not present in `received` (which must be sorted).
pub fn missing_indices(total: u32, received: &[u32]) -> Vec<u32> {
    let mut received = received.iter().peekable();
    (0..total)
        .filter(|index| {
            while received.next_if(|r| **r < *index).is_some() {}
            received.next_if_eq(&index).is_none()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_indices() {
        assert_eq!(missing_indices(5, &[0, 2, 4]), vec![1, 3]);
        assert_eq!(missing_indices(3, &[]), vec![0, 1, 2]);
        assert!(missing_indices(3, &[0, 1, 2]).is_empty());
        assert!(missing_indices(0, &[]).is_empty());
    }

    #[test]
    fn test_from_new_session_starts_empty() {
        let session = UploadSession::from(NewUploadSession {
            id: "s".to_string(),
            owner_id: 1,
            filename: "a.bin".to_string(),
            total_size: 10,
            total_chunks: 2,
            temp_path: PathBuf::from("/tmp/s"),
            target_path: PathBuf::from("/data/a.bin"),
            created_at: Utc::now(),
        });
        assert_eq!(session.uploaded_chunks, 0);
        assert!(!session.is_complete());
    }
}
