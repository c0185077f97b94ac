//! Response DTOs for Web API.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::User;
use crate::file::{ChunkPlan, EntryInfo};
use crate::upload::{ChunkProgress, CompletedUpload, UploadSession, UploadStatus};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Empty object body for operations with nothing to report.
#[derive(Debug, Serialize)]
pub struct Empty {}

/// Login response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Access token (JWT).
    pub access_token: String,
    /// Access token expiry in seconds.
    pub expires_in: u64,
    /// User information.
    pub user: UserInfo,
}

/// User information in responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// User ID.
    pub id: i64,
    /// Username.
    pub username: String,
    /// User role.
    pub role: String,
    /// Storage root relative to the users directory.
    pub storage_path: String,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role.to_string(),
            storage_path: user.storage_path.clone(),
        }
    }
}

/// Response to upload init.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    /// New session id.
    pub session_id: String,
    /// Chunk size the client must use.
    pub chunk_size: u64,
}

/// Progress after a chunk.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgressResponse {
    /// Distinct chunks received.
    pub uploaded_count: u32,
    /// Declared chunk count.
    pub total_chunks: u32,
}

impl From<ChunkProgress> for ChunkProgressResponse {
    fn from(progress: ChunkProgress) -> Self {
        Self {
            uploaded_count: progress.uploaded_count,
            total_chunks: progress.total_chunks,
        }
    }
}

/// Response to upload completion.
#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    /// File name.
    pub filename: String,
    /// Path relative to the user's root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

impl From<CompletedUpload> for CompleteResponse {
    fn from(done: CompletedUpload) -> Self {
        Self {
            filename: done.filename,
            path: done.path,
            size: done.size,
        }
    }
}

/// Summary of an upload session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Session id.
    pub session_id: String,
    /// File name.
    pub filename: String,
    /// Declared size.
    pub total_size: u64,
    /// Declared chunk count.
    pub total_chunks: u32,
    /// Distinct chunks received.
    pub uploaded_count: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<UploadSession> for SessionResponse {
    fn from(session: UploadSession) -> Self {
        Self {
            session_id: session.id,
            filename: session.filename,
            total_size: session.total_size,
            total_chunks: session.total_chunks,
            uploaded_count: session.uploaded_chunks,
            created_at: session.created_at,
        }
    }
}

/// Session summary with the indices still missing.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Session summary.
    #[serde(flatten)]
    pub session: SessionResponse,
    /// Indices not yet received.
    pub missing: Vec<u32>,
}

impl From<UploadStatus> for StatusResponse {
    fn from(status: UploadStatus) -> Self {
        Self {
            session: status.session.into(),
            missing: status.missing,
        }
    }
}

/// Download plan of a file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfoResponse {
    /// File name.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
    /// Number of chunks.
    pub total_chunks: u64,
    /// Chunk size in bytes.
    pub chunk_size: u64,
}

impl DownloadInfoResponse {
    /// Build from a file name and its plan.
    pub fn new(filename: String, plan: ChunkPlan) -> Self {
        Self {
            filename,
            size: plan.size,
            total_chunks: plan.total_chunks,
            chunk_size: plan.chunk_size,
        }
    }
}

/// Directory entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    /// Entry name.
    pub name: String,
    /// Path relative to the user's root.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
}

impl From<EntryInfo> for EntryResponse {
    fn from(entry: EntryInfo) -> Self {
        Self {
            name: entry.name,
            path: entry.path,
            is_directory: entry.is_directory,
            size: entry.size,
            modified: entry.modified,
        }
    }
}

/// Path of a created or renamed entry.
#[derive(Debug, Serialize)]
pub struct PathResponse {
    /// Path relative to the user's root.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_status_response_flattens_session() {
        let created_at = Utc::now();
        let status = UploadStatus {
            session: UploadSession {
                id: "s1".to_string(),
                owner_id: 1,
                filename: "a.bin".to_string(),
                total_size: 9,
                total_chunks: 3,
                uploaded_chunks: 1,
                temp_path: PathBuf::from("/tmp/s1"),
                target_path: PathBuf::from("/data/a.bin"),
                created_at,
            },
            missing: vec![1, 2],
        };

        let value = serde_json::to_value(ApiResponse::new(StatusResponse::from(status))).unwrap();
        let data = &value["data"];
        assert_eq!(data["sessionId"], "s1");
        assert_eq!(data["uploadedCount"], 1);
        assert_eq!(data["totalChunks"], 3);
        assert_eq!(data["missing"], json!([1, 2]));
        assert!(data.get("targetPath").is_none());
    }

    #[test]
    fn test_download_info_camel_case() {
        let info = DownloadInfoResponse::new("a.bin".to_string(), ChunkPlan::new(7, 3));
        let value = serde_json::to_value(info).unwrap();
        assert_eq!(
            value,
            json!({"filename": "a.bin", "size": 7, "totalChunks": 3, "chunkSize": 3})
        );
    }
}
