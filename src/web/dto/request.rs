//! Request DTOs for Web API.

use serde::Deserialize;
use validator::Validate;

use super::validation::{no_control_chars, not_empty_trimmed};

/// Login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Username.
    #[validate(length(min = 1, max = 64, message = "Username is required"))]
    pub username: String,
    /// Password.
    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,
}

/// Start of a chunked upload.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadRequest {
    /// Client-side file name. Sanitized by the server.
    #[validate(
        length(min = 1, max = 255, message = "Filename must be 1-255 characters"),
        custom(function = "not_empty_trimmed"),
        custom(function = "no_control_chars")
    )]
    pub filename: String,
    /// Declared file size in bytes.
    #[validate(range(min = 1, message = "totalSize must be positive"))]
    pub total_size: u64,
    /// Declared number of chunks.
    #[validate(range(min = 1, message = "totalChunks must be positive"))]
    pub total_chunks: u32,
    /// Destination directory relative to the user's root.
    #[serde(default)]
    #[validate(custom(function = "no_control_chars"))]
    pub path: Option<String>,
}

/// Request naming an upload session.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdRequest {
    /// Session id returned by init.
    #[validate(length(min = 1, max = 64, message = "sessionId is required"))]
    pub session_id: String,
}

/// Query naming a path in the user's tree.
#[derive(Debug, Deserialize)]
pub struct PathQuery {
    /// Path relative to the user's root. Empty means the root.
    #[serde(default)]
    pub path: String,
}

/// Query naming one chunk of a file.
#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    /// File path relative to the user's root.
    pub path: String,
    /// Zero-based chunk index.
    pub chunk: u64,
}

/// Directory creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct MkdirRequest {
    /// Parent directory relative to the user's root.
    #[serde(default)]
    #[validate(custom(function = "no_control_chars"))]
    pub path: String,
    /// Name of the new directory.
    #[validate(
        length(min = 1, max = 255, message = "Name must be 1-255 characters"),
        custom(function = "not_empty_trimmed")
    )]
    pub name: String,
}

/// Rename request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    /// Entry to rename, relative to the user's root.
    #[validate(length(min = 1, message = "Path is required"))]
    pub path: String,
    /// New bare name.
    #[validate(
        length(min = 1, max = 255, message = "Name must be 1-255 characters"),
        custom(function = "not_empty_trimmed")
    )]
    pub new_name: String,
}
