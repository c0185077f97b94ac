//! Shared fixtures for the web API tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};
use tempfile::TempDir;

use hoard::db::{NewUser, Role, UserRepository};
use hoard::file::{ChunkStore, StorageLayout};
use hoard::upload::{SqliteSessionStore, UploadCoordinator, UploadSessionRegistry};
use hoard::web::handlers::AppState;
use hoard::web::middleware::{JwtState, RateLimitState};
use hoard::web::router::create_router;
use hoard::{hash_password, Database};

/// JWT secret used by every test server.
pub const JWT_SECRET: &str = "test-secret-key-for-testing-only";

/// Chunk size small enough to split test payloads into several chunks.
pub const CHUNK_SIZE: u64 = 4;

/// Largest file a test upload may declare.
pub const MAX_FILE_SIZE: u64 = 1024;

/// Password given to every test user.
pub const PASSWORD: &str = "password123";

/// A router over an in-memory database and a temporary storage root.
pub struct TestApp {
    pub server: TestServer,
    pub db: Arc<Database>,
    pub state: Arc<AppState>,
    pub layout: StorageLayout,
    _storage: TempDir,
}

impl TestApp {
    /// Create an app with the default test chunk size.
    pub async fn new() -> Self {
        Self::with_limits(CHUNK_SIZE, MAX_FILE_SIZE).await
    }

    /// Create an app with explicit chunk and file size limits.
    pub async fn with_limits(chunk_size: u64, max_file_size: u64) -> Self {
        let storage = TempDir::new().expect("Failed to create storage root");
        let db = Arc::new(
            Database::open_in_memory()
                .await
                .expect("Failed to create test database"),
        );

        let layout = StorageLayout::new(storage.path()).expect("Failed to describe layout");
        let registry = UploadSessionRegistry::new(
            Arc::new(SqliteSessionStore::new(db.pool().clone())),
            ChunkStore::new(layout.staging_dir()),
        );
        let coordinator = Arc::new(UploadCoordinator::new(
            registry,
            chunk_size,
            max_file_size,
        ));
        let state = Arc::new(
            AppState::new(db.clone(), coordinator, layout.clone(), JWT_SECRET, 900)
                .expect("Failed to create app state"),
        );

        let router = create_router(
            state.clone(),
            Arc::new(JwtState::new(JWT_SECRET)),
            Arc::new(RateLimitState::new(1000)),
            &[],
        );
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            db,
            state,
            layout,
            _storage: storage,
        }
    }

    /// Create a user whose storage path is the username.
    pub async fn create_user(&self, username: &str) -> i64 {
        self.create_user_with_path(username, username).await
    }

    /// Create a user with an explicit storage path.
    pub async fn create_user_with_path(&self, username: &str, storage_path: &str) -> i64 {
        let hash = hash_password(PASSWORD).expect("Failed to hash password");
        let user = NewUser::new(username, hash)
            .with_role(Role::User)
            .with_storage_path(storage_path);
        UserRepository::new(self.db.pool())
            .create(&user)
            .await
            .expect("Failed to create user")
            .id
    }

    /// Log in and return the access token.
    pub async fn login(&self, username: &str) -> String {
        let response = self
            .server
            .post("/api/auth/login")
            .json(&json!({ "username": username, "password": PASSWORD }))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["data"]["accessToken"]
            .as_str()
            .expect("accessToken missing")
            .to_string()
    }

    /// Create a user and log in as them.
    pub async fn user_token(&self, username: &str) -> String {
        self.create_user(username).await;
        self.login(username).await
    }

    /// Absolute storage root of a storage path.
    pub fn user_root(&self, storage_path: &str) -> PathBuf {
        self.layout
            .user_sandbox(storage_path)
            .expect("Invalid storage path")
            .root()
            .to_path_buf()
    }

    /// Write a file into a user's tree, creating parent directories.
    pub fn write_user_file(&self, storage_path: &str, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.user_root(storage_path).join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    /// Start an upload and return the response.
    pub async fn init_upload(&self, token: &str, body: Value) -> TestResponse {
        self.server
            .post("/api/files/upload/init")
            .add_header(AUTHORIZATION, bearer(token))
            .json(&body)
            .await
    }

    /// Start an upload that must succeed and return its session id.
    pub async fn start_upload(&self, token: &str, filename: &str, content: &[u8]) -> String {
        let total_chunks = content.len().div_ceil(CHUNK_SIZE as usize);
        let response = self
            .init_upload(
                token,
                json!({
                    "filename": filename,
                    "totalSize": content.len(),
                    "totalChunks": total_chunks,
                }),
            )
            .await;
        response.assert_status_ok();
        response.json::<Value>()["data"]["sessionId"]
            .as_str()
            .expect("sessionId missing")
            .to_string()
    }

    /// Send one chunk as a multipart form.
    pub async fn send_chunk(
        &self,
        token: &str,
        session_id: &str,
        index: &str,
        bytes: &[u8],
    ) -> TestResponse {
        let form = MultipartForm::new()
            .add_text("sessionId", session_id)
            .add_text("chunkIndex", index)
            .add_part(
                "chunk",
                Part::bytes(bytes.to_vec())
                    .file_name("blob")
                    .mime_type("application/octet-stream"),
            );
        self.server
            .post("/api/files/upload/chunk")
            .add_header(AUTHORIZATION, bearer(token))
            .multipart(form)
            .await
    }

    /// Send every chunk of `content` in order.
    pub async fn send_all_chunks(&self, token: &str, session_id: &str, content: &[u8]) {
        for (index, chunk) in content.chunks(CHUNK_SIZE as usize).enumerate() {
            self.send_chunk(token, session_id, &index.to_string(), chunk)
                .await
                .assert_status_ok();
        }
    }

    /// Request completion of an upload.
    pub async fn complete(&self, token: &str, session_id: &str) -> TestResponse {
        self.server
            .post("/api/files/upload/complete")
            .add_header(AUTHORIZATION, bearer(token))
            .json(&json!({ "sessionId": session_id }))
            .await
    }

    /// Upload `content` as `filename` into the user's root.
    pub async fn upload_file(&self, token: &str, filename: &str, content: &[u8]) {
        let session_id = self.start_upload(token, filename, content).await;
        self.send_all_chunks(token, &session_id, content).await;
        self.complete(token, &session_id).await.assert_status_ok();
    }
}

/// Authorization header value for a token.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Error code of an error response.
pub fn error_code(response: &TestResponse) -> String {
    response.json::<Value>()["error"]["code"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
