//! API handlers and the state they share.

pub mod auth;
pub mod download;
pub mod files;
pub mod upload;

pub use auth::*;
pub use download::*;
pub use files::*;
pub use upload::*;

use std::sync::Arc;

use jsonwebtoken::{encode, EncodingKey, Header};

use crate::db::{Database, User, UserRepository};
use crate::file::{DownloadSlicer, StorageLayout};
use crate::upload::{UploadCoordinator, UserScope};
use crate::web::error::ApiError;
use crate::web::middleware::{AuthUser, JwtClaims};
use crate::{HoardError, Result};

/// Application state shared across handlers.
pub struct AppState {
    /// Database holding users and upload sessions.
    pub db: Arc<Database>,
    /// Chunked upload coordinator.
    pub coordinator: Arc<UploadCoordinator>,
    /// Download slicer, using the same chunk size as uploads.
    pub slicer: DownloadSlicer,
    /// Storage root layout.
    pub layout: StorageLayout,
    /// JWT encoding key.
    pub encoding_key: EncodingKey,
    /// Access token expiry in seconds.
    pub access_token_expiry: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        db: Arc<Database>,
        coordinator: Arc<UploadCoordinator>,
        layout: StorageLayout,
        jwt_secret: &str,
        access_token_expiry: u64,
    ) -> Result<Self> {
        let slicer = DownloadSlicer::new(coordinator.chunk_size())?;
        Ok(Self {
            db,
            coordinator,
            slicer,
            layout,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            access_token_expiry,
        })
    }

    /// Generate an access token for a user.
    pub fn generate_access_token(&self, user: &User) -> std::result::Result<String, ApiError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = JwtClaims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role.to_string(),
            iat: now,
            exp: now + self.access_token_expiry,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode JWT: {}", e);
            ApiError::internal("Failed to generate token")
        })
    }

    /// Load the authenticated user's current record.
    pub async fn current_user(&self, auth: &AuthUser) -> std::result::Result<User, ApiError> {
        UserRepository::new(self.db.pool())
            .get_by_id(auth.user_id())
            .await?
            .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))
    }

    /// Resolve the caller's storage root as configured now, creating it on
    /// first use.
    pub async fn user_scope(&self, auth: &AuthUser) -> std::result::Result<UserScope, ApiError> {
        let user = self.current_user(auth).await?;
        let sandbox = self.layout.user_sandbox(&user.storage_path)?;
        tokio::fs::create_dir_all(sandbox.root())
            .await
            .map_err(HoardError::Io)?;
        Ok(UserScope {
            user_id: user.id,
            sandbox,
        })
    }
}

/// Shared application state handle.
pub type SharedState = Arc<AppState>;
