//! Router configuration for Web API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{
    cancel_upload, complete_upload, delete_entry, download_chunk, download_file, download_info,
    init_upload, list_files, list_upload_sessions, login, make_directory, me, rename_entry,
    upload_chunk, upload_status, SharedState,
};
use super::middleware::{create_cors_layer, jwt_auth, login_rate_limit, JwtState, RateLimitState};

/// Room for multipart boundaries and the text fields around a chunk.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Create the main API router.
pub fn create_router(
    app_state: SharedState,
    jwt_state: Arc<JwtState>,
    rate_limit: Arc<RateLimitState>,
    cors_origins: &[String],
) -> Router {
    let chunk_body_limit =
        usize::try_from(app_state.coordinator.chunk_size().saturating_add(MULTIPART_OVERHEAD))
            .unwrap_or(usize::MAX);

    let auth_routes = Router::new()
        .route(
            "/login",
            post(login).layer(middleware::from_fn(move |req, next| {
                login_rate_limit(Arc::clone(&rate_limit), req, next)
            })),
        )
        .route("/me", get(me));

    let upload_routes = Router::new()
        .route("/init", post(init_upload))
        .route(
            "/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(chunk_body_limit)),
        )
        .route("/complete", post(complete_upload))
        .route("/cancel", post(cancel_upload))
        .route("/sessions", get(list_upload_sessions))
        .route("/:id", get(upload_status));

    let file_routes = Router::new()
        .nest("/upload", upload_routes)
        .route("/download", get(download_file))
        .route("/download/info", get(download_info))
        .route("/download/chunk", get(download_chunk))
        .route("/list", get(list_files))
        .route("/mkdir", post(make_directory))
        .route("/delete", delete(delete_entry))
        .route("/rename", post(rename_entry));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/files", file_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(move |req, next| {
                    jwt_auth(Arc::clone(&jwt_state), req, next)
                })),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
