//! Download handlers.
//!
//! Files larger than one chunk are fetched slice by slice: the client asks
//! for the plan, then requests each chunk index, possibly in parallel.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::Response,
    Json,
};
use serde_json::json;

use super::SharedState;
use crate::file::ResolvedPath;
use crate::web::dto::{ApiResponse, ChunkQuery, DownloadInfoResponse, PathQuery};
use crate::web::error::{ApiError, ErrorCode};
use crate::web::middleware::AuthUser;

const X_CHUNK_INDEX: HeaderName = HeaderName::from_static("x-chunk-index");
const X_TOTAL_CHUNKS: HeaderName = HeaderName::from_static("x-total-chunks");

/// Build a Content-Disposition value that survives any file name.
///
/// Names that are plain ASCII go in `filename`; anything else gets an
/// ASCII fallback plus an RFC 5987 `filename*` parameter.
pub fn content_disposition_header(filename: &str) -> String {
    let plain = filename
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\');
    if plain {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let fallback: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if !c.is_ascii() => '_',
            c => c,
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// Resolve a file path in the caller's tree, rejecting symlink escapes.
async fn resolve_file(
    state: &SharedState,
    auth: &AuthUser,
    path: &str,
) -> Result<(ResolvedPath, String), ApiError> {
    let scope = state.user_scope(auth).await?;
    let resolved = scope.sandbox.resolve(path)?;
    if resolved.relative.is_empty() {
        return Err(ApiError::bad_request("A file path is required"));
    }
    scope.sandbox.verify_links(&resolved.absolute).await?;

    let filename = resolved
        .absolute
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((resolved, filename))
}

fn build_response(builder: axum::http::response::Builder, body: Body) -> Result<Response, ApiError> {
    builder.body(body).map_err(|e| {
        tracing::error!("Failed to build download response: {}", e);
        ApiError::internal("Failed to build response")
    })
}

/// GET /api/files/download/info - Chunk plan of a file.
pub async fn download_info(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<PathQuery>,
) -> Result<Json<ApiResponse<DownloadInfoResponse>>, ApiError> {
    let (resolved, filename) = resolve_file(&state, &auth, &query.path).await?;
    let plan = state.slicer.plan_info(&resolved.absolute).await?;
    Ok(Json(ApiResponse::new(DownloadInfoResponse::new(filename, plan))))
}

/// GET /api/files/download/chunk - One slice of a file.
pub async fn download_chunk(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<ChunkQuery>,
) -> Result<Response, ApiError> {
    let (resolved, filename) = resolve_file(&state, &auth, &query.path).await?;
    let slice = state
        .slicer
        .read_chunk(&resolved.absolute, query.chunk)
        .await?;

    tracing::debug!(
        user_id = auth.user_id(),
        path = %resolved.relative,
        chunk_index = slice.index,
        "Serving chunk"
    );

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, slice.len())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&filename),
        )
        .header(X_CHUNK_INDEX, slice.index)
        .header(X_TOTAL_CHUNKS, slice.plan.total_chunks);
    build_response(builder, Body::from_stream(slice.stream))
}

/// GET /api/files/download - Whole file, for files no larger than a chunk.
pub async fn download_file(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let (resolved, filename) = resolve_file(&state, &auth, &query.path).await?;
    let plan = state.slicer.plan_info(&resolved.absolute).await?;
    if plan.size > state.slicer.chunk_size() {
        return Err(ApiError::with_details(
            ErrorCode::BadRequest,
            "File too large for direct download, use chunked download",
            json!({ "useChunked": true, "size": plan.size }),
        ));
    }

    let (size, stream) = state.slicer.open_whole(&resolved.absolute).await?;
    let content_type = mime_guess::from_path(&resolved.absolute)
        .first_or_octet_stream()
        .to_string();

    tracing::debug!(user_id = auth.user_id(), path = %resolved.relative, size, "Serving file");

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&filename),
        );
    build_response(builder, Body::from_stream(stream))
}
