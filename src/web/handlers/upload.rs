//! Chunked upload handlers.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, State},
    Json,
};

use super::SharedState;
use crate::upload::InitUpload;
use crate::web::dto::{
    ApiResponse, ChunkProgressResponse, CompleteResponse, Empty, InitUploadRequest,
    InitUploadResponse, SessionIdRequest, SessionResponse, StatusResponse, ValidatedJson,
};
use crate::web::error::{ApiError, ErrorCode};
use crate::web::middleware::AuthUser;

/// POST /api/files/upload/init - Start a chunked upload.
pub async fn init_upload(
    State(state): State<SharedState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<InitUploadRequest>,
) -> Result<Json<ApiResponse<InitUploadResponse>>, ApiError> {
    let scope = state.user_scope(&auth).await?;
    let session = state
        .coordinator
        .init(
            &scope,
            InitUpload {
                filename: req.filename,
                total_size: req.total_size,
                total_chunks: req.total_chunks,
                dest_dir: req.path.unwrap_or_default(),
            },
        )
        .await?;

    Ok(Json(ApiResponse::new(InitUploadResponse {
        session_id: session.id,
        chunk_size: state.coordinator.chunk_size(),
    })))
}

/// Fields of a chunk upload form.
#[derive(Default)]
struct ChunkForm {
    session_id: Option<String>,
    chunk_index: Option<String>,
    chunk: Option<Bytes>,
}

async fn read_chunk_form(mut multipart: Multipart) -> Result<ChunkForm, ApiError> {
    let mut form = ChunkForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let read_error = |e: MultipartError| {
            ApiError::bad_request(format!("Failed to read field {}: {}", name, e))
        };
        match name.as_str() {
            "sessionId" => form.session_id = Some(field.text().await.map_err(read_error)?),
            "chunkIndex" => form.chunk_index = Some(field.text().await.map_err(read_error)?),
            "chunk" => form.chunk = Some(field.bytes().await.map_err(read_error)?),
            _ => {}
        }
    }
    Ok(form)
}

/// Parse a chunk index. Negative or oversized values are out of range.
fn parse_chunk_index(raw: &str) -> Result<u32, ApiError> {
    let index: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("chunkIndex must be an integer"))?;
    u32::try_from(index).map_err(|_| {
        ApiError::new(
            ErrorCode::OutOfRange,
            format!("chunk index {} out of range", index),
        )
    })
}

/// POST /api/files/upload/chunk - Upload one chunk.
pub async fn upload_chunk(
    State(state): State<SharedState>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ChunkProgressResponse>>, ApiError> {
    let form = read_chunk_form(multipart).await?;
    let session_id = form
        .session_id
        .ok_or_else(|| ApiError::bad_request("sessionId is required"))?;
    let index = parse_chunk_index(
        form.chunk_index
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("chunkIndex is required"))?,
    )?;
    let chunk = form
        .chunk
        .ok_or_else(|| ApiError::bad_request("chunk is required"))?;

    let progress = state
        .coordinator
        .accept_chunk(auth.user_id(), &session_id, index, &chunk)
        .await?;

    tracing::debug!(
        session_id = %session_id,
        user_id = auth.user_id(),
        chunk_index = index,
        uploaded = progress.uploaded_count,
        "Chunk stored"
    );
    Ok(Json(ApiResponse::new(progress.into())))
}

/// POST /api/files/upload/complete - Merge the chunks into the target file.
pub async fn complete_upload(
    State(state): State<SharedState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<SessionIdRequest>,
) -> Result<Json<ApiResponse<CompleteResponse>>, ApiError> {
    let scope = state.user_scope(&auth).await?;
    let done = state.coordinator.complete(&scope, &req.session_id).await?;
    Ok(Json(ApiResponse::new(done.into())))
}

/// POST /api/files/upload/cancel - Abandon an upload.
pub async fn cancel_upload(
    State(state): State<SharedState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<SessionIdRequest>,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    state
        .coordinator
        .cancel(auth.user_id(), &req.session_id)
        .await?;
    Ok(Json(ApiResponse::new(Empty {})))
}

/// GET /api/files/upload/sessions - The caller's in-flight uploads.
pub async fn list_upload_sessions(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<SessionResponse>>>, ApiError> {
    let sessions = state.coordinator.list_sessions(auth.user_id()).await?;
    Ok(Json(ApiResponse::new(
        sessions.into_iter().map(SessionResponse::from).collect(),
    )))
}

/// GET /api/files/upload/:id - Progress of one upload.
pub async fn upload_status(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<StatusResponse>>, ApiError> {
    let status = state.coordinator.status(auth.user_id(), &session_id).await?;
    Ok(Json(ApiResponse::new(status.into())))
}
