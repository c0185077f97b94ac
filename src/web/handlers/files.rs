//! Directory handlers.

use axum::{
    extract::{Query, State},
    Json,
};

use super::SharedState;
use crate::file::browse;
use crate::web::dto::{
    ApiResponse, Empty, EntryResponse, MkdirRequest, PathQuery, PathResponse, RenameRequest,
    ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

/// GET /api/files/list - List a directory.
pub async fn list_files(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<PathQuery>,
) -> Result<Json<ApiResponse<Vec<EntryResponse>>>, ApiError> {
    let scope = state.user_scope(&auth).await?;
    let entries = browse::list_dir(&scope.sandbox, &query.path).await?;
    Ok(Json(ApiResponse::new(
        entries.into_iter().map(EntryResponse::from).collect(),
    )))
}

/// POST /api/files/mkdir - Create a directory.
pub async fn make_directory(
    State(state): State<SharedState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<MkdirRequest>,
) -> Result<Json<ApiResponse<PathResponse>>, ApiError> {
    let scope = state.user_scope(&auth).await?;
    let created = browse::make_dir(&scope.sandbox, &req.path, &req.name).await?;
    Ok(Json(ApiResponse::new(PathResponse {
        path: created.relative,
    })))
}

/// DELETE /api/files/delete - Delete a file or directory tree.
pub async fn delete_entry(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<PathQuery>,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    let scope = state.user_scope(&auth).await?;
    browse::delete_path(&scope.sandbox, &query.path).await?;
    tracing::info!(user_id = auth.user_id(), path = %query.path, "Entry deleted");
    Ok(Json(ApiResponse::new(Empty {})))
}

/// POST /api/files/rename - Rename an entry in place.
pub async fn rename_entry(
    State(state): State<SharedState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<RenameRequest>,
) -> Result<Json<ApiResponse<PathResponse>>, ApiError> {
    let scope = state.user_scope(&auth).await?;
    let renamed = browse::rename_path(&scope.sandbox, &req.path, &req.new_name).await?;
    Ok(Json(ApiResponse::new(PathResponse {
        path: renamed.relative,
    })))
}
