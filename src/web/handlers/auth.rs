//! Authentication handlers.

use axum::{extract::State, Json};

use super::SharedState;
use crate::db::UserRepository;
use crate::web::dto::{ApiResponse, LoginRequest, LoginResponse, UserInfo, ValidatedJson};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

/// POST /api/auth/login - User login.
pub async fn login(
    State(state): State<SharedState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let user = UserRepository::new(state.db.pool())
        .get_by_username(&req.username)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid username or password"))?;

    crate::verify_password(&req.password, &user.password).map_err(|_| {
        tracing::info!(username = %req.username, "Failed login attempt");
        ApiError::unauthorized("Invalid username or password")
    })?;

    let access_token = state.generate_access_token(&user)?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(ApiResponse::new(LoginResponse {
        access_token,
        expires_in: state.access_token_expiry,
        user: UserInfo::from(&user),
    })))
}

/// GET /api/auth/me - Current user.
pub async fn me(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let user = state.current_user(&auth).await?;
    Ok(Json(ApiResponse::new(UserInfo::from(&user))))
}
