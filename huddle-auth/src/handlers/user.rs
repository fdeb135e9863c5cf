//! Current-user handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use huddle_core::error::AppError;

use crate::{
    dtos::{
        auth::{ChangePasswordRequest, MeResponse},
        MessageResponse,
    },
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Get the authenticated caller's profile
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.0.user_id().map_err(AppError::Unauthenticated)?;
    let user = state
        .db
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    Ok((
        StatusCode::OK,
        Json(MeResponse {
            ok: true,
            user: user.sanitized(),
        }),
    ))
}

/// Change the caller's password; revokes all sessions
#[utoipa::path(
    post,
    path = "/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed, sessions revoked", body = MessageResponse),
        (status = 401, description = "Current password incorrect", body = ErrorResponse)
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.0.user_id().map_err(AppError::Unauthenticated)?;
    state
        .auth
        .change_password(user_id, req.current_password, req.new_password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(
            "Password changed; all sessions revoked",
        )),
    ))
}
