use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use huddle_core::error::AppError;

use crate::{
    dtos::auth::{RegisterRequest, RegisterResponse},
    handlers::session_cookies,
    utils::ValidatedJson,
    AppState,
};

/// Register a new user and their organization
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User and organization created", body = RegisterResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, org, tokens) = state.auth.register(req).await?;

    let jar = session_cookies(&state, &tokens);
    let body = RegisterResponse {
        ok: true,
        user: user.sanitized(),
        org,
        tokens,
    };

    Ok((StatusCode::CREATED, jar, Json(body)))
}
