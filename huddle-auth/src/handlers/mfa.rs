//! MFA handlers: TOTP setup/confirm/disable and login-challenge
//! verification.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use huddle_core::error::AppError;

use crate::{
    dtos::{
        mfa::{ConfirmTotpRequest, ConfirmTotpResponse, DisableTotpRequest, MfaVerifyRequest,
              SetupTotpResponse},
        MessageResponse,
    },
    handlers::session_cookies,
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Begin TOTP setup for the caller
#[utoipa::path(
    post,
    path = "/auth/mfa/totp/setup",
    responses(
        (status = 200, description = "Secret generated, MFA not yet enabled", body = SetupTotpResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn setup_totp(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.0.user_id().map_err(AppError::Unauthenticated)?;
    let (secret_base32, otpauth_uri) = state.mfa.setup_totp(user_id).await?;

    Ok((
        StatusCode::OK,
        Json(SetupTotpResponse {
            ok: true,
            secret_base32,
            otpauth_uri,
        }),
    ))
}

/// Confirm TOTP setup with the first code; enables MFA
#[utoipa::path(
    post,
    path = "/auth/mfa/totp/confirm",
    request_body = ConfirmTotpRequest,
    responses(
        (status = 200, description = "MFA enabled; recovery codes returned once", body = ConfirmTotpResponse),
        (status = 401, description = "Invalid code", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn confirm_totp(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ConfirmTotpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.0.user_id().map_err(AppError::Unauthenticated)?;
    let recovery_codes = state.mfa.confirm_totp(user_id, &req.code).await?;

    Ok((
        StatusCode::OK,
        Json(ConfirmTotpResponse {
            ok: true,
            recovery_codes,
        }),
    ))
}

/// Verify a pending login challenge and complete the login
#[utoipa::path(
    post,
    path = "/auth/mfa/verify",
    request_body = MfaVerifyRequest,
    responses(
        (status = 200, description = "Challenge verified, session issued", body = SessionTokens),
        (status = 401, description = "Invalid challenge or code", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA"
)]
pub async fn verify_during_login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<MfaVerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = state
        .mfa
        .verify_during_login(
            req.challenge_id,
            req.code.as_deref(),
            req.recovery_code.as_deref(),
        )
        .await?;

    // Challenge verified: resume the login the password check started.
    let tokens = state.auth.issue_session_for(user_id).await?;
    let jar = session_cookies(&state, &tokens);
    Ok((StatusCode::OK, jar, Json(tokens)))
}

/// Disable MFA for the caller
#[utoipa::path(
    post,
    path = "/auth/mfa/totp/disable",
    request_body = DisableTotpRequest,
    responses(
        (status = 200, description = "MFA disabled", body = MessageResponse),
        (status = 401, description = "Invalid code", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn disable_totp(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<DisableTotpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.0.user_id().map_err(AppError::Unauthenticated)?;
    state.mfa.disable(user_id, &req.code).await?;

    Ok((StatusCode::OK, Json(MessageResponse::new("MFA disabled"))))
}
