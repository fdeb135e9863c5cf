use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use huddle_core::error::AppError;

use crate::{
    dtos::{
        auth::{LoginRequest, LoginResponse, LogoutRequest, RefreshRequest},
        MessageResponse,
    },
    handlers::{clear_session_cookies, session_cookies},
    middleware::{AuthUser, REFRESH_COOKIE},
    services::LoginOutcome,
    utils::ValidatedJson,
    AppState,
};

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued, or MFA challenge pending", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    match state.auth.login(req).await? {
        LoginOutcome::Session(tokens) => {
            let jar = session_cookies(&state, &tokens);
            Ok((StatusCode::OK, jar, Json(LoginResponse::Session(*tokens))).into_response())
        }
        LoginOutcome::MfaRequired {
            challenge_id,
            expires_in,
        } => Ok((
            StatusCode::OK,
            Json(LoginResponse::MfaPending {
                ok: true,
                mfa_pending: true,
                challenge_id,
                expires_in,
            }),
        )
            .into_response()),
    }
}

/// Refresh the session with a rotating refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair issued", body = SessionTokens),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = resolve_refresh_token(req.refresh_token, &jar)?;
    let tokens = state.auth.refresh(&token).await?;

    let jar = session_cookies(&state, &tokens);
    Ok((StatusCode::OK, jar, Json(tokens)))
}

/// Logout and invalidate the session
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Idempotent: logging out without a resolvable token still clears cookies.
    if let Ok(token) = resolve_refresh_token(req.refresh_token, &jar) {
        state.auth.logout(&token).await?;
    }

    let jar = clear_session_cookies(jar);
    Ok((StatusCode::OK, jar, Json(MessageResponse::new("Logged out"))))
}

/// Logout everywhere: invalidate every session of the caller
#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "All sessions invalidated", body = MessageResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.0.user_id().map_err(AppError::Unauthenticated)?;
    let revoked = state.auth.logout_all(user_id).await?;

    let jar = clear_session_cookies(jar);
    Ok((
        StatusCode::OK,
        jar,
        Json(MessageResponse::new(format!(
            "Invalidated {} session(s)",
            revoked
        ))),
    ))
}

fn resolve_refresh_token(body_token: Option<String>, jar: &CookieJar) -> Result<String, AppError> {
    body_token
        .filter(|t| !t.is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .ok_or(AppError::InvalidRefresh)
}
