//! Key-distribution handlers.
//!
//! The server brokers ciphertext only: wraps are produced and opened on
//! client devices.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use huddle_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        keys::{
            FetchWrappedKeyResponse, PublishWrappedKeysRequest, PublishWrappedKeysResponse,
            RegisterDeviceKeyRequest, RotateKeyVersionResponse,
        },
        MessageResponse,
    },
    middleware::AuthUser,
    services::WrapSubmission,
    utils::ValidatedJson,
    AppState,
};

/// Register the caller's device public key
#[utoipa::path(
    post,
    path = "/keys/device",
    request_body = RegisterDeviceKeyRequest,
    responses(
        (status = 200, description = "Device key registered", body = MessageResponse),
        (status = 400, description = "Malformed key", body = ErrorResponse),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    ),
    tag = "Keys",
    security(("bearer_auth" = []))
)]
pub async fn register_device_key(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<RegisterDeviceKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.0.user_id().map_err(AppError::Unauthenticated)?;
    state
        .keys
        .register_device_public_key(user_id, &req.public_key)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Device key registered")),
    ))
}

/// Publish wrapped org keys for members (admin/owner)
#[utoipa::path(
    post,
    path = "/orgs/{org_id}/keys/wraps",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = PublishWrappedKeysRequest,
    responses(
        (status = 200, description = "Wraps stored", body = PublishWrappedKeysResponse),
        (status = 403, description = "Insufficient role", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Keys",
    security(("bearer_auth" = []))
)]
pub async fn publish_wrapped_keys(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<PublishWrappedKeysRequest>,
) -> Result<impl IntoResponse, AppError> {
    let caller = user.0.user_id().map_err(AppError::Unauthenticated)?;

    let wraps = req
        .wraps
        .into_iter()
        .map(|w| WrapSubmission {
            user_id: w.user_id,
            blob: w.blob,
            key_id: w.key_id,
        })
        .collect();

    let key_version = state
        .keys
        .publish_wrapped_keys(org_id, caller, wraps, req.key_version)
        .await?;

    Ok((
        StatusCode::OK,
        Json(PublishWrappedKeysResponse {
            ok: true,
            key_version,
        }),
    ))
}

/// Fetch the caller's own wrapped org key
#[utoipa::path(
    get,
    path = "/orgs/{org_id}/keys/wrap",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Wrap, or null when none distributed yet", body = FetchWrappedKeyResponse),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    tag = "Keys",
    security(("bearer_auth" = []))
)]
pub async fn fetch_wrapped_key(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let caller = user.0.user_id().map_err(AppError::Unauthenticated)?;
    let (wrap, current_key_version) = state.keys.fetch_wrapped_key(org_id, caller).await?;

    Ok((
        StatusCode::OK,
        Json(FetchWrappedKeyResponse {
            ok: true,
            wrap,
            current_key_version,
        }),
    ))
}

/// Rotate the org key version (admin/owner)
#[utoipa::path(
    post,
    path = "/orgs/{org_id}/keys/rotate",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Version incremented", body = RotateKeyVersionResponse),
        (status = 403, description = "Insufficient role", body = ErrorResponse)
    ),
    tag = "Keys",
    security(("bearer_auth" = []))
)]
pub async fn rotate_key_version(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let caller = user.0.user_id().map_err(AppError::Unauthenticated)?;
    let key_version = state.keys.rotate_key_version(org_id, caller).await?;

    Ok((
        StatusCode::OK,
        Json(RotateKeyVersionResponse {
            ok: true,
            key_version,
        }),
    ))
}
