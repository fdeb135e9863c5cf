//! Membership handlers: listing, role changes, removal.

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
        membership::{MembersResponse, UpdateMemberRoleRequest},
        MessageResponse,
    },
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// List an organization's members
#[utoipa::path(
    get,
    path = "/orgs/{org_id}/members",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Member list", body = MembersResponse),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    tag = "Membership",
    security(("bearer_auth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(org_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let caller = user.0.user_id().map_err(AppError::Unauthenticated)?;
    let members = state.authz.list_members(org_id, caller).await?;

    Ok((StatusCode::OK, Json(MembersResponse { ok: true, members })))
}

/// Change a member's role
#[utoipa::path(
    patch,
    path = "/orgs/{org_id}/members/{user_id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("user_id" = Uuid, Path, description = "Target member")
    ),
    request_body = UpdateMemberRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = MessageResponse),
        (status = 403, description = "Insufficient role", body = ErrorResponse),
        (status = 409, description = "Would leave the org without an owner", body = ErrorResponse)
    ),
    tag = "Membership",
    security(("bearer_auth" = []))
)]
pub async fn update_member_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, target)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<UpdateMemberRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = user.0.user_id().map_err(AppError::Unauthenticated)?;
    state
        .authz
        .update_member_role(org_id, actor, target, req.role)
        .await?;

    Ok((StatusCode::OK, Json(MessageResponse::new("Role updated"))))
}

/// Remove a member from an organization
#[utoipa::path(
    delete,
    path = "/orgs/{org_id}/members/{user_id}",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("user_id" = Uuid, Path, description = "Target member")
    ),
    responses(
        (status = 200, description = "Member removed", body = MessageResponse),
        (status = 403, description = "Insufficient role", body = ErrorResponse),
        (status = 409, description = "Would leave the org without an owner", body = ErrorResponse)
    ),
    tag = "Membership",
    security(("bearer_auth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((org_id, target)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let actor = user.0.user_id().map_err(AppError::Unauthenticated)?;
    state.authz.remove_member(org_id, actor, target).await?;

    Ok((StatusCode::OK, Json(MessageResponse::new("Member removed"))))
}
