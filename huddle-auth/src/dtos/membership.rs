//! Request/response DTOs for membership endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::Role;
use crate::services::MemberInfo;

/// Request to change a member's role.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateMemberRoleRequest {
    pub role: Role,
}

/// Organization member listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct MembersResponse {
    pub ok: bool,
    pub members: Vec<MemberInfo>,
}
