//! Request/response DTOs for registration and session endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Organization, SanitizedUser};
use crate::services::SessionTokens;

/// Request to register a new user and their organization.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub org_name: String,
}

/// Response after successful registration.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub ok: bool,
    pub user: SanitizedUser,
    pub org: Organization,
    pub tokens: SessionTokens,
}

/// Request to login with email and password.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Login outcome: either a full session, or a pending MFA challenge.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum LoginResponse {
    MfaPending {
        ok: bool,
        mfa_pending: bool,
        challenge_id: Uuid,
        expires_in: i64,
    },
    Session(SessionTokens),
}

/// Request carrying a refresh token. Optional in the body because the
/// cookie flow sends it as an http-only cookie instead.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Request to logout (same token resolution as refresh).
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// Request to change the caller's password.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

/// Current-user response.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub ok: bool,
    pub user: SanitizedUser,
}
