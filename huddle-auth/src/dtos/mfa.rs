//! Request/response DTOs for the MFA endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Response after beginning TOTP setup. The secret is shown once, for
/// manual entry; the URI feeds an authenticator app.
#[derive(Debug, Serialize, ToSchema)]
pub struct SetupTotpResponse {
    pub ok: bool,
    pub secret_base32: String,
    pub otpauth_uri: String,
}

/// Request to confirm TOTP setup with the first generated code.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmTotpRequest {
    #[validate(length(min = 6, max = 8))]
    pub code: String,
}

/// Response after confirming setup: the recovery codes, in plaintext, for
/// the only time ever.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmTotpResponse {
    pub ok: bool,
    pub recovery_codes: Vec<String>,
}

/// Request to verify a pending login challenge.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MfaVerifyRequest {
    pub challenge_id: Uuid,
    #[validate(length(min = 6, max = 8))]
    pub code: Option<String>,
    #[validate(length(min = 12, max = 16))]
    pub recovery_code: Option<String>,
}

/// Request to disable MFA, authorized by a current TOTP code.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DisableTotpRequest {
    #[validate(length(min = 6, max = 8))]
    pub code: String,
}
