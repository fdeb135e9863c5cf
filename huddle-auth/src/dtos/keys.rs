//! Request/response DTOs for key-distribution endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::WrappedOrgKey;

/// Request to register the caller's device public key (base64 X25519).
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterDeviceKeyRequest {
    #[validate(length(min = 40, max = 60))]
    pub public_key: String,
}

/// One member's wrap inside a publish request.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct WrapEntry {
    pub user_id: Uuid,
    /// Opaque versioned envelope produced client-side.
    pub blob: String,
    /// Client-chosen identifier of the org-key generation.
    pub key_id: String,
}

/// Request to publish wraps for org members.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PublishWrappedKeysRequest {
    #[validate(length(min = 1))]
    pub wraps: Vec<WrapEntry>,
    pub key_version: Option<i64>,
}

/// Response after publishing: the org's (possibly advanced) key version.
#[derive(Debug, Serialize, ToSchema)]
pub struct PublishWrappedKeysResponse {
    pub ok: bool,
    pub key_version: i64,
}

/// Response to a wrap fetch. `wrap` is null when no key has been
/// distributed to this member yet.
#[derive(Debug, Serialize, ToSchema)]
pub struct FetchWrappedKeyResponse {
    pub ok: bool,
    pub wrap: Option<WrappedOrgKey>,
    pub current_key_version: i64,
}

/// Response after a rotation.
#[derive(Debug, Serialize, ToSchema)]
pub struct RotateKeyVersionResponse {
    pub ok: bool,
    pub key_version: i64,
}
