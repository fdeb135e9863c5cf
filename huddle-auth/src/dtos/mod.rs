pub mod auth;
pub mod keys;
pub mod membership;
pub mod mfa;

use serde::Serialize;
use utoipa::ToSchema;

/// Wire shape of a failed request (documented for OpenAPI; the actual body
/// is rendered by `huddle_core::error::AppError`).
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub ok: bool,
    #[schema(example = "INVALID_LOGIN")]
    pub error: String,
    pub message: Option<String>,
}

/// Generic `{ ok, message }` acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }
}
