//! User model - account credentials and MFA material.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// User entity.
///
/// `totp_secret_enc` is ciphertext (authenticated encryption under the
/// server key); `device_public_key` is the base64 X25519 public half the
/// user registered for org-key wrapping. Neither field ever leaves the
/// service unsanitized.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub device_public_key: Option<String>,
    pub totp_secret_enc: Option<Vec<u8>>,
    pub mfa_enabled: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new user. Email is normalized to lowercase on the way in.
    pub fn new(email: String, password_hash: String, display_name: String) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password_hash,
            display_name,
            device_public_key: None,
            totp_secret_enc: None,
            mfa_enabled: false,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Convert to a response shape with no credential material.
    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser {
            user_id: self.user_id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            mfa_enabled: self.mfa_enabled,
            has_device_key: self.device_public_key.is_some(),
            created_utc: self.created_utc,
        }
    }
}

/// User shape safe for API responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SanitizedUser {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub mfa_enabled: bool,
    pub has_device_key: bool,
    pub created_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_normalizes_email() {
        let user = User::new(
            "  Casey@Example.COM ".to_string(),
            "hash".to_string(),
            "Casey".to_string(),
        );
        assert_eq!(user.email, "casey@example.com");
        assert!(!user.mfa_enabled);
        assert!(user.totp_secret_enc.is_none());
    }

    #[test]
    fn sanitized_user_carries_no_credentials() {
        let mut user = User::new(
            "casey@example.com".to_string(),
            "hash".to_string(),
            "Casey".to_string(),
        );
        user.totp_secret_enc = Some(vec![1, 2, 3]);
        user.device_public_key = Some("AAAA".to_string());

        let sanitized = user.sanitized();
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("hash"));
        assert!(!json.contains("AAAA"));
        assert!(sanitized.has_device_key);
    }
}
