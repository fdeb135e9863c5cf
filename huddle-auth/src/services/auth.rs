//! Password and session lifecycle.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use huddle_core::error::AppError;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dtos::auth::{LoginRequest, RegisterRequest};
use crate::models::{LoginMfaChallenge, Membership, Organization, RefreshSession, Role, User};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

use super::{AuditAction, AuditLogger, Database, JwtService};

/// Token pair issued after successful authentication.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionTokens {
    pub ok: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    /// Double-submit token for the cookie-based flow.
    pub csrf_token: String,
}

/// What a login produced: a session, or a pending MFA challenge.
pub enum LoginOutcome {
    Session(Box<SessionTokens>),
    MfaRequired { challenge_id: Uuid, expires_in: i64 },
}

/// Password & session manager.
#[derive(Clone)]
pub struct AuthService {
    db: Database,
    jwt: JwtService,
    audit: AuditLogger,
    mfa_challenge_ttl_minutes: i64,
    /// Verified against for unknown emails so the failure path costs the
    /// same as a real mismatch.
    dummy_hash: PasswordHashString,
}

impl AuthService {
    pub fn new(
        db: Database,
        jwt: JwtService,
        audit: AuditLogger,
        mfa_challenge_ttl_minutes: i64,
    ) -> Result<Self, AppError> {
        let dummy_hash = hash_password(&Password::new(
            "placeholder-password-for-timing".to_string(),
        ))
        .map_err(AppError::InternalError)?;

        Ok(Self {
            db,
            jwt,
            audit,
            mfa_challenge_ttl_minutes,
            dummy_hash,
        })
    }

    /// Register a new user together with their organization.
    ///
    /// User, organization, and the owner membership land in one transaction;
    /// a duplicate email is a `CONFLICT`.
    pub async fn register(&self, req: RegisterRequest) -> Result<(User, Organization, SessionTokens), AppError> {
        if self.db.find_user_by_email(&req.email).await?.is_some() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Email already registered"
            )));
        }

        let password_hash =
            hash_password(&Password::new(req.password)).map_err(AppError::InternalError)?;

        let user = User::new(req.email, password_hash.into_string(), req.name);
        let org = Organization::new(req.org_name);
        let membership = Membership::new(org.org_id, user.user_id, Role::Owner);

        self.db.create_user_with_org(&user, &org, &membership).await?;

        self.audit.record(
            AuditAction::Register,
            Some(user.user_id),
            Some(org.org_id),
            None,
        );

        let tokens = self.issue_session(&user).await?;
        Ok((user, org, tokens))
    }

    /// Login with email and password.
    ///
    /// Unknown email and wrong password are indistinguishable: both burn a
    /// full hash verification and both return `INVALID_LOGIN`. An
    /// MFA-enabled user gets a pending challenge instead of tokens.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginOutcome, AppError> {
        let user = self.db.find_user_by_email(&req.email).await?;

        let Some(user) = user else {
            let _ = verify_password(&Password::new(req.password), &self.dummy_hash);
            self.audit.record(AuditAction::LoginFailed, None, None, None);
            return Err(AppError::InvalidLogin);
        };

        let stored = PasswordHashString::new(user.password_hash.clone());
        if verify_password(&Password::new(req.password), &stored).is_err() {
            self.audit
                .record(AuditAction::LoginFailed, Some(user.user_id), None, None);
            return Err(AppError::InvalidLogin);
        }

        if user.mfa_enabled {
            let challenge =
                LoginMfaChallenge::new(user.user_id, self.mfa_challenge_ttl_minutes);
            self.db.insert_mfa_challenge(&challenge).await?;

            self.audit.record(
                AuditAction::MfaChallengeIssued,
                Some(user.user_id),
                None,
                None,
            );

            return Ok(LoginOutcome::MfaRequired {
                challenge_id: challenge.challenge_id,
                expires_in: self.mfa_challenge_ttl_minutes * 60,
            });
        }

        let tokens = self.issue_session(&user).await?;
        self.audit
            .record(AuditAction::Login, Some(user.user_id), None, None);
        Ok(LoginOutcome::Session(Box::new(tokens)))
    }

    /// Issue a fresh access/refresh pair for an authenticated user.
    pub async fn issue_session(&self, user: &User) -> Result<SessionTokens, AppError> {
        let access_token = self
            .jwt
            .generate_access_token(user.user_id, &user.email, &user.display_name)
            .map_err(AppError::InternalError)?;

        let refresh_token = generate_opaque_token();
        let session = RefreshSession::new(
            user.user_id,
            hash_refresh_token(&refresh_token),
            self.jwt.refresh_token_expiry_days(),
        );
        self.db.insert_refresh_session(&session).await?;

        Ok(SessionTokens {
            ok: true,
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
            csrf_token: generate_opaque_token(),
        })
    }

    /// Issue a session for a user id (MFA verification resuming a login).
    pub async fn issue_session_for(&self, user_id: Uuid) -> Result<SessionTokens, AppError> {
        let user = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        let tokens = self.issue_session(&user).await?;
        self.audit
            .record(AuditAction::Login, Some(user.user_id), None, None);
        Ok(tokens)
    }

    /// Rotate a refresh token: single use, a new pair on every call.
    ///
    /// The row is taken atomically; a concurrent refresh on the same token
    /// finds it gone and gets `INVALID_REFRESH`. An expired row is deleted
    /// by the same take and reported as `EXPIRED_REFRESH`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AppError> {
        let token_hash = hash_refresh_token(refresh_token);

        let session = self
            .db
            .take_refresh_session(&token_hash)
            .await?
            .ok_or(AppError::InvalidRefresh)?;

        if session.is_expired() {
            // Row already deleted by the take; nothing to sweep.
            return Err(AppError::ExpiredRefresh);
        }

        let user = self
            .db
            .find_user_by_id(session.user_id)
            .await?
            .ok_or(AppError::InvalidRefresh)?;

        let tokens = self.issue_session(&user).await?;
        self.audit
            .record(AuditAction::RefreshRotated, Some(user.user_id), None, None);
        Ok(tokens)
    }

    /// Delete the session behind a refresh token. Idempotent.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        let token_hash = hash_refresh_token(refresh_token);
        self.db.delete_refresh_session(&token_hash).await?;
        self.audit.record(AuditAction::Logout, None, None, None);
        Ok(())
    }

    /// Invalidate every session of a user.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let revoked = self.db.delete_all_refresh_sessions(user_id).await?;
        self.audit
            .record(AuditAction::LogoutAll, Some(user_id), None, None);
        Ok(revoked)
    }

    /// Change password after verifying the current one, then revoke every
    /// open session.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: String,
        new_password: String,
    ) -> Result<(), AppError> {
        let user = self
            .db
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

        let stored = PasswordHashString::new(user.password_hash.clone());
        if verify_password(&Password::new(current_password), &stored).is_err() {
            return Err(AppError::InvalidLogin);
        }

        let new_hash =
            hash_password(&Password::new(new_password)).map_err(AppError::InternalError)?;
        self.db
            .update_password_hash(user_id, new_hash.as_str())
            .await?;
        self.db.delete_all_refresh_sessions(user_id).await?;

        self.audit
            .record(AuditAction::PasswordChanged, Some(user_id), None, None);
        Ok(())
    }
}

/// High-entropy opaque token value: 32 random bytes, URL-safe base64.
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest stored in place of the raw refresh token, so a dumped
/// table yields nothing usable.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_tokens_are_unique_and_high_entropy() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_ne!(a, b);
        // 32 bytes -> 43 chars of unpadded base64
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn token_hash_is_stable_and_not_the_token() {
        let token = generate_opaque_token();
        let h1 = hash_refresh_token(&token);
        let h2 = hash_refresh_token(&token);
        assert_eq!(h1, h2);
        assert_ne!(h1, token);
        assert_eq!(h1.len(), 64); // sha256 hex
    }

    #[test]
    fn different_tokens_hash_differently() {
        assert_ne!(
            hash_refresh_token("token-a"),
            hash_refresh_token("token-b")
        );
    }
}
