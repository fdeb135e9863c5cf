//! MFA subsystem: TOTP lifecycle, recovery codes, and the login-challenge
//! state machine.

use huddle_core::error::AppError;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::crypto::{
    normalize_recovery_code, open_totp_secret, seal_totp_secret, verify_recovery_code,
    RecoveryCodeBatch,
};
use crate::models::{RecoveryCode, User};

use super::{AuditAction, AuditLogger, Database};

/// TOTP and recovery-code manager.
///
/// Secrets never exist in the store unencrypted, and a code verification
/// failure is reported the same way regardless of which step failed.
#[derive(Clone)]
pub struct MfaService {
    db: Database,
    audit: AuditLogger,
    enc_key: [u8; 32],
    pepper: Vec<u8>,
    issuer: String,
    challenge_max_attempts: i32,
}

impl MfaService {
    pub fn new(
        db: Database,
        audit: AuditLogger,
        enc_key: [u8; 32],
        pepper: Vec<u8>,
        issuer: String,
        challenge_max_attempts: i32,
    ) -> Self {
        Self {
            db,
            audit,
            enc_key,
            pepper,
            issuer,
            challenge_max_attempts,
        }
    }

    /// Begin TOTP setup: generate a secret, seal it, store it disabled.
    ///
    /// Returns the base32 secret and a provisioning URI for the user's
    /// authenticator app. MFA does not gate login until the first code is
    /// confirmed.
    pub async fn setup_totp(&self, user_id: Uuid) -> Result<(String, String), AppError> {
        let user = self.require_user(user_id).await?;

        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Secret gen error: {e}")))?;

        let sealed = seal_totp_secret(&self.enc_key, &secret_bytes, user_id)
            .map_err(AppError::InternalError)?;
        self.db.set_totp_secret(user_id, &sealed).await?;

        let totp = self.build_totp(secret_bytes, &user.email)?;
        Ok((totp.get_secret_base32(), totp.get_url()))
    }

    /// Confirm setup with the first code; enables MFA and issues a fresh
    /// recovery-code batch, returned in plaintext exactly once.
    pub async fn confirm_totp(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Vec<String>, AppError> {
        let user = self.require_user(user_id).await?;

        let secret_enc = user.totp_secret_enc.as_deref().ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("No TOTP setup in progress"))
        })?;

        if !self.check_code(secret_enc, user_id, &user.email, code)? {
            return Err(AppError::InvalidMfa);
        }

        let batch =
            RecoveryCodeBatch::generate(&self.pepper).map_err(AppError::InternalError)?;
        let rows: Vec<RecoveryCode> = batch
            .code_hashes
            .iter()
            .map(|hash| RecoveryCode::new(user_id, hash.clone()))
            .collect();

        // Replacing the batch invalidates every prior code for the user.
        self.db.replace_recovery_codes(user_id, &rows).await?;
        self.db.enable_mfa(user_id).await?;

        self.audit
            .record(AuditAction::MfaEnabled, Some(user_id), None, None);
        Ok(batch.codes)
    }

    /// Verify a pending login challenge with a TOTP code or a recovery code.
    ///
    /// Returns the user id on success so the session layer can resume the
    /// login. Missing, expired, spent, and attempt-exhausted challenges all
    /// surface as the same `INVALID_MFA`.
    pub async fn verify_during_login(
        &self,
        challenge_id: Uuid,
        code: Option<&str>,
        recovery_code: Option<&str>,
    ) -> Result<Uuid, AppError> {
        let challenge = self
            .db
            .find_mfa_challenge(challenge_id)
            .await?
            .ok_or(AppError::InvalidMfa)?;

        if challenge.verified {
            return Err(AppError::InvalidMfa);
        }
        if challenge.is_expired() {
            let _ = self.db.delete_mfa_challenge(challenge_id).await;
            return Err(AppError::InvalidMfa);
        }
        if challenge.attempt_count >= self.challenge_max_attempts {
            return Err(AppError::InvalidMfa);
        }

        let user = self.require_user(challenge.user_id).await?;

        let verified = if let Some(recovery) = recovery_code {
            self.consume_recovery(&user, recovery).await?
        } else if let Some(code) = code {
            let secret_enc = user
                .totp_secret_enc
                .as_deref()
                .ok_or(AppError::InvalidMfa)?;
            self.check_code(secret_enc, user.user_id, &user.email, code)?
        } else {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Either code or recovery_code is required"
            )));
        };

        if !verified {
            self.db
                .increment_mfa_challenge_attempts(challenge_id)
                .await?;
            return Err(AppError::InvalidMfa);
        }

        // Consume-once: a concurrent verification of the same challenge
        // loses this update and fails.
        if !self.db.consume_mfa_challenge(challenge_id).await? {
            return Err(AppError::InvalidMfa);
        }

        self.audit
            .record(AuditAction::MfaVerified, Some(user.user_id), None, None);
        Ok(user.user_id)
    }

    /// Disable MFA. Requires a valid current TOTP code; clears the secret
    /// and every recovery code.
    pub async fn disable(&self, user_id: Uuid, code: &str) -> Result<(), AppError> {
        let user = self.require_user(user_id).await?;

        if !user.mfa_enabled {
            return Err(AppError::BadRequest(anyhow::anyhow!("MFA is not enabled")));
        }

        let secret_enc = user
            .totp_secret_enc
            .as_deref()
            .ok_or(AppError::InvalidMfa)?;
        if !self.check_code(secret_enc, user_id, &user.email, code)? {
            return Err(AppError::InvalidMfa);
        }

        self.db.disable_mfa(user_id).await?;
        self.audit
            .record(AuditAction::MfaDisabled, Some(user_id), None, None);
        Ok(())
    }

    /// Try a recovery code against the user's unused batch; marks the match
    /// used. The test-and-set is atomic per code, so a concurrent reuse of
    /// the same code loses.
    async fn consume_recovery(&self, user: &User, input: &str) -> Result<bool, AppError> {
        // Malformed input is just a failed verification, not a distinct error.
        if normalize_recovery_code(input).is_err() {
            return Ok(false);
        }

        let codes = self.db.list_unused_recovery_codes(user.user_id).await?;
        for row in codes {
            let matches = verify_recovery_code(input, &row.code_hash, &self.pepper)
                .map_err(AppError::InternalError)?;
            if matches {
                return self.db.consume_recovery_code(row.code_id).await;
            }
        }
        Ok(false)
    }

    /// Decrypt the stored secret and verify a code against the ±1-step
    /// window. Decryption failure means secret corruption, not a bad code.
    fn check_code(
        &self,
        secret_enc: &[u8],
        user_id: Uuid,
        email: &str,
        code: &str,
    ) -> Result<bool, AppError> {
        let secret_bytes = open_totp_secret(&self.enc_key, secret_enc, user_id).map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "TOTP secret unreadable");
            AppError::CryptoFailure
        })?;

        let totp = self.build_totp(secret_bytes, email)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    fn build_totp(&self, secret_bytes: Vec<u8>, account: &str) -> Result<TOTP, AppError> {
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("TOTP init error: {e}")))
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.db
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_totp(secret: Vec<u8>) -> TOTP {
        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some("Huddle".to_string()),
            "user@example.com".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn window_accepts_one_step_of_skew_and_no_more() {
        let secret = Secret::generate_secret().to_bytes().unwrap();
        let totp = test_totp(secret);

        // Mid-window reference time, away from a step boundary.
        let t: u64 = 1_700_000_015;

        for dt in [-30i64, 0, 30] {
            let code = totp.generate((t as i64 + dt) as u64);
            assert!(
                totp.check(&code, t),
                "code at offset {}s must be accepted",
                dt
            );
        }

        for dt in [-60i64, 60] {
            let code = totp.generate((t as i64 + dt) as u64);
            // A code two steps out may coincide by chance only; the
            // generator makes that astronomically unlikely.
            assert!(
                !totp.check(&code, t),
                "code at offset {}s must be rejected",
                dt
            );
        }
    }

    #[test]
    fn wrong_code_is_rejected() {
        let secret = Secret::generate_secret().to_bytes().unwrap();
        let totp = test_totp(secret);
        assert!(!totp.check("000000", 1_700_000_015));
    }

    #[test]
    fn provisioning_url_names_issuer_and_account() {
        let secret = Secret::generate_secret().to_bytes().unwrap();
        let totp = test_totp(secret);
        let url = totp.get_url();
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("Huddle"));
        assert!(url.contains("user%40example.com") || url.contains("user@example.com"));
    }
}
