//! MFA models - login challenges and recovery codes.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Pending MFA challenge created when a password check succeeds for an
/// MFA-enabled user. Consumed exactly once; expiry is checked at read time.
#[derive(Debug, Clone, FromRow)]
pub struct LoginMfaChallenge {
    pub challenge_id: Uuid,
    pub user_id: Uuid,
    pub expiry_utc: DateTime<Utc>,
    pub verified: bool,
    pub attempt_count: i32,
    pub created_utc: DateTime<Utc>,
}

impl LoginMfaChallenge {
    pub fn new(user_id: Uuid, ttl_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            challenge_id: Uuid::new_v4(),
            user_id,
            expiry_utc: now + Duration::minutes(ttl_minutes),
            verified: false,
            attempt_count: 0,
            created_utc: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }
}

/// Single-use recovery code. Only the peppered Argon2id hash is stored.
#[derive(Debug, Clone, FromRow)]
pub struct RecoveryCode {
    pub code_id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub used_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl RecoveryCode {
    pub fn new(user_id: Uuid, code_hash: String) -> Self {
        Self {
            code_id: Uuid::new_v4(),
            user_id,
            code_hash,
            used_utc: None,
            created_utc: Utc::now(),
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_utc.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_challenge_is_unverified_and_unexpired() {
        let c = LoginMfaChallenge::new(Uuid::new_v4(), 5);
        assert!(!c.verified);
        assert!(!c.is_expired());
        assert_eq!(c.attempt_count, 0);
    }

    #[test]
    fn challenge_expires_after_ttl() {
        let mut c = LoginMfaChallenge::new(Uuid::new_v4(), 5);
        c.expiry_utc = Utc::now() - Duration::seconds(1);
        assert!(c.is_expired());
    }
}
