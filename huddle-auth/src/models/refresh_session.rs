//! Refresh session model - opaque rotating refresh tokens.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh session entity.
///
/// Only the SHA-256 hash of the opaque token value is stored; the raw value
/// exists solely in the response that issued it.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl RefreshSession {
    pub fn new(user_id: Uuid, token_hash: String, expiry_days: i64) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            token_hash,
            expiry_utc: now + Duration::days(expiry_days),
            created_utc: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expiry_utc <= Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_not_expired() {
        let s = RefreshSession::new(Uuid::new_v4(), "hash".to_string(), 7);
        assert!(!s.is_expired());
    }

    #[test]
    fn expiry_is_checked_at_read_time() {
        let mut s = RefreshSession::new(Uuid::new_v4(), "hash".to_string(), 7);
        s.expiry_utc = Utc::now() - Duration::seconds(1);
        assert!(s.is_expired());
    }
}
