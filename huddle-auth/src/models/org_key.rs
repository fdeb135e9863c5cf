//! Org-key models - version counter and per-member wraps.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Source of truth for which key generation an organization is on.
/// The version only ever moves forward.
#[derive(Debug, Clone, FromRow)]
pub struct OrgKeyVersion {
    pub org_id: Uuid,
    pub key_version: i64,
    pub updated_utc: DateTime<Utc>,
}

/// One member's wrapped copy of the org key.
///
/// `blob` is opaque ciphertext produced client-side; the server can parse
/// its envelope but can never unwrap it. A wrap with `key_version` below the
/// organization's current version is stale but still served, so members can
/// keep decrypting old data until they are re-wrapped.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct WrappedOrgKey {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub blob: String,
    pub key_version: i64,
    pub key_id: String,
    pub updated_utc: DateTime<Utc>,
}

impl WrappedOrgKey {
    pub fn is_current(&self, org_version: i64) -> bool {
        self.key_version >= org_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_staleness_is_relative_to_org_version() {
        let wrap = WrappedOrgKey {
            org_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            blob: "{}".to_string(),
            key_version: 2,
            key_id: "k1".to_string(),
            updated_utc: Utc::now(),
        };
        assert!(wrap.is_current(2));
        assert!(wrap.is_current(1));
        assert!(!wrap.is_current(3));
    }
}
