//! Server side of org-key distribution.
//!
//! Stores per-member ciphertext wraps and the monotonic key-version counter.
//! The org key itself never appears here in any server-decryptable form;
//! everything cryptographic happens in [`crate::keywrap`] on clients.

use chrono::Utc;
use huddle_core::error::AppError;
use uuid::Uuid;

use crate::keywrap::{decode_public_key, KeyWrapEnvelope};
use crate::models::{Role, WrappedOrgKey};

use super::{AuditAction, AuditLogger, AuthzService, Database};

/// One member's wrap as submitted by a publishing client.
#[derive(Debug)]
pub struct WrapSubmission {
    pub user_id: Uuid,
    pub blob: String,
    pub key_id: String,
}

/// Key distribution broker.
#[derive(Clone)]
pub struct KeyDistService {
    db: Database,
    authz: AuthzService,
    audit: AuditLogger,
}

impl KeyDistService {
    pub fn new(db: Database, authz: AuthzService, audit: AuditLogger) -> Self {
        Self { db, authz, audit }
    }

    /// Register the public half of a device keypair for the caller.
    pub async fn register_device_public_key(
        &self,
        user_id: Uuid,
        public_key_b64: &str,
    ) -> Result<(), AppError> {
        // Syntactic check only; the key never gets used server-side.
        decode_public_key(public_key_b64)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid device key: {e}")))?;

        self.db
            .set_device_public_key(user_id, public_key_b64)
            .await?;
        self.audit.record(
            AuditAction::DeviceKeyRegistered,
            Some(user_id),
            None,
            None,
        );
        Ok(())
    }

    /// Store wraps published by an admin/owner for org members.
    ///
    /// Blobs are validated as parseable envelopes and stored verbatim. When
    /// a `key_version` accompanies the publish, the org's version counter is
    /// advanced to at least that value; it never regresses.
    pub async fn publish_wrapped_keys(
        &self,
        org_id: Uuid,
        caller: Uuid,
        wraps: Vec<WrapSubmission>,
        key_version: Option<i64>,
    ) -> Result<i64, AppError> {
        self.authz.require_role(org_id, caller, Role::Admin).await?;

        if wraps.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "At least one wrap is required"
            )));
        }

        // The org's counter only ever moves forward; the wraps themselves
        // record the version the client actually wrapped under.
        let org_version = match key_version {
            Some(v) if v > 0 => self.db.advance_key_version(org_id, v).await?,
            Some(v) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "key_version must be positive, got {v}"
                )))
            }
            None => self.db.current_key_version(org_id).await?.max(1),
        };
        let wrap_version = key_version.unwrap_or(org_version);

        for wrap in &wraps {
            KeyWrapEnvelope::decode(&wrap.blob).map_err(|e| {
                AppError::BadRequest(anyhow::anyhow!(
                    "Invalid wrap for member {}: {e}",
                    wrap.user_id
                ))
            })?;

            if self.db.find_membership(org_id, wrap.user_id).await?.is_none() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "User {} is not a member of this organization",
                    wrap.user_id
                )));
            }
        }

        for wrap in wraps {
            let row = WrappedOrgKey {
                org_id,
                user_id: wrap.user_id,
                blob: wrap.blob,
                key_version: wrap_version,
                key_id: wrap.key_id,
                updated_utc: Utc::now(),
            };
            self.db.upsert_wrapped_key(&row).await?;
        }

        self.audit.record(
            AuditAction::WrapsPublished,
            Some(caller),
            Some(org_id),
            Some(format!("version {org_version}")),
        );
        Ok(org_version)
    }

    /// Fetch the caller's own wrap.
    ///
    /// Returns `None` when the org has not distributed a key to this member
    /// yet, so an org without end-to-end encryption degrades gracefully
    /// instead of erroring.
    pub async fn fetch_wrapped_key(
        &self,
        org_id: Uuid,
        caller: Uuid,
    ) -> Result<(Option<WrappedOrgKey>, i64), AppError> {
        self.authz.require_role(org_id, caller, Role::Viewer).await?;

        let wrap = self.db.find_wrapped_key(org_id, caller).await?;
        let current_version = self.db.current_key_version(org_id).await?;
        Ok((wrap, current_version))
    }

    /// Strictly increment the org's key version.
    ///
    /// Existing wraps are left in place: stale wraps stay valid for old
    /// data until every member is re-wrapped under the new version, so a
    /// failed re-wrap never bricks access mid-rotation. Callers are
    /// expected to immediately re-publish wraps for all members.
    pub async fn rotate_key_version(&self, org_id: Uuid, caller: Uuid) -> Result<i64, AppError> {
        self.authz.require_role(org_id, caller, Role::Admin).await?;

        let version = self.db.rotate_key_version(org_id).await?;
        self.audit.record(
            AuditAction::KeyRotated,
            Some(caller),
            Some(org_id),
            Some(format!("version {version}")),
        );
        Ok(version)
    }
}
