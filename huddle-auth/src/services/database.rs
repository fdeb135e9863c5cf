//! PostgreSQL store adapter.
//!
//! The only component that touches SQL. Every other service holds ids and
//! goes through here; writes that must be atomic (registration, token
//! rotation, code consumption, version bumps) are single statements or
//! single transactions, never sequential independent writes.

use chrono::Utc;
use huddle_core::error::AppError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    LoginMfaChallenge, Membership, OrgKeyVersion, Organization, RecoveryCode, RefreshSession,
    Role, User, WrappedOrgKey,
};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
        })?;
        Ok(())
    }

    // ==================== User Operations ====================

    /// Find user by ID.
    pub async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    /// Find user by email (case-insensitive).
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    /// Create user + organization + owner membership as one transaction.
    /// Partial creation is never observable.
    pub async fn create_user_with_org(
        &self,
        user: &User,
        org: &Organization,
        membership: &Membership,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password_hash, display_name, mfa_enabled, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.mfa_enabled)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            // Unique index on LOWER(email): a racing registration surfaces
            // here, not in the pre-check.
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!(e)),
        })?;

        sqlx::query("INSERT INTO organizations (org_id, org_name, created_utc) VALUES ($1, $2, $3)")
            .bind(org.org_id)
            .bind(&org.org_name)
            .bind(org.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query(
            "INSERT INTO memberships (org_id, user_id, role_code, created_utc) VALUES ($1, $2, $3, $4)",
        )
        .bind(membership.org_id)
        .bind(membership.user_id)
        .bind(&membership.role_code)
        .bind(membership.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit().await?;
        Ok(())
    }

    /// Update a user's password hash and touch updated_utc.
    pub async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_utc = $2 WHERE user_id = $3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Store a user's registered device public key (base64 X25519).
    pub async fn set_device_public_key(
        &self,
        user_id: Uuid,
        public_key_b64: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET device_public_key = $1, updated_utc = $2 WHERE user_id = $3")
            .bind(public_key_b64)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Store an encrypted TOTP secret without enabling MFA yet, so a
    /// half-finished setup never gates login.
    pub async fn set_totp_secret(
        &self,
        user_id: Uuid,
        secret_enc: &[u8],
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET totp_secret_enc = $1, mfa_enabled = FALSE, updated_utc = $2 WHERE user_id = $3",
        )
        .bind(secret_enc)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Flip MFA on for a user (after the first code verified).
    pub async fn enable_mfa(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET mfa_enabled = TRUE, updated_utc = $1 WHERE user_id = $2")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Clear the TOTP secret, disable MFA, and drop all recovery codes in
    /// one transaction.
    pub async fn disable_mfa(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE users SET totp_secret_enc = NULL, mfa_enabled = FALSE, updated_utc = $1 WHERE user_id = $2",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query("DELETE FROM recovery_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Membership Operations ====================

    /// Find a membership row.
    pub async fn find_membership(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, AppError> {
        sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE org_id = $1 AND user_id = $2",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    /// List all memberships of an organization.
    pub async fn list_memberships(&self, org_id: Uuid) -> Result<Vec<Membership>, AppError> {
        sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE org_id = $1 ORDER BY created_utc",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    /// Count owners of an organization.
    pub async fn count_owners(&self, org_id: Uuid) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM memberships WHERE org_id = $1 AND role_code = $2",
        )
        .bind(org_id)
        .bind(Role::Owner.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(count.0)
    }

    /// Change a member's role, guarded against demoting the last owner.
    ///
    /// The owner-count check runs inside the same transaction as the update,
    /// so two concurrent demotions cannot both slip past it.
    pub async fn update_membership_role_guarded(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        new_role: Role,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> = sqlx::query_as(
            "SELECT role_code FROM memberships WHERE org_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let Some((current_role,)) = current else {
            return Err(AppError::NotAMember);
        };

        if current_role == Role::Owner.as_str() && new_role != Role::Owner {
            let owners: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM memberships WHERE org_id = $1 AND role_code = $2",
            )
            .bind(org_id)
            .bind(Role::Owner.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

            if owners.0 <= 1 {
                return Err(AppError::LastOwner);
            }
        }

        sqlx::query("UPDATE memberships SET role_code = $1 WHERE org_id = $2 AND user_id = $3")
            .bind(new_role.as_str())
            .bind(org_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove a member, guarded against removing the last owner.
    pub async fn delete_membership_guarded(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> = sqlx::query_as(
            "SELECT role_code FROM memberships WHERE org_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let Some((current_role,)) = current else {
            return Err(AppError::NotAMember);
        };

        if current_role == Role::Owner.as_str() {
            let owners: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM memberships WHERE org_id = $1 AND role_code = $2",
            )
            .bind(org_id)
            .bind(Role::Owner.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

            if owners.0 <= 1 {
                return Err(AppError::LastOwner);
            }
        }

        sqlx::query("DELETE FROM memberships WHERE org_id = $1 AND user_id = $2")
            .bind(org_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Refresh Session Operations ====================

    /// Insert a refresh session row.
    pub async fn insert_refresh_session(&self, session: &RefreshSession) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_sessions (session_id, user_id, token_hash, expiry_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.session_id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expiry_utc)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Atomically take (delete and return) a refresh session by token hash.
    ///
    /// Of two concurrent rotations on the same token, exactly one gets the
    /// row; the other sees nothing and must fail the refresh.
    pub async fn take_refresh_session(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshSession>, AppError> {
        sqlx::query_as::<_, RefreshSession>(
            "DELETE FROM refresh_sessions WHERE token_hash = $1 RETURNING *",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    /// Delete a refresh session by token hash. Idempotent.
    pub async fn delete_refresh_session(&self, token_hash: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM refresh_sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Delete every refresh session for a user.
    pub async fn delete_all_refresh_sessions(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected())
    }

    // ==================== MFA Challenge Operations ====================

    /// Insert a login MFA challenge.
    pub async fn insert_mfa_challenge(
        &self,
        challenge: &LoginMfaChallenge,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO login_mfa_challenges (challenge_id, user_id, expiry_utc, verified, attempt_count, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(challenge.challenge_id)
        .bind(challenge.user_id)
        .bind(challenge.expiry_utc)
        .bind(challenge.verified)
        .bind(challenge.attempt_count)
        .bind(challenge.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Find a challenge by ID.
    pub async fn find_mfa_challenge(
        &self,
        challenge_id: Uuid,
    ) -> Result<Option<LoginMfaChallenge>, AppError> {
        sqlx::query_as::<_, LoginMfaChallenge>(
            "SELECT * FROM login_mfa_challenges WHERE challenge_id = $1",
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    /// Count a failed attempt against a challenge.
    pub async fn increment_mfa_challenge_attempts(
        &self,
        challenge_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE login_mfa_challenges SET attempt_count = attempt_count + 1 WHERE challenge_id = $1",
        )
        .bind(challenge_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Mark a challenge verified, but only if it is still consumable.
    /// Returns false when the challenge was already verified or expired,
    /// so concurrent verifications cannot both succeed.
    pub async fn consume_mfa_challenge(&self, challenge_id: Uuid) -> Result<bool, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE login_mfa_challenges
            SET verified = TRUE
            WHERE challenge_id = $1 AND verified = FALSE AND expiry_utc > $2
            RETURNING challenge_id
            "#,
        )
        .bind(challenge_id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.is_some())
    }

    /// Opportunistically drop a dead challenge row.
    pub async fn delete_mfa_challenge(&self, challenge_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM login_mfa_challenges WHERE challenge_id = $1")
            .bind(challenge_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    // ==================== Recovery Code Operations ====================

    /// Replace a user's recovery codes: all prior codes die with the batch.
    pub async fn replace_recovery_codes(
        &self,
        user_id: Uuid,
        codes: &[RecoveryCode],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recovery_codes WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        for code in codes {
            sqlx::query(
                r#"
                INSERT INTO recovery_codes (code_id, user_id, code_hash, used_utc, created_utc)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(code.code_id)
            .bind(code.user_id)
            .bind(&code.code_hash)
            .bind(code.used_utc)
            .bind(code.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// List unused recovery codes for a user.
    pub async fn list_unused_recovery_codes(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecoveryCode>, AppError> {
        sqlx::query_as::<_, RecoveryCode>(
            "SELECT * FROM recovery_codes WHERE user_id = $1 AND used_utc IS NULL",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    /// Mark one recovery code used. The test-and-set is a single conditional
    /// update, so the same code cannot be spent twice.
    pub async fn consume_recovery_code(&self, code_id: Uuid) -> Result<bool, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE recovery_codes
            SET used_utc = $1
            WHERE code_id = $2 AND used_utc IS NULL
            RETURNING code_id
            "#,
        )
        .bind(Utc::now())
        .bind(code_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.is_some())
    }

    // ==================== Org Key Operations ====================

    /// Current key version for an organization. Zero when never rotated.
    pub async fn current_key_version(&self, org_id: Uuid) -> Result<i64, AppError> {
        let row: Option<OrgKeyVersion> =
            sqlx::query_as("SELECT * FROM org_key_versions WHERE org_id = $1")
                .bind(org_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.map(|r| r.key_version).unwrap_or(0))
    }

    /// Advance the org's key version to at least `version`. Lower or equal
    /// values are ignored; the counter never regresses.
    pub async fn advance_key_version(&self, org_id: Uuid, version: i64) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO org_key_versions (org_id, key_version, updated_utc)
            VALUES ($1, $2, $3)
            ON CONFLICT (org_id) DO UPDATE
            SET key_version = GREATEST(org_key_versions.key_version, EXCLUDED.key_version),
                updated_utc = EXCLUDED.updated_utc
            RETURNING key_version
            "#,
        )
        .bind(org_id)
        .bind(version)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.0)
    }

    /// Strictly increment the org's key version and return the new value.
    /// A true increment in SQL, so concurrent rotations serialize.
    pub async fn rotate_key_version(&self, org_id: Uuid) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO org_key_versions (org_id, key_version, updated_utc)
            VALUES ($1, 1, $2)
            ON CONFLICT (org_id) DO UPDATE
            SET key_version = org_key_versions.key_version + 1,
                updated_utc = EXCLUDED.updated_utc
            RETURNING key_version
            "#,
        )
        .bind(org_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.0)
    }

    /// Upsert one member's wrap. Re-publishing overwrites the previous blob
    /// for that (org, member) slot.
    pub async fn upsert_wrapped_key(&self, wrap: &WrappedOrgKey) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO wrapped_org_keys (org_id, user_id, blob, key_version, key_id, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (org_id, user_id) DO UPDATE
            SET blob = EXCLUDED.blob,
                key_version = EXCLUDED.key_version,
                key_id = EXCLUDED.key_id,
                updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(wrap.org_id)
        .bind(wrap.user_id)
        .bind(&wrap.blob)
        .bind(wrap.key_version)
        .bind(&wrap.key_id)
        .bind(wrap.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    /// Fetch one member's wrap, if any.
    pub async fn find_wrapped_key(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WrappedOrgKey>, AppError> {
        sqlx::query_as::<_, WrappedOrgKey>(
            "SELECT * FROM wrapped_org_keys WHERE org_id = $1 AND user_id = $2",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    // ==================== Audit Operations ====================

    /// Insert one audit event row. Callers treat failures as non-fatal.
    pub async fn insert_audit_event(
        &self,
        event_id: Uuid,
        user_id: Option<Uuid>,
        org_id: Option<Uuid>,
        action: &str,
        detail: Option<&str>,
        ip: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (event_id, user_id, org_id, action, detail, ip, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(org_id)
        .bind(action)
        .bind(detail)
        .bind(ip)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }
}
