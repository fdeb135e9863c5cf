//! Best-effort audit trail.
//!
//! Events are recorded on a detached task so the primary operation never
//! waits on, or fails because of, the trail.

use uuid::Uuid;

use super::Database;

/// Auth-relevant actions worth a trail entry.
#[derive(Debug, Clone, Copy)]
pub enum AuditAction {
    Register,
    Login,
    LoginFailed,
    MfaChallengeIssued,
    MfaVerified,
    MfaEnabled,
    MfaDisabled,
    RefreshRotated,
    Logout,
    LogoutAll,
    PasswordChanged,
    RoleChanged,
    MemberRemoved,
    DeviceKeyRegistered,
    WrapsPublished,
    KeyRotated,
}

impl AuditAction {
    fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Register => "register",
            AuditAction::Login => "login",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::MfaChallengeIssued => "mfa_challenge_issued",
            AuditAction::MfaVerified => "mfa_verified",
            AuditAction::MfaEnabled => "mfa_enabled",
            AuditAction::MfaDisabled => "mfa_disabled",
            AuditAction::RefreshRotated => "refresh_rotated",
            AuditAction::Logout => "logout",
            AuditAction::LogoutAll => "logout_all",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::RoleChanged => "role_changed",
            AuditAction::MemberRemoved => "member_removed",
            AuditAction::DeviceKeyRegistered => "device_key_registered",
            AuditAction::WrapsPublished => "wraps_published",
            AuditAction::KeyRotated => "key_rotated",
        }
    }
}

/// Fire-and-forget audit sink.
#[derive(Clone)]
pub struct AuditLogger {
    db: Database,
}

impl AuditLogger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record an event. Returns immediately; the insert happens on its own
    /// task and a failure is only a warning.
    pub fn record(
        &self,
        action: AuditAction,
        user_id: Option<Uuid>,
        org_id: Option<Uuid>,
        detail: Option<String>,
    ) {
        let db = self.db.clone();
        let action_str = action.as_str();
        tokio::spawn(async move {
            if let Err(e) = db
                .insert_audit_event(
                    Uuid::new_v4(),
                    user_id,
                    org_id,
                    action_str,
                    detail.as_deref(),
                    None,
                )
                .await
            {
                tracing::warn!(action = action_str, error = %e, "audit event dropped");
            }
        });
    }
}
