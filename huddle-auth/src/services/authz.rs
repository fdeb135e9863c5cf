//! Authorization gate: ranked role checks and membership changes.

use huddle_core::error::AppError;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Role;

use super::{AuditAction, AuditLogger, Database};

/// Membership row shape for API responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberInfo {
    pub user_id: Uuid,
    pub role: Role,
    pub created_utc: chrono::DateTime<chrono::Utc>,
}

/// Role-ranked authorization over org memberships.
#[derive(Clone)]
pub struct AuthzService {
    db: Database,
    audit: AuditLogger,
}

impl AuthzService {
    pub fn new(db: Database, audit: AuditLogger) -> Self {
        Self { db, audit }
    }

    /// Resolve the caller's role and enforce a minimum rank.
    ///
    /// `NOT_A_MEMBER` when there is no membership row at all,
    /// `INSUFFICIENT_ROLE` when the resolved rank is below `min_role`.
    /// Usable as a guard at the start of any resource handler.
    pub async fn require_role(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        min_role: Role,
    ) -> Result<Role, AppError> {
        let membership = self
            .db
            .find_membership(org_id, user_id)
            .await?
            .ok_or(AppError::NotAMember)?;

        let role = membership.role();
        if role < min_role {
            return Err(AppError::InsufficientRole);
        }
        Ok(role)
    }

    /// List an organization's members. Any member may look.
    pub async fn list_members(
        &self,
        org_id: Uuid,
        caller: Uuid,
    ) -> Result<Vec<MemberInfo>, AppError> {
        self.require_role(org_id, caller, Role::Viewer).await?;

        let memberships = self.db.list_memberships(org_id).await?;
        Ok(memberships
            .into_iter()
            .map(|m| MemberInfo {
                user_id: m.user_id,
                role: m.role(),
                created_utc: m.created_utc,
            })
            .collect())
    }

    /// Change a member's role.
    ///
    /// Actors must be at least admin; any change that grants owner or
    /// touches an existing owner requires the actor to be an owner.
    /// Demoting the last owner is rejected.
    pub async fn update_member_role(
        &self,
        org_id: Uuid,
        actor: Uuid,
        target: Uuid,
        new_role: Role,
    ) -> Result<(), AppError> {
        let actor_role = self.require_role(org_id, actor, Role::Admin).await?;

        let target_membership = self
            .db
            .find_membership(org_id, target)
            .await?
            .ok_or(AppError::NotAMember)?;
        let target_role = target_membership.role();

        if (new_role == Role::Owner || target_role == Role::Owner) && actor_role != Role::Owner {
            return Err(AppError::InsufficientRole);
        }

        self.db
            .update_membership_role_guarded(org_id, target, new_role)
            .await?;

        self.audit.record(
            AuditAction::RoleChanged,
            Some(target),
            Some(org_id),
            Some(format!("{} -> {}", target_role.as_str(), new_role.as_str())),
        );
        Ok(())
    }

    /// Remove a member.
    ///
    /// Members may remove themselves; removing anyone else takes admin, and
    /// removing an owner takes owner. Removing the last owner is rejected
    /// either way.
    pub async fn remove_member(
        &self,
        org_id: Uuid,
        actor: Uuid,
        target: Uuid,
    ) -> Result<(), AppError> {
        let target_membership = self
            .db
            .find_membership(org_id, target)
            .await?
            .ok_or(AppError::NotAMember)?;
        let target_role = target_membership.role();

        // Self-removal (leaving) only requires being a member, which the
        // target lookup above already proved.
        if actor != target {
            let actor_role = self.require_role(org_id, actor, Role::Admin).await?;
            if target_role == Role::Owner && actor_role != Role::Owner {
                return Err(AppError::InsufficientRole);
            }
        }

        self.db.delete_membership_guarded(org_id, target).await?;

        self.audit.record(
            AuditAction::MemberRemoved,
            Some(target),
            Some(org_id),
            None,
        );
        Ok(())
    }
}
