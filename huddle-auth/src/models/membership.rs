//! Membership model - ranked roles inside an organization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Membership role, ranked. Comparisons use the rank, so
/// `role >= Role::Admin` reads as "at least admin".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Member,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "viewer" => Some(Role::Viewer),
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Role::Viewer => 0,
            Role::Member => 1,
            Role::Admin => 2,
            Role::Owner => 3,
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Membership entity: one row per (org, user).
#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role_code: String,
    pub created_utc: DateTime<Utc>,
}

impl Membership {
    pub fn new(org_id: Uuid, user_id: Uuid, role: Role) -> Self {
        Self {
            org_id,
            user_id,
            role_code: role.as_str().to_string(),
            created_utc: Utc::now(),
        }
    }

    /// Resolve the stored role code. Unknown codes collapse to the lowest
    /// rank rather than failing the request.
    pub fn role(&self) -> Role {
        Role::parse(&self.role_code).unwrap_or(Role::Viewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_rank_order() {
        assert!(Role::Viewer < Role::Member);
        assert!(Role::Member < Role::Admin);
        assert!(Role::Admin < Role::Owner);
        assert!(Role::Owner >= Role::Admin);
        assert!(Role::Admin >= Role::Admin);
    }

    #[test]
    fn role_round_trips_through_code() {
        for role in [Role::Viewer, Role::Member, Role::Admin, Role::Owner] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn unknown_role_code_resolves_to_viewer() {
        let mut m = Membership::new(Uuid::new_v4(), Uuid::new_v4(), Role::Admin);
        m.role_code = "legacy-role".to_string();
        assert_eq!(m.role(), Role::Viewer);
    }
}
