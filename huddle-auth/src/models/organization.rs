//! Organization model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Organization entity.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Organization {
    pub org_id: Uuid,
    pub org_name: String,
    pub created_utc: DateTime<Utc>,
}

impl Organization {
    pub fn new(org_name: String) -> Self {
        Self {
            org_id: Uuid::new_v4(),
            org_name,
            created_utc: Utc::now(),
        }
    }
}
