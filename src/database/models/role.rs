use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant-defined role; built-in roles live in `auth::permissions`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomRole {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleAssignment {
    pub tenant_id: Uuid,
    pub subject: String,
    pub role_name: String,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentInput {
    pub subject: String,
    pub role_name: String,
}
