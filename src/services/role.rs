use serde::Serialize;
use uuid::Uuid;

use super::{require_version, stale_or_missing, ServiceResult};
use crate::auth::permissions::{builtin_grants, expand_grant, expand_grants, is_builtin_role, BUILTIN_ROLES};
use crate::auth::{PermissionSet, Principal};
use crate::database::models::role::{AssignmentInput, CustomRole, RoleAssignment, RoleInput};
use crate::database::{DatabaseManager, TenantTx};
use crate::error::ApiError;
use crate::validation::ValidationErrors;

/// Entry of `GET /roles`
#[derive(Debug, Clone, Serialize)]
pub struct RoleView {
    pub id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub built_in: bool,
    pub version: Option<i32>,
}

impl From<CustomRole> for RoleView {
    fn from(role: CustomRole) -> Self {
        Self {
            id: Some(role.id),
            name: role.name,
            description: role.description,
            permissions: role.permissions,
            built_in: false,
            version: Some(role.version),
        }
    }
}

pub fn builtin_views() -> Vec<RoleView> {
    BUILTIN_ROLES
        .iter()
        .map(|name| RoleView {
            id: None,
            name: name.to_string(),
            description: None,
            permissions: builtin_grants(name)
                .unwrap_or_default()
                .into_iter()
                .map(str::to_string)
                .collect(),
            built_in: true,
            version: None,
        })
        .collect()
}

pub fn validate_role(input: &RoleInput) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.require_length("name", &input.name, 1, 50);
    errors.optional_length("description", input.description.as_deref(), 500);
    if is_builtin_role(input.name.trim()) {
        errors.add("name", "Name is reserved for a built-in role");
    }
    if let Some(bad) = input.permissions.iter().find(|p| expand_grant(p).is_none()) {
        errors.add("permissions", format!("Unknown permission '{}'", bad));
    }
    errors.into_result()
}

pub struct RoleService;

impl RoleService {
    /// Roles and permissions of `subject`: stored assignments plus the roles
    /// and permissions carried by the token.
    pub async fn effective_permissions(
        tx: &mut TenantTx,
        tenant_id: Uuid,
        subject: &str,
        token_roles: &[String],
        token_permissions: &[String],
    ) -> ServiceResult<(Vec<String>, PermissionSet)> {
        let assigned: Vec<String> = sqlx::query_scalar(
            "SELECT role_name FROM user_roles WHERE tenant_id = $1 AND subject = $2 ORDER BY role_name",
        )
        .bind(tenant_id)
        .bind(subject)
        .fetch_all(&mut **tx)
        .await?;

        let mut roles: Vec<String> = assigned;
        for role in token_roles {
            if !roles.iter().any(|r| r.eq_ignore_ascii_case(role)) {
                roles.push(role.clone());
            }
        }

        let mut permissions = expand_grants(token_permissions);
        let mut custom_names = Vec::new();
        for role in &roles {
            match builtin_grants(role) {
                Some(grants) => permissions.extend(expand_grants(grants)),
                None => custom_names.push(role.to_lowercase()),
            }
        }

        if !custom_names.is_empty() {
            let grants: Vec<Vec<String>> = sqlx::query_scalar(
                "SELECT permissions FROM roles WHERE tenant_id = $1 AND lower(name) = ANY($2) AND deleted_at IS NULL",
            )
            .bind(tenant_id)
            .bind(&custom_names)
            .fetch_all(&mut **tx)
            .await?;
            for g in grants {
                permissions.extend(expand_grants(g));
            }
        }

        Ok((roles, permissions))
    }

    pub async fn list(principal: &Principal) -> ServiceResult<Vec<RoleView>> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let custom = sqlx::query_as::<_, CustomRole>(
            "SELECT * FROM roles WHERE tenant_id = $1 AND deleted_at IS NULL ORDER BY lower(name)",
        )
        .bind(principal.tenant_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut views = builtin_views();
        views.extend(custom.into_iter().map(RoleView::from));
        Ok(views)
    }

    async fn ensure_unique_name(tx: &mut TenantTx, tenant_id: Uuid, name: &str, except: Option<Uuid>) -> ServiceResult<()> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM roles
                WHERE tenant_id = $1 AND lower(name) = lower($2) AND deleted_at IS NULL
                  AND ($3::uuid IS NULL OR id <> $3)
            )
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .bind(except)
        .fetch_one(&mut **tx)
        .await?;
        if taken {
            return Err(ApiError::conflict(format!("Role '{}' already exists", name)));
        }
        Ok(())
    }

    pub async fn create(principal: &Principal, input: RoleInput) -> ServiceResult<CustomRole> {
        validate_role(&input)?;
        let name = input.name.trim();
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        Self::ensure_unique_name(&mut tx, principal.tenant_id, name, None).await?;

        let role = sqlx::query_as::<_, CustomRole>(
            r#"
            INSERT INTO roles (tenant_id, name, description, permissions, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(principal.tenant_id)
        .bind(name)
        .bind(&input.description)
        .bind(&input.permissions)
        .bind(&principal.subject)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(tenant = %principal.tenant_id, role = %role.name, "Role created");
        Ok(role)
    }

    /// Update a custom role; renames carry existing assignments along
    pub async fn update(principal: &Principal, id: Uuid, input: RoleInput) -> ServiceResult<CustomRole> {
        let version = require_version(input.version)?;
        validate_role(&input)?;
        let name = input.name.trim();
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        Self::ensure_unique_name(&mut tx, principal.tenant_id, name, Some(id)).await?;

        let old_name: Option<String> = sqlx::query_scalar(
            "SELECT name FROM roles WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(principal.tenant_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(old_name) = old_name else {
            return Err(ApiError::not_found("Role not found"));
        };

        let role = sqlx::query_as::<_, CustomRole>(
            r#"
            UPDATE roles SET name = $4, description = $5, permissions = $6, updated_by = $7,
                updated_at = now(), version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND version = $3 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(version)
        .bind(name)
        .bind(&input.description)
        .bind(&input.permissions)
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(role) = role else {
            return Err(stale_or_missing(&mut tx, "roles", id, "Role").await);
        };

        if old_name != role.name {
            sqlx::query("UPDATE user_roles SET role_name = $3 WHERE tenant_id = $1 AND role_name = $2")
                .bind(principal.tenant_id)
                .bind(&old_name)
                .bind(&role.name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(role)
    }

    /// Soft delete; assignments of the role are removed
    pub async fn delete(principal: &Principal, id: Uuid) -> ServiceResult<()> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let name: String = sqlx::query_scalar(
            r#"
            UPDATE roles SET deleted_at = now(), updated_at = now(), updated_by = $3, version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            RETURNING name
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Role not found"))?;

        sqlx::query("DELETE FROM user_roles WHERE tenant_id = $1 AND role_name = $2")
            .bind(principal.tenant_id)
            .bind(&name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_assignments(principal: &Principal, subject: Option<&str>) -> ServiceResult<Vec<RoleAssignment>> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let rows = sqlx::query_as::<_, RoleAssignment>(
            r#"
            SELECT * FROM user_roles
            WHERE tenant_id = $1 AND ($2::text IS NULL OR subject = $2)
            ORDER BY subject, role_name
            "#,
        )
        .bind(principal.tenant_id)
        .bind(subject)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    pub async fn assign(principal: &Principal, input: AssignmentInput) -> ServiceResult<RoleAssignment> {
        let mut errors = ValidationErrors::new();
        errors.require_length("subject", &input.subject, 1, 255);
        errors.require_length("role_name", &input.role_name, 1, 50);
        errors.into_result()?;

        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let role_name = match BUILTIN_ROLES.iter().find(|r| r.eq_ignore_ascii_case(input.role_name.trim())) {
            Some(builtin) => builtin.to_string(),
            None => sqlx::query_scalar::<_, String>(
                "SELECT name FROM roles WHERE tenant_id = $1 AND lower(name) = lower($2) AND deleted_at IS NULL",
            )
            .bind(principal.tenant_id)
            .bind(input.role_name.trim())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::field_error("role_name", "Unknown role"))?,
        };

        let assignment = sqlx::query_as::<_, RoleAssignment>(
            r#"
            INSERT INTO user_roles (tenant_id, subject, role_name, assigned_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, subject, role_name) DO UPDATE SET assigned_by = user_roles.assigned_by
            RETURNING *
            "#,
        )
        .bind(principal.tenant_id)
        .bind(input.subject.trim())
        .bind(&role_name)
        .bind(&principal.subject)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(tenant = %principal.tenant_id, subject = %assignment.subject, role = %role_name, "Role assigned");
        Ok(assignment)
    }

    pub async fn revoke(principal: &Principal, input: AssignmentInput) -> ServiceResult<()> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let removed = sqlx::query(
            "DELETE FROM user_roles WHERE tenant_id = $1 AND subject = $2 AND lower(role_name) = lower($3)",
        )
        .bind(principal.tenant_id)
        .bind(input.subject.trim())
        .bind(input.role_name.trim())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if removed == 0 {
            return Err(ApiError::not_found("Assignment not found"));
        }
        tx.commit().await?;
        Ok(())
    }
}
