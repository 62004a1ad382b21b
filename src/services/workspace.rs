use uuid::Uuid;

use super::{require_version, stale_or_missing, ServiceResult};
use crate::auth::Principal;
use crate::database::models::workspace::{Workspace, WorkspaceInput};
use crate::database::{DatabaseManager, TenantTx};
use crate::error::ApiError;
use crate::validation::ValidationErrors;

pub fn validate_workspace(input: &WorkspaceInput) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.require_length("name", &input.name, 1, 100);
    errors.optional_length("description", input.description.as_deref(), 1000);
    errors.optional_length("icon", input.icon.as_deref(), 50);
    errors.into_result()
}

pub struct WorkspaceService;

impl WorkspaceService {
    pub(crate) async fn fetch(tx: &mut TenantTx, tenant_id: Uuid, id: Uuid) -> ServiceResult<Workspace> {
        sqlx::query_as::<_, Workspace>(
            "SELECT * FROM workspaces WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Workspace not found"))
    }

    pub async fn list(principal: &Principal) -> ServiceResult<Vec<Workspace>> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let rows = sqlx::query_as::<_, Workspace>(
            "SELECT * FROM workspaces WHERE tenant_id = $1 AND deleted_at IS NULL ORDER BY lower(name), id",
        )
        .bind(principal.tenant_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    pub async fn get(principal: &Principal, id: Uuid) -> ServiceResult<Workspace> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let workspace = Self::fetch(&mut tx, principal.tenant_id, id).await?;
        tx.commit().await?;
        Ok(workspace)
    }

    pub async fn create(principal: &Principal, input: WorkspaceInput) -> ServiceResult<Workspace> {
        validate_workspace(&input)?;
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let workspace = sqlx::query_as::<_, Workspace>(
            r#"
            INSERT INTO workspaces (tenant_id, name, description, icon, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(principal.tenant_id)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.icon)
        .bind(&principal.subject)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(workspace)
    }

    pub async fn update(principal: &Principal, id: Uuid, input: WorkspaceInput) -> ServiceResult<Workspace> {
        let version = require_version(input.version)?;
        validate_workspace(&input)?;
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let workspace = sqlx::query_as::<_, Workspace>(
            r#"
            UPDATE workspaces SET name = $4, description = $5, icon = $6, updated_by = $7,
                updated_at = now(), version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND version = $3 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(version)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.icon)
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(workspace) = workspace else {
            return Err(stale_or_missing(&mut tx, "workspaces", id, "Workspace").await);
        };
        tx.commit().await?;
        Ok(workspace)
    }

    /// Soft delete; refused while databases or documents still live in it
    pub async fn delete(principal: &Principal, id: Uuid) -> ServiceResult<()> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        Self::fetch(&mut tx, principal.tenant_id, id).await?;

        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM databases WHERE workspace_id = $1 AND tenant_id = $2 AND deleted_at IS NULL)
                OR EXISTS (SELECT 1 FROM documents WHERE workspace_id = $1 AND tenant_id = $2 AND deleted_at IS NULL)
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .fetch_one(&mut *tx)
        .await?;
        if in_use {
            return Err(ApiError::conflict("Workspace still contains databases or documents"));
        }

        sqlx::query(
            r#"
            UPDATE workspaces SET deleted_at = now(), updated_at = now(), updated_by = $3, version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(&principal.subject)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_rules() {
        let ok = WorkspaceInput { name: "Litigation".into(), description: None, icon: Some("scale".into()), version: None };
        assert!(validate_workspace(&ok).is_ok());

        let bad = WorkspaceInput {
            name: " ".into(),
            description: Some("d".repeat(1001)),
            icon: Some("i".repeat(51)),
            version: None,
        };
        let errors = validate_workspace(&bad).unwrap_err();
        assert!(errors.contains("name"));
        assert!(errors.contains("description"));
        assert!(errors.contains("icon"));
    }
}
