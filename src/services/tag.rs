use std::collections::BTreeSet;
use uuid::Uuid;

use super::{require_version, stale_or_missing, ServiceResult};
use crate::auth::Principal;
use crate::database::models::tag::{Tag, TagInput};
use crate::database::{DatabaseManager, TenantTx};
use crate::error::ApiError;
use crate::validation::{is_hex_color, ValidationErrors};

pub const DEFAULT_COLOR: &str = "#9e9e9e";

const SELECT_TAG: &str = r#"
    SELECT t.*,
        (SELECT COUNT(*) FROM expense_tags et JOIN expenses e ON e.id = et.expense_id
         WHERE et.tag_id = t.id AND e.deleted_at IS NULL) AS usage_count
    FROM tags t
"#;

pub fn validate_tag(input: &TagInput) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.require_length("name", &input.name, 1, 50);
    if let Some(color) = &input.color {
        if !is_hex_color(color) {
            errors.add("color", "Must be a #RRGGBB colour");
        }
    }
    errors.into_result()
}

pub struct TagService;

impl TagService {
    async fn ensure_unique_name(tx: &mut TenantTx, tenant_id: Uuid, name: &str, except: Option<Uuid>) -> ServiceResult<()> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM tags
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
            return Err(ApiError::conflict(format!("Tag '{}' already exists", name)));
        }
        Ok(())
    }

    async fn fetch(tx: &mut TenantTx, tenant_id: Uuid, id: Uuid) -> ServiceResult<Tag> {
        let sql = format!("{} WHERE t.id = $1 AND t.tenant_id = $2 AND t.deleted_at IS NULL", SELECT_TAG);
        sqlx::query_as::<_, Tag>(&sql)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| ApiError::not_found("Tag not found"))
    }

    pub async fn list(principal: &Principal) -> ServiceResult<Vec<Tag>> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let sql = format!("{} WHERE t.tenant_id = $1 AND t.deleted_at IS NULL ORDER BY lower(t.name)", SELECT_TAG);
        let tags = sqlx::query_as::<_, Tag>(&sql)
            .bind(principal.tenant_id)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(tags)
    }

    pub async fn get(principal: &Principal, id: Uuid) -> ServiceResult<Tag> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let tag = Self::fetch(&mut tx, principal.tenant_id, id).await?;
        tx.commit().await?;
        Ok(tag)
    }

    pub async fn create(principal: &Principal, input: TagInput) -> ServiceResult<Tag> {
        validate_tag(&input)?;
        let name = input.name.trim();
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        Self::ensure_unique_name(&mut tx, principal.tenant_id, name, None).await?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO tags (tenant_id, name, color, created_by, updated_by) VALUES ($1, $2, $3, $4, $4) RETURNING id",
        )
        .bind(principal.tenant_id)
        .bind(name)
        .bind(input.color.as_deref().unwrap_or(DEFAULT_COLOR))
        .bind(&principal.subject)
        .fetch_one(&mut *tx)
        .await?;

        let tag = Self::fetch(&mut tx, principal.tenant_id, id).await?;
        tx.commit().await?;
        Ok(tag)
    }

    pub async fn update(principal: &Principal, id: Uuid, input: TagInput) -> ServiceResult<Tag> {
        let version = require_version(input.version)?;
        validate_tag(&input)?;
        let name = input.name.trim();
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        Self::ensure_unique_name(&mut tx, principal.tenant_id, name, Some(id)).await?;

        let updated = sqlx::query(
            r#"
            UPDATE tags SET name = $4, color = COALESCE($5, color), updated_by = $6, updated_at = now(), version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND version = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(version)
        .bind(name)
        .bind(&input.color)
        .bind(&principal.subject)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(stale_or_missing(&mut tx, "tags", id, "Tag").await);
        }

        let tag = Self::fetch(&mut tx, principal.tenant_id, id).await?;
        tx.commit().await?;
        Ok(tag)
    }

    /// Soft delete; the tag is detached from every expense
    pub async fn delete(principal: &Principal, id: Uuid) -> ServiceResult<()> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let deleted = sqlx::query(
            r#"
            UPDATE tags SET deleted_at = now(), updated_at = now(), updated_by = $3, version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(&principal.subject)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if deleted == 0 {
            return Err(ApiError::not_found("Tag not found"));
        }

        sqlx::query("DELETE FROM expense_tags WHERE tag_id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(principal.tenant_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replace the tags of `expense_id`; every id must be a live tag of the tenant
    pub async fn replace_expense_tags(tx: &mut TenantTx, tenant_id: Uuid, expense_id: Uuid, tag_ids: &[Uuid]) -> ServiceResult<()> {
        let unique: Vec<Uuid> = tag_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();

        if !unique.is_empty() {
            let found: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM tags WHERE tenant_id = $1 AND id = ANY($2) AND deleted_at IS NULL",
            )
            .bind(tenant_id)
            .bind(&unique)
            .fetch_one(&mut **tx)
            .await?;
            if found != unique.len() as i64 {
                return Err(ApiError::field_error("tag_ids", "Unknown tag id"));
            }
        }

        sqlx::query("DELETE FROM expense_tags WHERE expense_id = $1 AND tenant_id = $2")
            .bind(expense_id)
            .bind(tenant_id)
            .execute(&mut **tx)
            .await?;

        if !unique.is_empty() {
            sqlx::query(
                "INSERT INTO expense_tags (tenant_id, expense_id, tag_id) SELECT $1, $2, UNNEST($3::uuid[])",
            )
            .bind(tenant_id)
            .bind(expense_id)
            .bind(&unique)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, color: Option<&str>) -> TagInput {
        TagInput { name: name.into(), color: color.map(str::to_string), version: None }
    }

    #[test]
    fn tag_rules() {
        assert!(validate_tag(&input("Billable", Some("#00aa00"))).is_ok());
        assert!(validate_tag(&input("Billable", None)).is_ok());
        assert!(validate_tag(&input("", None)).unwrap_err().contains("name"));
        assert!(validate_tag(&input(&"x".repeat(51), None)).unwrap_err().contains("name"));
        assert!(validate_tag(&input("Billable", Some("green"))).unwrap_err().contains("color"));
    }
}
