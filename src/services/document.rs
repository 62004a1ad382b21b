use serde::Deserialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::workspace::WorkspaceService;
use super::{require_version, stale_or_missing, ServiceResult};
use crate::auth::Principal;
use crate::database::models::document::{Document, DocumentInput, DocumentStatus, StatusInput};
use crate::database::{DatabaseManager, TenantTx};
use crate::error::ApiError;
use crate::types::{Page, PageRequest};
use crate::validation::ValidationErrors;

#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub workspace_id: Option<Uuid>,
    pub status: Option<String>,
    pub q: Option<String>,
}

pub fn validate_document(input: &DocumentInput) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.require_length("title", &input.title, 1, 255);
    errors.into_result()
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = BTreeSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

pub struct DocumentService;

impl DocumentService {
    async fn fetch(tx: &mut TenantTx, tenant_id: Uuid, id: Uuid) -> ServiceResult<Document> {
        sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Document not found"))
    }

    /// Workspace and attachment references must exist in the tenant
    async fn check_references(tx: &mut TenantTx, tenant_id: Uuid, input: &DocumentInput, attachments: &[Uuid]) -> ServiceResult<()> {
        if let Some(workspace_id) = input.workspace_id {
            WorkspaceService::fetch(tx, tenant_id, workspace_id)
                .await
                .map_err(|_| ApiError::field_error("workspace_id", "Unknown workspace"))?;
        }
        if !attachments.is_empty() {
            let found: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM attachments WHERE tenant_id = $1 AND id = ANY($2) AND deleted_at IS NULL",
            )
            .bind(tenant_id)
            .bind(attachments)
            .fetch_one(&mut **tx)
            .await?;
            if found != attachments.len() as i64 {
                return Err(ApiError::field_error("attachment_ids", "Unknown attachment id"));
            }
        }
        Ok(())
    }

    pub async fn list(principal: &Principal, query: DocumentQuery) -> ServiceResult<Page<Document>> {
        if let Some(status) = &query.status {
            if DocumentStatus::parse(status).is_none() {
                return Err(ApiError::field_error("status", "Must be draft, final or archived"));
            }
        }
        let request = PageRequest { page: query.page, size: query.size, sort: None };
        let pattern = query.q.as_deref().map(|q| format!("%{}%", q.replace('%', "\\%").replace('_', "\\_")));

        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        const FILTER: &str = r#"
            FROM documents
            WHERE tenant_id = $1 AND deleted_at IS NULL
              AND ($2::uuid IS NULL OR workspace_id = $2)
              AND ($3::text IS NULL OR status = $3)
              AND ($4::text IS NULL OR title ILIKE $4 OR body ILIKE $4)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {}", FILTER))
            .bind(principal.tenant_id)
            .bind(query.workspace_id)
            .bind(&query.status)
            .bind(&pattern)
            .fetch_one(&mut *tx)
            .await?;

        let rows = sqlx::query_as::<_, Document>(&format!(
            "SELECT * {} ORDER BY updated_at DESC, id DESC LIMIT $5 OFFSET $6",
            FILTER
        ))
        .bind(principal.tenant_id)
        .bind(query.workspace_id)
        .bind(&query.status)
        .bind(&pattern)
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Page::new(rows, &request, total))
    }

    pub async fn get(principal: &Principal, id: Uuid) -> ServiceResult<Document> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let document = Self::fetch(&mut tx, principal.tenant_id, id).await?;
        tx.commit().await?;
        Ok(document)
    }

    pub async fn create(principal: &Principal, input: DocumentInput) -> ServiceResult<Document> {
        validate_document(&input)?;
        let attachments = dedup(&input.attachment_ids);
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        Self::check_references(&mut tx, principal.tenant_id, &input, &attachments).await?;

        let document = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (tenant_id, workspace_id, title, body, attachment_ids, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(principal.tenant_id)
        .bind(input.workspace_id)
        .bind(input.title.trim())
        .bind(&input.body)
        .bind(&attachments)
        .bind(&principal.subject)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(document)
    }

    /// Full replace of the editable fields; archived documents are read-only
    pub async fn update(principal: &Principal, id: Uuid, input: DocumentInput) -> ServiceResult<Document> {
        let version = require_version(input.version)?;
        validate_document(&input)?;
        let attachments = dedup(&input.attachment_ids);
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;

        let current = Self::fetch(&mut tx, principal.tenant_id, id).await?;
        if current.status == DocumentStatus::Archived.as_str() {
            return Err(ApiError::conflict("Archived documents are read-only"));
        }
        Self::check_references(&mut tx, principal.tenant_id, &input, &attachments).await?;

        let document = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents SET workspace_id = $4, title = $5, body = $6, attachment_ids = $7,
                updated_by = $8, updated_at = now(), version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND version = $3 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(version)
        .bind(input.workspace_id)
        .bind(input.title.trim())
        .bind(&input.body)
        .bind(&attachments)
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(document) = document else {
            return Err(stale_or_missing(&mut tx, "documents", id, "Document").await);
        };
        tx.commit().await?;
        Ok(document)
    }

    pub async fn transition(principal: &Principal, id: Uuid, input: StatusInput) -> ServiceResult<Document> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let current = Self::fetch(&mut tx, principal.tenant_id, id).await?;
        let from = DocumentStatus::parse(&current.status)
            .ok_or_else(|| ApiError::internal_server_error("Document has an unknown status"))?;
        if !from.can_transition_to(input.status) {
            return Err(ApiError::conflict(format!(
                "Cannot move a {} document to {}",
                from.as_str(),
                input.status.as_str()
            )));
        }

        let document = sqlx::query_as::<_, Document>(
            r#"
            UPDATE documents SET status = $4, updated_by = $5, updated_at = now(), version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND version = $3 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(input.version)
        .bind(input.status.as_str())
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(document) = document else {
            return Err(stale_or_missing(&mut tx, "documents", id, "Document").await);
        };
        tx.commit().await?;
        tracing::info!(tenant = %principal.tenant_id, document = %id, status = input.status.as_str(), "Document status changed");
        Ok(document)
    }

    pub async fn delete(principal: &Principal, id: Uuid) -> ServiceResult<()> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let deleted = sqlx::query(
            r#"
            UPDATE documents SET deleted_at = now(), updated_at = now(), updated_by = $3, version = version + 1
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
            return Err(ApiError::not_found("Document not found"));
        }
        tx.commit().await?;
        Ok(())
    }
}
