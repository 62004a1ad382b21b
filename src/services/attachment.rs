use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::tenant::TenantService;
use super::ServiceResult;
use crate::auth::Principal;
use crate::config;
use crate::database::models::attachment::{Attachment, AttachmentStatus};
use crate::database::{DatabaseManager, TenantTx};
use crate::error::ApiError;
use crate::storage::{storage_key, FileStorage};

const MAX_FILE_NAME: usize = 255;

/// File received from a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Strip directories and control characters from a client supplied name
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME)
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Content type without parameters, lowercased (`text/plain; charset=utf-8` → `text/plain`)
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

pub fn check_upload(file: &UploadedFile) -> ServiceResult<String> {
    let storage = &config::config().storage;
    if file.bytes.len() > storage.max_upload_bytes {
        return Err(ApiError::payload_too_large(format!(
            "File exceeds the {} byte upload limit",
            storage.max_upload_bytes
        )));
    }
    if file.bytes.is_empty() {
        return Err(ApiError::field_error("file", "File is empty"));
    }
    let content_type = normalize_content_type(&file.content_type);
    if !storage.allowed_content_types.iter().any(|t| t == &content_type) {
        let mut errors = std::collections::HashMap::new();
        errors.insert("file".to_string(), format!("Content type '{}' is not allowed", content_type));
        return Err(ApiError::unprocessable_entity("Unsupported media type", errors));
    }
    Ok(content_type)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub struct AttachmentService;

impl AttachmentService {
    async fn fetch(tx: &mut TenantTx, tenant_id: Uuid, id: Uuid) -> ServiceResult<Attachment> {
        sqlx::query_as::<_, Attachment>("SELECT * FROM attachments WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL")
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| ApiError::not_found("Attachment not found"))
    }

    async fn ensure_expense(tx: &mut TenantTx, tenant_id: Uuid, expense_id: Uuid) -> ServiceResult<()> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM expenses WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL)",
        )
        .bind(expense_id)
        .bind(tenant_id)
        .fetch_one(&mut **tx)
        .await?;
        if exists {
            Ok(())
        } else {
            Err(ApiError::not_found("Expense not found"))
        }
    }

    pub async fn upload(
        principal: &Principal,
        storage: &dyn FileStorage,
        file: UploadedFile,
        expense_id: Option<Uuid>,
    ) -> ServiceResult<Attachment> {
        let content_type = check_upload(&file)?;
        let tenant_id = principal.tenant_id;
        let id = Uuid::new_v4();
        let key = storage_key(tenant_id, id, Utc::now());
        let checksum = sha256_hex(&file.bytes);

        let mut tx = DatabaseManager::tenant_tx(tenant_id).await?;
        if let Some(expense_id) = expense_id {
            Self::ensure_expense(&mut tx, tenant_id, expense_id).await?;
        }
        let status = if expense_id.is_some() { AttachmentStatus::Linked } else { AttachmentStatus::Temporary };

        storage.put(&key, &file.bytes).await?;

        let inserted = sqlx::query_as::<_, Attachment>(
            r#"
            INSERT INTO attachments
                (id, tenant_id, expense_id, file_name, content_type, size_bytes, checksum_sha256, storage_key, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(expense_id)
        .bind(sanitize_file_name(&file.file_name))
        .bind(&content_type)
        .bind(file.bytes.len() as i64)
        .bind(&checksum)
        .bind(&key)
        .bind(status.as_str())
        .bind(&principal.subject)
        .fetch_one(&mut *tx)
        .await;

        let committed = match inserted {
            Ok(attachment) => tx.commit().await.map(|_| attachment),
            Err(e) => Err(e),
        };
        match committed {
            Ok(attachment) => {
                tracing::info!(tenant = %tenant_id, attachment = %id, size = attachment.size_bytes, "Attachment uploaded");
                Ok(attachment)
            }
            Err(e) => {
                if let Err(cleanup) = storage.delete(&key).await {
                    tracing::warn!("Failed to remove orphaned upload {}: {}", key, cleanup);
                }
                Err(e.into())
            }
        }
    }

    pub async fn get(principal: &Principal, id: Uuid) -> ServiceResult<Attachment> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let attachment = Self::fetch(&mut tx, principal.tenant_id, id).await?;
        tx.commit().await?;
        Ok(attachment)
    }

    pub async fn download(principal: &Principal, storage: &dyn FileStorage, id: Uuid) -> ServiceResult<(Attachment, Vec<u8>)> {
        let attachment = Self::get(principal, id).await?;
        let bytes = storage.get(&attachment.storage_key).await?;
        Ok((attachment, bytes))
    }

    /// Attachments of an expense, or the caller's unlinked uploads when no expense is given
    pub async fn list(principal: &Principal, expense_id: Option<Uuid>) -> ServiceResult<Vec<Attachment>> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let rows = match expense_id {
            Some(expense_id) => {
                sqlx::query_as::<_, Attachment>(
                    r#"
                    SELECT * FROM attachments
                    WHERE tenant_id = $1 AND expense_id = $2 AND deleted_at IS NULL
                    ORDER BY created_at
                    "#,
                )
                .bind(principal.tenant_id)
                .bind(expense_id)
                .fetch_all(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, Attachment>(
                    r#"
                    SELECT * FROM attachments
                    WHERE tenant_id = $1 AND status = 'temporary' AND created_by = $2 AND deleted_at IS NULL
                    ORDER BY created_at
                    "#,
                )
                .bind(principal.tenant_id)
                .bind(&principal.subject)
                .fetch_all(&mut *tx)
                .await?
            }
        };
        tx.commit().await?;
        Ok(rows)
    }

    /// Link to an expense, or return to temporary with `None`
    pub async fn link(principal: &Principal, id: Uuid, expense_id: Option<Uuid>) -> ServiceResult<Attachment> {
        let tenant_id = principal.tenant_id;
        let mut tx = DatabaseManager::tenant_tx(tenant_id).await?;
        if let Some(expense_id) = expense_id {
            Self::ensure_expense(&mut tx, tenant_id, expense_id).await?;
        }
        let status = if expense_id.is_some() { AttachmentStatus::Linked } else { AttachmentStatus::Temporary };

        let attachment = sqlx::query_as::<_, Attachment>(
            r#"
            UPDATE attachments SET expense_id = $3, status = $4, updated_at = now()
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(expense_id)
        .bind(status.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Attachment not found"))?;
        tx.commit().await?;
        Ok(attachment)
    }

    /// Link uploads to a freshly saved expense inside its transaction
    pub async fn link_many(tx: &mut TenantTx, tenant_id: Uuid, expense_id: Uuid, ids: &[Uuid]) -> ServiceResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut unique = ids.to_vec();
        unique.sort();
        unique.dedup();

        let linked = sqlx::query(
            r#"
            UPDATE attachments SET expense_id = $3, status = 'linked', updated_at = now()
            WHERE tenant_id = $1 AND id = ANY($2) AND deleted_at IS NULL
              AND (expense_id IS NULL OR expense_id = $3)
            "#,
        )
        .bind(tenant_id)
        .bind(&unique)
        .bind(expense_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if linked != unique.len() as u64 {
            return Err(ApiError::field_error(
                "attachment_ids",
                "Unknown attachment id or attachment already linked elsewhere",
            ));
        }
        Ok(())
    }

    /// Soft delete the row, then remove the stored bytes
    pub async fn delete(principal: &Principal, storage: &dyn FileStorage, id: Uuid) -> ServiceResult<()> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let key: String = sqlx::query_scalar(
            r#"
            UPDATE attachments SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            RETURNING storage_key
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Attachment not found"))?;
        tx.commit().await?;

        if let Err(e) = storage.delete(&key).await {
            tracing::warn!("Attachment {} deleted but its file could not be removed: {}", id, e);
        }
        Ok(())
    }

    /// Remove temporary uploads older than `ttl_hours` across all tenants
    pub async fn cleanup_temporaries(storage: &dyn FileStorage, ttl_hours: u64) -> ServiceResult<u64> {
        let cutoff = Utc::now() - Duration::hours(ttl_hours as i64);
        let mut removed = 0u64;

        for tenant in TenantService::list_active().await? {
            let mut tx = DatabaseManager::tenant_tx(tenant.id).await?;
            let keys: Vec<String> = sqlx::query_scalar(
                r#"
                UPDATE attachments SET deleted_at = now(), updated_at = now()
                WHERE tenant_id = $1 AND status = 'temporary' AND deleted_at IS NULL AND created_at < $2
                RETURNING storage_key
                "#,
            )
            .bind(tenant.id)
            .bind(cutoff)
            .fetch_all(&mut *tx)
            .await?;
            tx.commit().await?;

            for key in &keys {
                if let Err(e) = storage.delete(key).await {
                    tracing::warn!("Could not remove expired upload {}: {}", key, e);
                }
            }
            if !keys.is_empty() {
                tracing::info!(tenant = %tenant.slug, count = keys.len(), "Removed expired temporary attachments");
            }
            removed += keys.len() as u64;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: &str, len: usize) -> UploadedFile {
        UploadedFile {
            file_name: name.into(),
            content_type: content_type.into(),
            bytes: vec![b'a'; len],
        }
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\receipt.pdf"), "receipt.pdf");
        assert_eq!(sanitize_file_name("..."), "file");
        assert_eq!(sanitize_file_name("inv\u{0}oice.pdf"), "invoice.pdf");
    }

    #[test]
    fn upload_checks() {
        assert_eq!(check_upload(&file("a.pdf", "application/pdf", 10)).unwrap(), "application/pdf");
        assert_eq!(check_upload(&file("a.txt", "Text/Plain; charset=utf-8", 3)).unwrap(), "text/plain");
        assert_eq!(check_upload(&file("a.exe", "application/x-msdownload", 10)).unwrap_err().status_code(), 422);
        let too_big = config::config().storage.max_upload_bytes + 1;
        assert_eq!(check_upload(&file("a.pdf", "application/pdf", too_big)).unwrap_err().status_code(), 413);
        assert_eq!(check_upload(&file("a.pdf", "application/pdf", 0)).unwrap_err().status_code(), 400);
    }

    #[test]
    fn checksum_is_hex_sha256() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
