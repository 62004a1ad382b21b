//! Domain services. Each operation opens a tenant transaction, so row-level
//! security applies to every statement, and commits it before returning.

pub mod attachment;
pub mod document;
pub mod expense;
pub mod ledger;
pub mod report;
pub mod role;
pub mod table;
pub mod tag;
pub mod tenant;
pub mod workspace;

use uuid::Uuid;

use crate::database::TenantTx;
use crate::error::ApiError;

pub type ServiceResult<T> = Result<T, ApiError>;

/// Explain an optimistic update that matched no row: 404 when the row is
/// gone, 409 when its version moved on.
pub(crate) async fn stale_or_missing(tx: &mut TenantTx, table: &'static str, id: Uuid, entity: &str) -> ApiError {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1 AND deleted_at IS NULL)", table);
    match sqlx::query_scalar::<_, bool>(&sql).bind(id).fetch_one(&mut **tx).await {
        Ok(true) => ApiError::stale_version(entity),
        Ok(false) => ApiError::not_found(format!("{} not found", entity)),
        Err(e) => e.into(),
    }
}

pub(crate) fn require_version(version: Option<i32>) -> ServiceResult<i32> {
    version.ok_or_else(|| ApiError::field_error("version", "This field is required"))
}
