use uuid::Uuid;

use super::ServiceResult;
use crate::database::models::tenant::Tenant;
use crate::database::DatabaseManager;

/// Registry of law firms; the `tenants` table is outside row-level security
pub struct TenantService;

impl TenantService {
    pub async fn find(tenant_id: Uuid) -> ServiceResult<Option<Tenant>> {
        let pool = DatabaseManager::pool()?;
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&pool)
            .await?;
        Ok(tenant)
    }

    pub async fn list_active() -> ServiceResult<Vec<Tenant>> {
        let pool = DatabaseManager::pool()?;
        let tenants = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE status = 'active' AND deleted_at IS NULL ORDER BY slug",
        )
        .fetch_all(&pool)
        .await?;
        Ok(tenants)
    }
}
