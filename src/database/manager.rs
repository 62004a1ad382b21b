use once_cell::sync::OnceCell;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool, Postgres, Transaction};
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Tenant-scoped transaction; RLS sees `app.tenant_id` for its whole lifetime
pub type TenantTx = Transaction<'static, Postgres>;

/// Process-wide connection pool shared by every tenant. Isolation is enforced
/// by row-level security keyed on the `app.tenant_id` setting.
pub struct DatabaseManager;

static POOL: OnceCell<PgPool> = OnceCell::new();

impl DatabaseManager {
    /// Shared pool, created lazily on first use
    pub fn pool() -> Result<PgPool, DatabaseError> {
        POOL.get_or_try_init(Self::build_pool).cloned()
    }

    fn build_pool() -> Result<PgPool, DatabaseError> {
        let db = &config::config().database;
        let url = db.url.as_deref().ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let mut options = PgConnectOptions::from_str(url)?.application_name("legalops-api");
        if !db.enable_query_logging {
            options = options.disable_statement_logging();
        }

        let pool = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .acquire_timeout(Duration::from_secs(db.connection_timeout))
            .connect_lazy_with(options);

        info!("Created database pool (max_connections={})", db.max_connections);
        Ok(pool)
    }

    /// Begin a transaction bound to one tenant
    pub async fn tenant_tx(tenant_id: Uuid) -> Result<TenantTx, DatabaseError> {
        let pool = Self::pool()?;
        let mut tx = pool.begin().await?;
        Self::bind_tenant(&mut tx, tenant_id).await?;
        Ok(tx)
    }

    /// Set the RLS tenant for the remainder of the transaction
    pub async fn bind_tenant(tx: &mut TenantTx, tenant_id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
            .bind(tenant_id.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Serialize ledger mutations of one tenant until the transaction ends
    pub async fn lock_ledger(tx: &mut TenantTx, tenant_id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('ledger:' || $1))")
            .bind(tenant_id.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check() -> Result<(), DatabaseError> {
        let pool = Self::pool()?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Apply embedded migrations
    pub async fn migrate() -> Result<(), DatabaseError> {
        let pool = Self::pool()?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Close the pool (e.g., on shutdown)
    pub async fn close() {
        if let Some(pool) = POOL.get() {
            pool.close().await;
            info!("Closed database pool");
        }
    }

    /// Warn when a query runs past the configured threshold
    pub fn observe(label: &str, started: Instant) {
        let elapsed = started.elapsed();
        let threshold = Duration::from_millis(config::config().database.slow_query_threshold_ms);
        if elapsed > threshold {
            tracing::warn!(query = label, elapsed_ms = elapsed.as_millis() as u64, "Slow query");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_is_built_once_or_reports_missing_url() {
        match config::config().database.url {
            None => assert!(matches!(DatabaseManager::pool(), Err(DatabaseError::ConfigMissing("DATABASE_URL")))),
            Some(_) => {
                DatabaseManager::pool().unwrap();
                let first = POOL.get().map(|p| p as *const PgPool);
                DatabaseManager::pool().unwrap();
                assert_eq!(first, POOL.get().map(|p| p as *const PgPool));
            }
        }
    }
}
