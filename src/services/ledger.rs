use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::ServiceResult;
use crate::database::models::expense::LedgerEntry;
use crate::database::{DatabaseManager, TenantTx};
use crate::domain::balance::running_balances;

/// Maintains the stored running balance of the expense ledger.
///
/// Ledger order is `(date, created_at, id)` over rows that are not deleted.
/// Callers hold the tenant's ledger lock for the whole transaction.
pub struct LedgerService;

impl LedgerService {
    /// Balance after the last entry dated strictly before `date`
    pub async fn opening_balance(tx: &mut TenantTx, tenant_id: Uuid, date: NaiveDate) -> ServiceResult<Decimal> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT balance FROM expenses
            WHERE tenant_id = $1 AND deleted_at IS NULL AND date < $2
            ORDER BY date DESC, created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(date)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(balance.unwrap_or(Decimal::ZERO))
    }

    /// Recompute balances of every entry on or after `from`; `None` rebuilds
    /// the whole ledger. Returns the number of rows whose balance changed.
    pub async fn recalculate_from(tx: &mut TenantTx, tenant_id: Uuid, from: Option<NaiveDate>) -> ServiceResult<u64> {
        let started = Instant::now();
        let opening = match from {
            Some(date) => Self::opening_balance(tx, tenant_id, date).await?,
            None => Decimal::ZERO,
        };

        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, income_amount, expense_amount FROM expenses
            WHERE tenant_id = $1 AND deleted_at IS NULL AND ($2::date IS NULL OR date >= $2)
            ORDER BY date, created_at, id
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .fetch_all(&mut **tx)
        .await?;

        let (ids, balances): (Vec<Uuid>, Vec<Decimal>) = running_balances(opening, &entries).into_iter().unzip();
        if ids.is_empty() {
            return Ok(0);
        }

        let updated = sqlx::query(
            r#"
            UPDATE expenses e SET balance = v.balance
            FROM UNNEST($1::uuid[], $2::numeric[]) AS v(id, balance)
            WHERE e.id = v.id AND e.tenant_id = $3 AND e.balance IS DISTINCT FROM v.balance
            "#,
        )
        .bind(&ids)
        .bind(&balances)
        .bind(tenant_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        DatabaseManager::observe("ledger.recalculate", started);
        debug!(tenant = %tenant_id, scanned = ids.len(), updated, "Recalculated running balances");
        Ok(updated)
    }

    /// Rebuild one tenant's ledger in its own transaction
    pub async fn recalculate_tenant(tenant_id: Uuid) -> ServiceResult<u64> {
        let mut tx = DatabaseManager::tenant_tx(tenant_id).await?;
        DatabaseManager::lock_ledger(&mut tx, tenant_id).await?;
        let updated = Self::recalculate_from(&mut tx, tenant_id, None).await?;
        tx.commit().await?;
        Ok(updated)
    }
}
