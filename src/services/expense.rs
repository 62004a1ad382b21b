use chrono::NaiveDate;
use futures::TryStreamExt;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Instant;
use uuid::Uuid;

use super::attachment::AttachmentService;
use super::tag::TagService;
use super::{require_version, stale_or_missing, ServiceResult};
use crate::auth::Principal;
use crate::config;
use crate::database::models::expense::{Expense, ExpenseInput};
use crate::database::{DatabaseManager, TenantTx};
use crate::error::ApiError;
use crate::filter::{ColumnResolver, FilterOrder, FilterWhere, SqlCast};
use crate::services::ledger::LedgerService;
use crate::types::{Page, PageRequest};
use crate::validation::ValidationErrors;

pub static MAX_AMOUNT: Lazy<Decimal> = Lazy::new(|| Decimal::new(999_999_999_999, 2));

/// Expense fields usable in `where` filters and `sort`
pub static EXPENSE_FIELDS: Lazy<ColumnResolver> = Lazy::new(|| {
    ColumnResolver::new(&[
        ("date", "date", SqlCast::Date),
        ("category", "category", SqlCast::Text),
        ("description", "description", SqlCast::Text),
        ("income_amount", "income_amount", SqlCast::Numeric),
        ("expense_amount", "expense_amount", SqlCast::Numeric),
        ("balance", "balance", SqlCast::Numeric),
        ("memo", "memo", SqlCast::Text),
        ("case_reference", "case_reference", SqlCast::Text),
        ("created_at", "created_at", SqlCast::Timestamptz),
        ("updated_at", "updated_at", SqlCast::Timestamptz),
        ("created_by", "created_by", SqlCast::Text),
    ])
});

const SELECT_EXPENSE: &str = r#"
    SELECT e.*,
        COALESCE((SELECT array_agg(et.tag_id ORDER BY et.tag_id) FROM expense_tags et
                  WHERE et.expense_id = e.id), '{}') AS tag_ids,
        COALESCE((SELECT array_agg(a.id ORDER BY a.created_at) FROM attachments a
                  WHERE a.expense_id = e.id AND a.deleted_at IS NULL), '{}') AS attachment_ids
    FROM expenses e
"#;

/// Query string of `GET /expenses` and `GET /expenses/export`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub category: Option<String>,
    pub tag_id: Option<Uuid>,
    /// Free text matched against description and memo
    pub q: Option<String>,
    /// JSON where-clause
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
}

impl ExpenseQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            size: self.size,
            sort: self.sort.clone(),
        }
    }
}

/// Field checks that need no database access
pub fn validate_expense(input: &ExpenseInput) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.require_length("category", &input.category, 1, 50);
    errors.require_length("description", &input.description, 1, 500);
    errors.optional_length("memo", input.memo.as_deref(), 2000);
    errors.optional_length("case_reference", input.case_reference.as_deref(), 100);
    errors.money("income_amount", input.income_amount, *MAX_AMOUNT);
    errors.money("expense_amount", input.expense_amount, *MAX_AMOUNT);

    if !errors.contains("income_amount") && !errors.contains("expense_amount") {
        let income = input.income_amount > Decimal::ZERO;
        let expense = input.expense_amount > Decimal::ZERO;
        if income == expense {
            errors.add("amount", "Exactly one of income_amount and expense_amount must be greater than zero");
        }
    }
    errors.into_result()
}

/// WHERE clause and text parameters shared by list, count and export
struct ListSql {
    conditions: Vec<String>,
    params: Vec<Option<String>>,
}

impl ListSql {
    fn build(tenant_id: Uuid, query: &ExpenseQuery) -> ServiceResult<Self> {
        let mut sql = ListSql {
            conditions: vec!["e.tenant_id = $1::uuid".to_string(), "e.deleted_at IS NULL".to_string()],
            params: vec![Some(tenant_id.to_string())],
        };
        if let Some(from) = query.from {
            sql.push("e.date >= {}::date", from.to_string());
        }
        if let Some(to) = query.to {
            sql.push("e.date <= {}::date", to.to_string());
        }
        if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
            sql.push("e.category = {}::text", category.to_string());
        }
        if let Some(tag_id) = query.tag_id {
            sql.push(
                "EXISTS (SELECT 1 FROM expense_tags t WHERE t.expense_id = e.id AND t.tag_id = {}::uuid)",
                tag_id.to_string(),
            );
        }
        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
            sql.push("(e.description ILIKE {0}::text OR e.memo ILIKE {0}::text)", pattern);
        }
        if let Some(raw) = query.where_clause.as_deref().filter(|w| !w.trim().is_empty()) {
            let where_data: serde_json::Value =
                serde_json::from_str(raw).map_err(|e| ApiError::field_error("where", format!("Invalid JSON: {}", e)))?;
            let filter = FilterWhere::generate(
                &where_data,
                &*EXPENSE_FIELDS,
                sql.params.len(),
                config::config().filter.max_nested_depth,
            )?;
            if config::config().filter.debug_logging {
                tracing::debug!(sql = %filter.query, "Expense filter");
            }
            sql.conditions.push(format!("({})", filter.query));
            sql.params.extend(filter.params);
        }
        Ok(sql)
    }

    /// `template` names the new placeholder `{}` (or `{0}` when used twice)
    fn push(&mut self, template: &str, value: String) {
        self.params.push(Some(value));
        let placeholder = format!("${}", self.params.len());
        self.conditions
            .push(template.replace("{0}", &placeholder).replace("{}", &placeholder));
    }

    fn where_sql(&self) -> String {
        self.conditions.join(" AND ")
    }

    fn order_sql(&self, page: &PageRequest) -> ServiceResult<String> {
        let order = match page.order() {
            Some(order) => FilterOrder::parse(&order)?,
            None => FilterOrder::parse(&serde_json::json!("date desc"))?,
        };
        Ok(FilterOrder::generate(&order, &*EXPENSE_FIELDS, "\"created_at\" DESC, \"id\" DESC")?)
    }
}

pub struct ExpenseService;

impl ExpenseService {
    pub async fn fetch(tx: &mut TenantTx, tenant_id: Uuid, id: Uuid) -> ServiceResult<Expense> {
        let sql = format!("{} WHERE e.id = $1 AND e.tenant_id = $2 AND e.deleted_at IS NULL", SELECT_EXPENSE);
        sqlx::query_as::<_, Expense>(&sql)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| ApiError::not_found("Expense not found"))
    }

    pub async fn get(principal: &Principal, id: Uuid) -> ServiceResult<Expense> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let expense = Self::fetch(&mut tx, principal.tenant_id, id).await?;
        tx.commit().await?;
        Ok(expense)
    }

    pub async fn list(principal: &Principal, query: &ExpenseQuery) -> ServiceResult<Page<Expense>> {
        let started = Instant::now();
        let page = query.page_request();
        let sql = ListSql::build(principal.tenant_id, query)?;
        let order = sql.order_sql(&page)?;
        let where_sql = sql.where_sql();

        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;

        let count_sql = format!("SELECT COUNT(*) FROM expenses e WHERE {}", where_sql);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        for p in &sql.params {
            count = count.bind(p);
        }
        let total = count.fetch_one(&mut *tx).await?;

        let list_sql = format!(
            "{} WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
            SELECT_EXPENSE,
            where_sql,
            order,
            page.limit(),
            page.offset()
        );
        let mut rows = sqlx::query_as::<_, Expense>(&list_sql);
        for p in &sql.params {
            rows = rows.bind(p);
        }
        let content = rows.fetch_all(&mut *tx).await?;
        tx.commit().await?;

        DatabaseManager::observe("expenses.list", started);
        Ok(Page::new(content, &page, total))
    }

    pub async fn create(principal: &Principal, input: ExpenseInput) -> ServiceResult<Expense> {
        validate_expense(&input)?;
        let tenant_id = principal.tenant_id;
        let mut tx = DatabaseManager::tenant_tx(tenant_id).await?;
        DatabaseManager::lock_ledger(&mut tx, tenant_id).await?;

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO expenses
                (tenant_id, date, category, description, income_amount, expense_amount, memo, case_reference, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(input.date)
        .bind(input.category.trim())
        .bind(input.description.trim())
        .bind(input.income_amount)
        .bind(input.expense_amount)
        .bind(&input.memo)
        .bind(&input.case_reference)
        .bind(&principal.subject)
        .fetch_one(&mut *tx)
        .await?;

        TagService::replace_expense_tags(&mut tx, tenant_id, id, &input.tag_ids).await?;
        AttachmentService::link_many(&mut tx, tenant_id, id, &input.attachment_ids).await?;
        LedgerService::recalculate_from(&mut tx, tenant_id, Some(input.date)).await?;

        let expense = Self::fetch(&mut tx, tenant_id, id).await?;
        tx.commit().await?;
        tracing::info!(tenant = %tenant_id, expense = %id, "Expense created");
        Ok(expense)
    }

    /// Full replace guarded by `version`
    pub async fn update(principal: &Principal, id: Uuid, input: ExpenseInput) -> ServiceResult<Expense> {
        let version = require_version(input.version)?;
        validate_expense(&input)?;
        let tenant_id = principal.tenant_id;
        let mut tx = DatabaseManager::tenant_tx(tenant_id).await?;
        DatabaseManager::lock_ledger(&mut tx, tenant_id).await?;

        let previous_date = sqlx::query_scalar::<_, Option<NaiveDate>>(
            r#"
            WITH old AS (
                SELECT date FROM expenses WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            )
            UPDATE expenses SET
                date = $4, category = $5, description = $6, income_amount = $7, expense_amount = $8,
                memo = $9, case_reference = $10, updated_by = $11, updated_at = now(), version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL AND version = $3
            RETURNING (SELECT date FROM old)
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(version)
        .bind(input.date)
        .bind(input.category.trim())
        .bind(input.description.trim())
        .bind(input.income_amount)
        .bind(input.expense_amount)
        .bind(&input.memo)
        .bind(&input.case_reference)
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?
        .flatten();

        let Some(previous_date) = previous_date else {
            return Err(stale_or_missing(&mut tx, "expenses", id, "Expense").await);
        };

        TagService::replace_expense_tags(&mut tx, tenant_id, id, &input.tag_ids).await?;
        AttachmentService::link_many(&mut tx, tenant_id, id, &input.attachment_ids).await?;
        LedgerService::recalculate_from(&mut tx, tenant_id, Some(previous_date.min(input.date))).await?;

        let expense = Self::fetch(&mut tx, tenant_id, id).await?;
        tx.commit().await?;
        Ok(expense)
    }

    /// Soft delete
    pub async fn delete(principal: &Principal, id: Uuid) -> ServiceResult<()> {
        let tenant_id = principal.tenant_id;
        let mut tx = DatabaseManager::tenant_tx(tenant_id).await?;
        DatabaseManager::lock_ledger(&mut tx, tenant_id).await?;

        let date: NaiveDate = sqlx::query_scalar(
            r#"
            UPDATE expenses SET deleted_at = now(), updated_at = now(), updated_by = $3, version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            RETURNING date
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Expense not found"))?;

        LedgerService::recalculate_from(&mut tx, tenant_id, Some(date)).await?;
        tx.commit().await?;
        tracing::info!(tenant = %tenant_id, expense = %id, "Expense deleted");
        Ok(())
    }

    pub async fn restore(principal: &Principal, id: Uuid) -> ServiceResult<Expense> {
        let tenant_id = principal.tenant_id;
        let mut tx = DatabaseManager::tenant_tx(tenant_id).await?;
        DatabaseManager::lock_ledger(&mut tx, tenant_id).await?;

        let date: NaiveDate = sqlx::query_scalar(
            r#"
            UPDATE expenses SET deleted_at = NULL, updated_at = now(), updated_by = $3, version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NOT NULL
            RETURNING date
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("No deleted expense with this id"))?;

        LedgerService::recalculate_from(&mut tx, tenant_id, Some(date)).await?;
        let expense = Self::fetch(&mut tx, tenant_id, id).await?;
        tx.commit().await?;
        Ok(expense)
    }

    /// Replace the tag set of an expense
    pub async fn set_tags(principal: &Principal, id: Uuid, tag_ids: &[Uuid]) -> ServiceResult<Expense> {
        let tenant_id = principal.tenant_id;
        let mut tx = DatabaseManager::tenant_tx(tenant_id).await?;
        let touched = sqlx::query(
            "UPDATE expenses SET version = version + 1, updated_at = now(), updated_by = $3 WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(&principal.subject)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if touched == 0 {
            return Err(ApiError::not_found("Expense not found"));
        }

        TagService::replace_expense_tags(&mut tx, tenant_id, id, tag_ids).await?;
        let expense = Self::fetch(&mut tx, tenant_id, id).await?;
        tx.commit().await?;
        Ok(expense)
    }

    /// CSV of every expense matching `query`, in ledger order
    pub async fn export_csv(principal: &Principal, query: &ExpenseQuery) -> ServiceResult<Vec<u8>> {
        let sql = ListSql::build(principal.tenant_id, query)?;
        let select = format!(
            "{} WHERE {} ORDER BY e.date, e.created_at, e.id",
            SELECT_EXPENSE,
            sql.where_sql()
        );

        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(EXPORT_HEADER).map_err(csv_error)?;

        {
            let mut q = sqlx::query_as::<_, Expense>(&select);
            for p in &sql.params {
                q = q.bind(p);
            }
            let mut rows = q.fetch(&mut *tx);
            while let Some(expense) = rows.try_next().await? {
                writer.write_record(export_row(&expense)).map_err(csv_error)?;
            }
        }
        tx.commit().await?;

        writer
            .into_inner()
            .map_err(|e| ApiError::internal_server_error(format!("CSV export failed: {}", e)))
    }
}

pub const EXPORT_HEADER: [&str; 9] = [
    "date",
    "category",
    "description",
    "income_amount",
    "expense_amount",
    "balance",
    "memo",
    "case_reference",
    "id",
];

pub fn export_row(e: &Expense) -> [String; 9] {
    [
        e.date.to_string(),
        e.category.clone(),
        e.description.clone(),
        e.income_amount.to_string(),
        e.expense_amount.to_string(),
        e.balance.to_string(),
        e.memo.clone().unwrap_or_default(),
        e.case_reference.clone().unwrap_or_default(),
        e.id.to_string(),
    ]
}

fn csv_error(e: csv::Error) -> ApiError {
    tracing::error!("CSV export failed: {}", e);
    ApiError::internal_server_error("CSV export failed")
}
