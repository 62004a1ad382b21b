use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Expense {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub date: NaiveDate,
    pub category: String,
    pub description: String,
    pub income_amount: Decimal,
    pub expense_amount: Decimal,
    pub balance: Decimal,
    pub memo: Option<String>,
    pub case_reference: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Populated by `array_agg` in the select, not a column
    #[sqlx(default)]
    pub tag_ids: Vec<Uuid>,
    #[sqlx(default)]
    pub attachment_ids: Vec<Uuid>,
}

/// Body of POST /expenses and PUT /expenses/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseInput {
    pub date: NaiveDate,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub income_amount: Decimal,
    #[serde(default)]
    pub expense_amount: Decimal,
    pub memo: Option<String>,
    pub case_reference: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    /// Temporary attachments to link on save
    #[serde(default)]
    pub attachment_ids: Vec<Uuid>,
    /// Required on update
    pub version: Option<i32>,
}

/// Slice of a ledger row needed to recompute balances
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub income_amount: Decimal,
    pub expense_amount: Decimal,
}
