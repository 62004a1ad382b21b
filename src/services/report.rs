use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ledger::LedgerService;
use super::ServiceResult;
use crate::auth::Principal;
use crate::database::DatabaseManager;
use crate::error::ApiError;

/// Inclusive date range; open ends are unbounded
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ReportRange {
    fn check(&self) -> ServiceResult<()> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(ApiError::field_error("from", "Must not be after 'to'")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyQuery {
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub opening_balance: Decimal,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net: Decimal,
    pub closing_balance: Decimal,
    pub entry_count: i64,
}

impl Summary {
    pub fn new(range: &ReportRange, opening_balance: Decimal, totals: Totals) -> Self {
        let net = totals.income - totals.expense;
        Self {
            from: range.from,
            to: range.to,
            opening_balance,
            total_income: totals.income,
            total_expense: totals.expense,
            net,
            closing_balance: opening_balance + net,
            entry_count: totals.count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, FromRow)]
pub struct Totals {
    pub income: Decimal,
    pub expense: Decimal,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthRow {
    pub month: u32,
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
    pub count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct MonthTotals {
    pub month: i32,
    pub income: Decimal,
    pub expense: Decimal,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CategoryRow {
    pub category: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TagRow {
    pub tag_id: Uuid,
    pub name: String,
    pub color: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub count: i64,
}

/// Twelve rows, months without entries reported as zero
pub fn zero_fill(rows: &[MonthTotals]) -> Vec<MonthRow> {
    (1..=12u32)
        .map(|month| {
            let found = rows.iter().find(|r| r.month == month as i32);
            let (income, expense, count) = found.map_or((Decimal::ZERO, Decimal::ZERO, 0), |r| (r.income, r.expense, r.count));
            MonthRow { month, income, expense, net: income - expense, count }
        })
        .collect()
}

fn year_bounds(year: i32) -> ServiceResult<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year, 12, 31);
    match (start, end) {
        (Some(s), Some(e)) if (1900..=9999).contains(&s.year()) => Ok((s, e)),
        _ => Err(ApiError::field_error("year", "Invalid year")),
    }
}

const RANGE: &str = "e.tenant_id = $1 AND e.deleted_at IS NULL AND ($2::date IS NULL OR e.date >= $2) AND ($3::date IS NULL OR e.date <= $3)";

pub struct ReportService;

impl ReportService {
    pub async fn summary(principal: &Principal, range: &ReportRange) -> ServiceResult<Summary> {
        range.check()?;
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let opening = match range.from {
            Some(from) => LedgerService::opening_balance(&mut tx, principal.tenant_id, from).await?,
            None => Decimal::ZERO,
        };
        let totals = sqlx::query_as::<_, Totals>(&format!(
            r#"
            SELECT COALESCE(SUM(e.income_amount), 0) AS income,
                   COALESCE(SUM(e.expense_amount), 0) AS expense,
                   COUNT(*) AS count
            FROM expenses e WHERE {}
            "#,
            RANGE
        ))
        .bind(principal.tenant_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Summary::new(range, opening, totals))
    }

    pub async fn monthly(principal: &Principal, year: i32) -> ServiceResult<Vec<MonthRow>> {
        let (start, end) = year_bounds(year)?;
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let rows = sqlx::query_as::<_, MonthTotals>(&format!(
            r#"
            SELECT EXTRACT(MONTH FROM e.date)::int AS month,
                   SUM(e.income_amount) AS income,
                   SUM(e.expense_amount) AS expense,
                   COUNT(*) AS count
            FROM expenses e WHERE {}
            GROUP BY 1 ORDER BY 1
            "#,
            RANGE
        ))
        .bind(principal.tenant_id)
        .bind(start)
        .bind(end)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(zero_fill(&rows))
    }

    pub async fn categories(principal: &Principal, range: &ReportRange) -> ServiceResult<Vec<CategoryRow>> {
        range.check()?;
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let rows = sqlx::query_as::<_, CategoryRow>(&format!(
            r#"
            SELECT e.category,
                   SUM(e.income_amount) AS income,
                   SUM(e.expense_amount) AS expense,
                   COUNT(*) AS count
            FROM expenses e WHERE {}
            GROUP BY e.category
            ORDER BY SUM(e.expense_amount) DESC, e.category
            "#,
            RANGE
        ))
        .bind(principal.tenant_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Totals per tag; an expense with several tags counts under each
    pub async fn tags(principal: &Principal, range: &ReportRange) -> ServiceResult<Vec<TagRow>> {
        range.check()?;
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let rows = sqlx::query_as::<_, TagRow>(&format!(
            r#"
            SELECT t.id AS tag_id, t.name, t.color,
                   SUM(e.income_amount) AS income,
                   SUM(e.expense_amount) AS expense,
                   COUNT(*) AS count
            FROM expenses e
            JOIN expense_tags et ON et.expense_id = e.id
            JOIN tags t ON t.id = et.tag_id AND t.deleted_at IS NULL
            WHERE {}
            GROUP BY t.id, t.name, t.color
            ORDER BY SUM(e.expense_amount) DESC, lower(t.name)
            "#,
            RANGE
        ))
        .bind(principal.tenant_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn summary_closes_from_opening_and_net() {
        let range = ReportRange { from: NaiveDate::from_ymd_opt(2024, 4, 1), to: NaiveDate::from_ymd_opt(2024, 4, 30) };
        let totals = Totals { income: dec("1500.00"), expense: dec("420.50"), count: 7 };
        let summary = Summary::new(&range, dec("100.00"), totals);
        assert_eq!(summary.net, dec("1079.50"));
        assert_eq!(summary.closing_balance, dec("1179.50"));
        assert_eq!(summary.entry_count, 7);
    }

    #[test]
    fn months_without_entries_are_zero() {
        let rows = vec![
            MonthTotals { month: 2, income: dec("10"), expense: dec("3"), count: 2 },
            MonthTotals { month: 11, income: dec("0"), expense: dec("8"), count: 1 },
        ];
        let months = zero_fill(&rows);
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].count, 0);
        assert_eq!(months[0].net, Decimal::ZERO);
        assert_eq!(months[1].net, dec("7"));
        assert_eq!(months[10].net, dec("-8"));
        assert_eq!(months.iter().map(|m| m.month).collect::<Vec<_>>(), (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let range = ReportRange { from: NaiveDate::from_ymd_opt(2024, 5, 1), to: NaiveDate::from_ymd_opt(2024, 4, 1) };
        assert_eq!(range.check().unwrap_err().status_code(), 400);
        assert!(year_bounds(2024).is_ok());
        assert!(year_bounds(1200).is_err());
    }
}
