use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::error::FilterError;

/// Where-clause operators accepted in JSON filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    In,
    NIn,
    Between,
    Contains,
    Null,
}

impl FilterOp {
    pub fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            "$contains" => FilterOp::Contains,
            "$null" => FilterOp::Null,
            _ => return None,
        })
    }

    pub fn key(&self) -> &'static str {
        match self {
            FilterOp::Eq => "$eq",
            FilterOp::Ne => "$ne",
            FilterOp::Gt => "$gt",
            FilterOp::Gte => "$gte",
            FilterOp::Lt => "$lt",
            FilterOp::Lte => "$lte",
            FilterOp::Like => "$like",
            FilterOp::ILike => "$ilike",
            FilterOp::In => "$in",
            FilterOp::NIn => "$nin",
            FilterOp::Between => "$between",
            FilterOp::Contains => "$contains",
            FilterOp::Null => "$null",
        }
    }
}

/// Postgres type a bound text parameter is cast to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlCast {
    Text,
    Numeric,
    Boolean,
    Date,
    Timestamptz,
    Uuid,
}

impl SqlCast {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlCast::Text => "text",
            SqlCast::Numeric => "numeric",
            SqlCast::Boolean => "boolean",
            SqlCast::Date => "date",
            SqlCast::Timestamptz => "timestamptz",
            SqlCast::Uuid => "uuid",
        }
    }

    /// Whether Postgres will accept `text` cast to this type
    pub fn accepts(&self, text: &str) -> bool {
        let text = text.trim();
        match self {
            SqlCast::Text => true,
            SqlCast::Numeric => {
                Decimal::from_str(text).is_ok() || Decimal::from_scientific(text).is_ok()
            }
            SqlCast::Boolean => matches!(text, "true" | "false"),
            SqlCast::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok(),
            SqlCast::Timestamptz => {
                DateTime::parse_from_rfc3339(text).is_ok()
                    || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
                    || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").is_ok()
                    || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
            }
            SqlCast::Uuid => Uuid::parse_str(text).is_ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// Comparable value of the given type
    Scalar(SqlCast),
    /// JSONB array of strings; supports `$contains`
    List,
}

/// SQL expression a filter field maps to
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub expr: String,
    pub shape: FieldShape,
    /// Restricts operators; `None` allows every operator valid for the shape
    pub operators: Option<Vec<String>>,
    pub sortable: bool,
}

/// Maps client field names onto SQL expressions. Anything it does not
/// resolve is rejected, which keeps identifiers out of the generated SQL.
pub trait FieldResolver {
    fn resolve(&self, field: &str) -> Result<ResolvedField, FilterError>;
}

/// Filter body accepted by list endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterData {
    #[serde(rename = "where")]
    pub where_clause: Option<serde_json::Value>,
    pub order: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub field: String,
    pub sort: SortDirection,
}

/// Generated SQL plus its positional text parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Option<String>>,
}
