use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Unknown field: {0}")]
    InvalidColumn(String),

    #[error("Invalid WHERE clause: {0}")]
    InvalidWhereClause(String),

    #[error("Unsupported operator {operator} for field {field}")]
    UnsupportedOperator { field: String, operator: String },

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Field {0} cannot be sorted")]
    NotSortable(String),

    #[error("Filter nesting exceeds maximum depth of {0}")]
    TooDeep(u32),
}
