use serde_json::Value;

use super::error::FilterError;
use super::types::{FieldResolver, FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    /// Accepts `"date desc, category"`, `["date desc", "category"]`
    /// or `{"date": "desc", "category": "asc"}`
    pub fn parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::Null => Ok(vec![]),
            Value::String(s) => Ok(Self::parse_order_string(s)),
            Value::Array(arr) => {
                let mut out = Vec::new();
                for v in arr {
                    match v {
                        Value::String(s) => out.extend(Self::parse_order_string(s)),
                        _ => return Err(FilterError::InvalidWhereClause("order entries must be strings".to_string())),
                    }
                }
                Ok(out)
            }
            Value::Object(obj) => Ok(obj
                .iter()
                .map(|(k, v)| FilterOrderInfo {
                    field: k.clone(),
                    sort: Self::direction(v.as_str().unwrap_or("asc")),
                })
                .collect()),
            _ => Err(FilterError::InvalidWhereClause("order must be a string, array or object".to_string())),
        }
    }

    fn parse_order_string(s: &str) -> Vec<FilterOrderInfo> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let mut it = part.split_whitespace();
            if let Some(col) = it.next() {
                out.push(FilterOrderInfo {
                    field: col.to_string(),
                    sort: Self::direction(it.next().unwrap_or("asc")),
                });
            }
        }
        out
    }

    fn direction(s: &str) -> SortDirection {
        if s.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    /// Render `ORDER BY` terms (without the keyword); `tiebreak` is appended
    /// so pagination stays stable.
    pub fn generate(
        infos: &[FilterOrderInfo],
        resolver: &dyn FieldResolver,
        tiebreak: &str,
    ) -> Result<String, FilterError> {
        let mut parts = Vec::with_capacity(infos.len() + 1);
        for info in infos {
            let resolved = resolver.resolve(&info.field)?;
            if !resolved.sortable {
                return Err(FilterError::NotSortable(info.field.clone()));
            }
            parts.push(format!("{} {} NULLS LAST", resolved.expr, info.sort.to_sql()));
        }
        parts.push(tiebreak.to_string());
        Ok(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::resolvers::ColumnResolver;
    use crate::filter::types::SqlCast;
    use serde_json::json;

    #[test]
    fn parses_all_forms() {
        let a = FilterOrder::parse(&json!("date desc, category")).unwrap();
        let b = FilterOrder::parse(&json!(["date DESC", "category"])).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].sort, SortDirection::Desc);
        assert_eq!(a[1].sort, SortDirection::Asc);

        let c = FilterOrder::parse(&json!({"date": "desc"})).unwrap();
        assert_eq!(c[0].field, "date");
    }

    #[test]
    fn generates_with_tiebreak() {
        let r = ColumnResolver::new(&[("date", "date", SqlCast::Date)]);
        let order = FilterOrder::parse(&json!("date desc")).unwrap();
        let sql = FilterOrder::generate(&order, &r, "\"id\" ASC").unwrap();
        assert_eq!(sql, "\"date\" DESC NULLS LAST, \"id\" ASC");

        let bad = FilterOrder::parse(&json!("secret")).unwrap();
        assert!(FilterOrder::generate(&bad, &r, "\"id\" ASC").is_err());
    }
}
