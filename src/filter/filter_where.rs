use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{FieldResolver, FieldShape, FilterOp, ResolvedField, SqlCast, SqlResult};

/// Compiles a JSON where-clause into a parameterized SQL predicate.
///
/// ```text
/// { "status": "open", "fee": { "$gte": 100 }, "$or": [ {..}, {..} ] }
/// ```
pub struct FilterWhere<'r> {
    resolver: &'r dyn FieldResolver,
    params: Vec<Option<String>>,
    param_offset: usize,
    max_depth: u32,
}

impl<'r> FilterWhere<'r> {
    pub fn new(resolver: &'r dyn FieldResolver, param_offset: usize, max_depth: u32) -> Self {
        Self {
            resolver,
            params: vec![],
            param_offset,
            max_depth,
        }
    }

    /// Generate a predicate whose placeholders start at `$param_offset + 1`
    pub fn generate(
        where_data: &Value,
        resolver: &'r dyn FieldResolver,
        param_offset: usize,
        max_depth: u32,
    ) -> Result<SqlResult, FilterError> {
        let mut builder = Self::new(resolver, param_offset, max_depth);
        let query = builder.build(where_data, 0)?;
        Ok(SqlResult { query, params: builder.params })
    }

    fn build(&mut self, where_data: &Value, depth: u32) -> Result<String, FilterError> {
        if depth > self.max_depth {
            return Err(FilterError::TooDeep(self.max_depth));
        }
        match where_data {
            Value::Null => Ok("TRUE".to_string()),
            Value::Object(obj) => self.build_object(obj, depth),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn build_object(&mut self, obj: &Map<String, Value>, depth: u32) -> Result<String, FilterError> {
        let mut parts = Vec::new();
        for (key, value) in obj {
            if key.starts_with('$') {
                parts.push(self.build_logical(key, value, depth)?);
            } else {
                parts.extend(self.build_field(key, value)?);
            }
        }
        Ok(match parts.len() {
            0 => "TRUE".to_string(),
            1 => parts.remove(0),
            _ => parts.join(" AND "),
        })
    }

    fn build_logical(&mut self, op: &str, value: &Value, depth: u32) -> Result<String, FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires an array", op)))?;
                if arr.is_empty() {
                    return Ok(if op == "$and" { "TRUE" } else { "FALSE" }.to_string());
                }
                let mut parts = Vec::with_capacity(arr.len());
                for v in arr {
                    parts.push(format!("({})", self.build(v, depth + 1)?));
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                Ok(format!("({})", parts.join(joiner)))
            }
            "$not" => Ok(format!("NOT ({})", self.build(value, depth + 1)?)),
            other => Err(FilterError::InvalidWhereClause(format!("Unknown logical operator {}", other))),
        }
    }

    fn build_field(&mut self, field: &str, value: &Value) -> Result<Vec<String>, FilterError> {
        let resolved = self.resolver.resolve(field)?;

        match value {
            Value::Object(ops) => {
                let mut out = Vec::with_capacity(ops.len());
                for (op_key, op_val) in ops {
                    let operator = FilterOp::parse(op_key).ok_or_else(|| FilterError::UnsupportedOperator {
                        field: field.to_string(),
                        operator: op_key.clone(),
                    })?;
                    out.push(self.build_condition(field, &resolved, operator, op_val)?);
                }
                Ok(out)
            }
            // Implicit equality: { field: value }
            _ => Ok(vec![self.build_condition(field, &resolved, FilterOp::Eq, value)?]),
        }
    }

    fn build_condition(
        &mut self,
        field: &str,
        resolved: &ResolvedField,
        op: FilterOp,
        data: &Value,
    ) -> Result<String, FilterError> {
        let unsupported = || FilterError::UnsupportedOperator {
            field: field.to_string(),
            operator: op.key().to_string(),
        };
        if let Some(allowed) = &resolved.operators {
            // Implicit equality on a null value is a null check
            let effective = if op == FilterOp::Eq && data.is_null() { FilterOp::Null } else { op };
            if !allowed.iter().any(|a| a == effective.key()) {
                return Err(unsupported());
            }
        }

        let expr = &resolved.expr;
        let cast = match resolved.shape {
            FieldShape::Scalar(cast) => cast,
            FieldShape::List => {
                return match op {
                    FilterOp::Contains => {
                        let p = self.param(data, SqlCast::Text)?;
                        Ok(format!("({} ? {})", expr, p))
                    }
                    FilterOp::Null => Ok(Self::null_check(expr, data)?),
                    _ => Err(unsupported()),
                };
            }
        };

        match op {
            FilterOp::Eq if data.is_null() => Ok(format!("{} IS NULL", expr)),
            FilterOp::Ne if data.is_null() => Ok(format!("{} IS NOT NULL", expr)),
            FilterOp::Eq => Ok(format!("{} = {}", expr, self.param(data, cast)?)),
            FilterOp::Ne => Ok(format!("{} IS DISTINCT FROM {}", expr, self.param(data, cast)?)),
            FilterOp::Gt => Ok(format!("{} > {}", expr, self.param(data, cast)?)),
            FilterOp::Gte => Ok(format!("{} >= {}", expr, self.param(data, cast)?)),
            FilterOp::Lt => Ok(format!("{} < {}", expr, self.param(data, cast)?)),
            FilterOp::Lte => Ok(format!("{} <= {}", expr, self.param(data, cast)?)),
            FilterOp::Like | FilterOp::ILike => {
                if cast != SqlCast::Text {
                    return Err(unsupported());
                }
                let keyword = if op == FilterOp::Like { "LIKE" } else { "ILIKE" };
                Ok(format!("{} {} {}", expr, keyword, self.param(data, cast)?))
            }
            FilterOp::Contains => {
                if cast != SqlCast::Text {
                    return Err(unsupported());
                }
                Ok(format!("position({} in {}) > 0", self.param(data, cast)?, expr))
            }
            FilterOp::In | FilterOp::NIn => {
                let values = data
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires an array", op.key())))?;
                if values.is_empty() {
                    return Ok(if op == FilterOp::In { "FALSE" } else { "TRUE" }.to_string());
                }
                let placeholders = values
                    .iter()
                    .map(|v| self.param(v, cast))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(", ");
                if op == FilterOp::In {
                    Ok(format!("{} IN ({})", expr, placeholders))
                } else {
                    Ok(format!("({} IS NULL OR {} NOT IN ({}))", expr, expr, placeholders))
                }
            }
            FilterOp::Between => match data.as_array() {
                Some(values) if values.len() == 2 => {
                    let lo = self.param(&values[0], cast)?;
                    let hi = self.param(&values[1], cast)?;
                    Ok(format!("{} BETWEEN {} AND {}", expr, lo, hi))
                }
                _ => Err(FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string())),
            },
            FilterOp::Null => Self::null_check(expr, data),
        }
    }

    fn null_check(expr: &str, data: &Value) -> Result<String, FilterError> {
        match data.as_bool() {
            Some(true) => Ok(format!("{} IS NULL", expr)),
            Some(false) => Ok(format!("{} IS NOT NULL", expr)),
            None => Err(FilterError::InvalidOperatorData("$null requires true or false".to_string())),
        }
    }

    fn param(&mut self, value: &Value, cast: SqlCast) -> Result<String, FilterError> {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => {
                return Err(FilterError::InvalidOperatorData("null is only valid with $eq, $ne or $null".to_string()))
            }
            _ => return Err(FilterError::InvalidOperatorData("expected a scalar value".to_string())),
        };
        if !cast.accepts(&text) {
            return Err(FilterError::InvalidOperatorData(format!("'{}' is not a valid {}", text, cast.as_sql())));
        }
        self.params.push(Some(text));
        Ok(format!("${}::{}", self.param_offset + self.params.len(), cast.as_sql()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::resolvers::ColumnResolver;
    use crate::filter::types::SqlCast;
    use serde_json::json;

    fn resolver() -> ColumnResolver {
        ColumnResolver::new(&[
            ("name", "name", SqlCast::Text),
            ("amount", "amount", SqlCast::Numeric),
            ("date", "date", SqlCast::Date),
        ])
    }

    #[test]
    fn implicit_equality_and_offsets() {
        let r = resolver();
        let sql = FilterWhere::generate(&json!({"name": "Filing fee"}), &r, 2, 5).unwrap();
        assert_eq!(sql.query, "\"name\" = $3::text");
        assert_eq!(sql.params, vec![Some("Filing fee".to_string())]);
    }

    #[test]
    fn operators_bind_in_order() {
        let r = resolver();
        let sql = FilterWhere::generate(&json!({"amount": {"$between": [10, 20]}}), &r, 0, 5).unwrap();
        assert_eq!(sql.query, "\"amount\" BETWEEN $1::numeric AND $2::numeric");
        assert_eq!(sql.params, vec![Some("10".into()), Some("20".into())]);
    }

    #[test]
    fn logical_operators_nest() {
        let r = resolver();
        let where_data = json!({"$or": [{"name": {"$ilike": "%court%"}}, {"amount": {"$gt": 100}}]});
        let sql = FilterWhere::generate(&where_data, &r, 0, 5).unwrap();
        assert_eq!(sql.query, "((\"name\" ILIKE $1::text) OR (\"amount\" > $2::numeric))");
        assert_eq!(sql.params.len(), 2);
    }

    #[test]
    fn null_and_empty_in() {
        let r = resolver();
        let sql = FilterWhere::generate(&json!({"name": null, "amount": {"$in": []}}), &r, 0, 5).unwrap();
        // keys iterate in sorted order
        assert_eq!(sql.query, "FALSE AND \"name\" IS NULL");
        assert!(sql.params.is_empty());
    }

    #[test]
    fn rejects_unknown_fields_and_operators() {
        let r = resolver();
        assert!(matches!(
            FilterWhere::generate(&json!({"password": "x"}), &r, 0, 5),
            Err(FilterError::InvalidColumn(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&json!({"amount": {"$regex": "x"}}), &r, 0, 5),
            Err(FilterError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            FilterWhere::generate(&json!({"amount": {"$like": "1%"}}), &r, 0, 5),
            Err(FilterError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn values_must_cast_to_the_field_type() {
        let r = resolver();
        for bad in [
            json!({"date": "not-a-date"}),
            json!({"amount": {"$gt": "abc"}}),
            json!({"amount": {"$in": [1, "two"]}}),
            json!({"date": {"$between": ["2024-01-01", "2024-13-40"]}}),
        ] {
            assert!(
                matches!(FilterWhere::generate(&bad, &r, 0, 5), Err(FilterError::InvalidOperatorData(_))),
                "{}",
                bad
            );
        }
        let ok = FilterWhere::generate(&json!({"date": {"$gte": "2024-02-29"}, "amount": "12.50"}), &r, 0, 5);
        assert!(ok.is_ok());
    }

    #[test]
    fn enforces_depth() {
        let r = resolver();
        let deep = json!({"$not": {"$not": {"$not": {"name": "x"}}}});
        assert!(matches!(FilterWhere::generate(&deep, &r, 0, 2), Err(FilterError::TooDeep(2))));
        assert!(FilterWhere::generate(&deep, &r, 0, 3).is_ok());
    }
}
