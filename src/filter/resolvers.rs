use crate::catalog::{PropertyDefinition, ValueKind};

use super::error::FilterError;
use super::types::{FieldResolver, FieldShape, ResolvedField, SqlCast};

/// Whitelist of table columns exposed to filters
pub struct ColumnResolver {
    columns: Vec<(String, String, SqlCast)>,
}

impl ColumnResolver {
    /// `(field, column, cast)` triples
    pub fn new(columns: &[(&str, &str, SqlCast)]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(f, c, t)| (f.to_string(), c.to_string(), *t))
                .collect(),
        }
    }
}

impl FieldResolver for ColumnResolver {
    fn resolve(&self, field: &str) -> Result<ResolvedField, FilterError> {
        self.columns
            .iter()
            .find(|(f, _, _)| f == field)
            .map(|(_, column, cast)| ResolvedField {
                expr: format!("\"{}\"", column),
                shape: FieldShape::Scalar(*cast),
                operators: None,
                sortable: true,
            })
            .ok_or_else(|| FilterError::InvalidColumn(field.to_string()))
    }
}

/// Resolves flexible-table property ids to JSONB expressions on `properties`
pub struct PropertyResolver<'a> {
    properties: &'a [PropertyDefinition],
}

impl<'a> PropertyResolver<'a> {
    pub fn new(properties: &'a [PropertyDefinition]) -> Self {
        Self { properties }
    }
}

impl<'a> FieldResolver for PropertyResolver<'a> {
    fn resolve(&self, field: &str) -> Result<ResolvedField, FilterError> {
        let def = self
            .properties
            .iter()
            .find(|p| p.id == field)
            .ok_or_else(|| FilterError::InvalidColumn(field.to_string()))?;
        let entry = def.property_type.entry();

        // Property ids are restricted to [a-z0-9_], safe to inline as a JSON key
        let (expr, shape) = if let Some(column) = def.property_type.system_column() {
            let cast = match entry.value_kind {
                ValueKind::Datetime => SqlCast::Timestamptz,
                _ => SqlCast::Text,
            };
            (format!("\"{}\"", column), FieldShape::Scalar(cast))
        } else {
            match entry.value_kind {
                ValueKind::String => (format!("(\"properties\" ->> '{}')", def.id), FieldShape::Scalar(SqlCast::Text)),
                ValueKind::Number => (
                    format!("(\"properties\" ->> '{}')::numeric", def.id),
                    FieldShape::Scalar(SqlCast::Numeric),
                ),
                ValueKind::Boolean => (
                    format!("(\"properties\" ->> '{}')::boolean", def.id),
                    FieldShape::Scalar(SqlCast::Boolean),
                ),
                ValueKind::Datetime => (
                    format!("(\"properties\" ->> '{}')::timestamptz", def.id),
                    FieldShape::Scalar(SqlCast::Timestamptz),
                ),
                ValueKind::List => (format!("(\"properties\" -> '{}')", def.id), FieldShape::List),
            }
        };

        Ok(ResolvedField {
            expr,
            shape,
            operators: Some(entry.operators.clone()),
            sortable: entry.sortable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PropertyType;
    use crate::filter::FilterWhere;
    use serde_json::json;

    fn schema() -> Vec<PropertyDefinition> {
        vec![
            PropertyDefinition::new("name", "Name", PropertyType::Title),
            PropertyDefinition::new("fee", "Fee", PropertyType::Number),
            PropertyDefinition::new("labels", "Labels", PropertyType::MultiSelect),
            PropertyDefinition::new("created", "Created", PropertyType::CreatedTime),
        ]
    }

    #[test]
    fn number_property_casts() {
        let props = schema();
        let r = PropertyResolver::new(&props);
        let sql = FilterWhere::generate(&json!({"fee": {"$gte": 100}}), &r, 1, 5).unwrap();
        assert_eq!(sql.query, "(\"properties\" ->> 'fee')::numeric >= $2::numeric");
    }

    #[test]
    fn list_property_uses_containment() {
        let props = schema();
        let r = PropertyResolver::new(&props);
        let sql = FilterWhere::generate(&json!({"labels": {"$contains": "urgent"}}), &r, 0, 5).unwrap();
        assert_eq!(sql.query, "((\"properties\" -> 'labels') ? $1::text)");
        assert!(FilterWhere::generate(&json!({"labels": "urgent"}), &r, 0, 5).is_err());
    }

    #[test]
    fn system_properties_map_to_columns() {
        let props = schema();
        let r = PropertyResolver::new(&props);
        let field = r.resolve("created").unwrap();
        assert_eq!(field.expr, "\"created_at\"");
        assert!(r.resolve("missing").is_err());
    }

    #[test]
    fn catalog_restricts_operators() {
        let props = schema();
        let r = PropertyResolver::new(&props);
        assert!(FilterWhere::generate(&json!({"fee": {"$ilike": "1%"}}), &r, 0, 5).is_err());
        assert!(FilterWhere::generate(&json!({"name": {"$ilike": "%smith%"}}), &r, 0, 5).is_ok());
    }
}
