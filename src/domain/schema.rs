//! Rules for flexible-table schemas and the records stored under them.

use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::catalog::{validate_value, PropertyDefinition, PropertyType};
use crate::database::models::table::{FlexRecord, FlexRecordRow, PropertyPatch};
use crate::validation::ValidationErrors;

pub const MIN_WIDTH: u16 = 40;
pub const MAX_WIDTH: u16 = 1000;
const MAX_ID_LEN: usize = 40;
const MAX_NAME_LEN: usize = 100;

pub fn is_valid_property_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Prepend a `name` title property when the schema has none, then validate
pub fn normalize_schema(mut properties: Vec<PropertyDefinition>) -> Result<Vec<PropertyDefinition>, ValidationErrors> {
    if !properties.iter().any(|p| p.property_type == PropertyType::Title) {
        let mut id = "name".to_string();
        let mut n = 1;
        while properties.iter().any(|p| p.id == id) {
            n += 1;
            id = format!("name_{}", n);
        }
        let mut title = PropertyDefinition::new(id, "Name", PropertyType::Title);
        title.required = true;
        properties.insert(0, title);
    }
    validate_schema(&properties)?;
    Ok(properties)
}

pub fn validate_schema(properties: &[PropertyDefinition]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let titles = properties.iter().filter(|p| p.property_type == PropertyType::Title).count();
    if titles != 1 {
        errors.add("properties", format!("Exactly one title property is required, found {}", titles));
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for def in properties {
        let field = format!("properties.{}", def.id);
        if !is_valid_property_id(&def.id) {
            errors.add(&field, "Property id must be 1-40 characters of a-z, 0-9 or _");
        }
        if !ids.insert(def.id.as_str()) {
            errors.add(&field, "Duplicate property id");
        }
        let name = def.name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            errors.add(&field, format!("Property name must be 1-{} characters", MAX_NAME_LEN));
        } else if !names.insert(name.to_lowercase()) {
            errors.add(&field, format!("Duplicate property name '{}'", name));
        }
        if let Err(msg) = validate_definition(def) {
            errors.add(&field, msg);
        }
    }

    errors.into_result()
}

/// Checks that depend on a single definition only
pub fn validate_definition(def: &PropertyDefinition) -> Result<(), String> {
    if let Some(width) = def.width {
        if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
            return Err(format!("Width must be between {} and {}", MIN_WIDTH, MAX_WIDTH));
        }
    }

    let entry = def.property_type.entry();
    if entry.requires_options {
        let choices = &def.options.choices;
        if choices.is_empty() {
            return Err("At least one option is required".to_string());
        }
        let mut seen = HashSet::new();
        for choice in choices {
            if choice.id.trim().is_empty() || choice.name.trim().is_empty() {
                return Err("Options need an id and a name".to_string());
            }
            if !seen.insert(choice.id.as_str()) {
                return Err(format!("Duplicate option id '{}'", choice.id));
            }
        }
    }

    if def.property_type == PropertyType::Relation && def.options.related_database_id.is_none() {
        return Err("Relation properties need options.related_database_id".to_string());
    }
    if def.required && def.property_type.is_read_only() {
        return Err("Read-only properties cannot be required".to_string());
    }
    Ok(())
}

/// Outcome of applying a [`PropertyPatch`]
#[derive(Debug, Clone, PartialEq)]
pub struct PatchedProperty {
    pub definition: PropertyDefinition,
    /// Set when the type changed and stored values must be converted
    pub converted_from: Option<PropertyType>,
}

pub fn apply_property_patch(current: &PropertyDefinition, patch: &PropertyPatch) -> Result<PatchedProperty, ValidationErrors> {
    let mut def = current.clone();
    let mut converted_from = None;

    if let Some(name) = &patch.name {
        def.name = name.clone();
    }
    if let Some(new_type) = patch.property_type {
        if new_type != current.property_type {
            if current.property_type == PropertyType::Title || new_type == PropertyType::Title {
                let mut errors = ValidationErrors::new();
                errors.add("type", "The title property's type cannot change");
                return Err(errors);
            }
            if !current.property_type.entry().can_convert_to(new_type) {
                let mut errors = ValidationErrors::new();
                errors.add(
                    "type",
                    format!("Cannot convert {} to {}", current.property_type.key(), new_type.key()),
                );
                return Err(errors);
            }
            def.property_type = new_type;
            converted_from = Some(current.property_type);
        }
    }
    if let Some(required) = patch.required {
        def.required = required;
    }
    if let Some(options) = &patch.options {
        def.options = options.clone();
    }
    if let Some(width) = patch.width {
        def.width = Some(width);
    }
    if let Some(pinned) = patch.pinned {
        def.pinned = pinned;
    }
    if let Some(hidden) = patch.hidden {
        def.hidden = hidden;
    }

    Ok(PatchedProperty { definition: def, converted_from })
}

/// Merge `patch` into `existing` (or an empty record), validating every
/// touched key and the required properties of the result.
pub fn merge_record(
    properties: &[PropertyDefinition],
    existing: Option<&Map<String, Value>>,
    patch: &Map<String, Value>,
) -> Result<Map<String, Value>, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut merged = existing.cloned().unwrap_or_default();

    for (key, value) in patch {
        let field = format!("properties.{}", key);
        let Some(def) = properties.iter().find(|p| &p.id == key) else {
            errors.add(&field, "Unknown property");
            continue;
        };
        if def.property_type.is_read_only() {
            errors.add(&field, "Property is read-only");
            continue;
        }
        if value.is_null() {
            merged.remove(key);
            continue;
        }
        match validate_value(def, value) {
            Ok(()) => {
                merged.insert(key.clone(), value.clone());
            }
            Err(msg) => errors.add(&field, msg),
        }
    }

    for def in properties.iter().filter(|p| p.required && !p.property_type.is_read_only()) {
        let field = format!("properties.{}", def.id);
        if errors.contains(&field) {
            continue;
        }
        let missing = match merged.get(&def.id) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            _ => false,
        };
        if missing {
            errors.add(&field, "This property is required");
        }
    }

    errors.into_result()?;
    Ok(merged)
}

/// Client view of a stored record with system properties computed from columns
pub fn present_record(properties: &[PropertyDefinition], row: FlexRecordRow) -> FlexRecord {
    let mut values = match row.properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    // Drop keys whose property has since been removed
    values.retain(|k, _| properties.iter().any(|p| &p.id == k));

    for def in properties {
        let computed = match def.property_type {
            PropertyType::CreatedTime => Some(Value::String(row.created_at.to_rfc3339())),
            PropertyType::UpdatedTime => Some(Value::String(row.updated_at.to_rfc3339())),
            PropertyType::CreatedBy => Some(Value::String(row.created_by.clone())),
            _ => None,
        };
        if let Some(v) = computed {
            values.insert(def.id.clone(), v);
        }
    }

    FlexRecord {
        id: row.id,
        database_id: row.database_id,
        properties: values,
        version: row.version,
        created_at: row.created_at,
        created_by: row.created_by,
        updated_at: row.updated_at,
        updated_by: row.updated_by,
    }
}

/// Order `properties` by `order`, which must name every property exactly once
pub fn reorder(properties: &[PropertyDefinition], order: &[String]) -> Result<Vec<PropertyDefinition>, ValidationErrors> {
    let unique: HashSet<&str> = order.iter().map(String::as_str).collect();
    if order.len() != properties.len() || unique.len() != order.len() {
        let mut errors = ValidationErrors::new();
        errors.add("order", "Order must list every property id exactly once");
        return Err(errors);
    }
    let mut out = Vec::with_capacity(order.len());
    for id in order {
        match properties.iter().find(|p| &p.id == id) {
            Some(def) => out.push(def.clone()),
            None => {
                let mut errors = ValidationErrors::new();
                errors.add("order", format!("Unknown property '{}'", id));
                return Err(errors);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PinSide, PropertyOptions, SelectOption};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn status() -> PropertyDefinition {
        let mut def = PropertyDefinition::new("status", "Status", PropertyType::Select);
        def.options = PropertyOptions {
            choices: vec![SelectOption { id: "open".into(), name: "Open".into(), color: None }],
            ..Default::default()
        };
        def
    }

    fn schema() -> Vec<PropertyDefinition> {
        normalize_schema(vec![
            status(),
            PropertyDefinition::new("fee", "Fee", PropertyType::Number),
            PropertyDefinition::new("created", "Created", PropertyType::CreatedTime),
        ])
        .unwrap()
    }

    #[test]
    fn title_is_added_when_missing() {
        let props = schema();
        assert_eq!(props[0].id, "name");
        assert_eq!(props[0].property_type, PropertyType::Title);
        assert!(props[0].required);
    }

    #[test]
    fn schema_rules() {
        let mut props = schema();
        props.push(PropertyDefinition::new("Bad-Id", "Bad", PropertyType::Text));
        props.push(PropertyDefinition::new("fee2", "fee", PropertyType::Number));
        props.push(PropertyDefinition::new("matter", "Matter", PropertyType::Relation));
        props.push(PropertyDefinition::new("kind", "Kind", PropertyType::Select));
        let mut narrow = PropertyDefinition::new("narrow", "Narrow", PropertyType::Text);
        narrow.width = Some(10);
        props.push(narrow);
        props.push(PropertyDefinition::new("title2", "Second title", PropertyType::Title));

        let errors = validate_schema(&props).unwrap_err();
        for field in [
            "properties",
            "properties.Bad-Id",
            "properties.fee2",
            "properties.matter",
            "properties.kind",
            "properties.narrow",
        ] {
            assert!(errors.contains(field), "missing error for {}", field);
        }
    }

    #[test]
    fn record_merge() {
        let props = schema();
        let created = merge_record(&props, None, json!({"name": "Smith v Jones", "fee": 120}).as_object().unwrap()).unwrap();

        let patched = merge_record(&props, Some(&created), json!({"fee": null, "status": "open"}).as_object().unwrap()).unwrap();
        assert_eq!(patched.get("fee"), None);
        assert_eq!(patched.get("status"), Some(&json!("open")));
        assert_eq!(patched.get("name"), Some(&json!("Smith v Jones")));
    }

    #[test]
    fn record_rejections() {
        let props = schema();
        let errors = merge_record(
            &props,
            None,
            json!({"status": "closed", "created": "2024-01-01", "ghost": 1}).as_object().unwrap(),
        )
        .unwrap_err();
        assert!(errors.contains("properties.status"));
        assert!(errors.contains("properties.created"));
        assert!(errors.contains("properties.ghost"));
        assert!(errors.contains("properties.name"));
    }

    #[test]
    fn property_patch() {
        let fee = PropertyDefinition::new("fee", "Fee", PropertyType::Number);
        let patch = PropertyPatch {
            property_type: Some(PropertyType::Text),
            pinned: Some(Some(PinSide::Left)),
            width: Some(300),
            version: 1,
            ..Default::default()
        };
        let out = apply_property_patch(&fee, &patch).unwrap();
        assert_eq!(out.converted_from, Some(PropertyType::Number));
        assert_eq!(out.definition.pinned, Some(PinSide::Left));

        let to_relation = PropertyPatch { property_type: Some(PropertyType::Relation), version: 1, ..Default::default() };
        assert!(apply_property_patch(&fee, &to_relation).is_err());

        let title = PropertyDefinition::new("name", "Name", PropertyType::Title);
        let retitle = PropertyPatch { property_type: Some(PropertyType::Text), version: 1, ..Default::default() };
        assert!(apply_property_patch(&title, &retitle).is_err());
    }

    #[test]
    fn presents_system_properties() {
        let props = schema();
        let now = Utc::now();
        let row = FlexRecordRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            database_id: Uuid::new_v4(),
            properties: json!({"name": "A", "removed": 1}),
            version: 1,
            created_at: now,
            created_by: "auth0|1".into(),
            updated_at: now,
            updated_by: "auth0|1".into(),
            deleted_at: None,
        };
        let record = present_record(&props, row);
        assert_eq!(record.properties.get("created"), Some(&json!(now.to_rfc3339())));
        assert!(!record.properties.contains_key("removed"));
    }

    #[test]
    fn reorder_requires_every_id() {
        let props = schema();
        let ids: Vec<String> = props.iter().rev().map(|p| p.id.clone()).collect();
        let out = reorder(&props, &ids).unwrap();
        assert_eq!(out[0].id, "created");
        assert!(reorder(&props, &ids[1..]).is_err());
    }
}
