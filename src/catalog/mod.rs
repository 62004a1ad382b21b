//! Property-type catalog for flexible tables.
//!
//! The catalog itself (labels, widths, filter operators, allowed type
//! conversions) is data, embedded from `property_types.yaml`. Value shapes are
//! enforced in [`values`].

pub mod values;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use values::{convert_value, validate_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Title,
    Text,
    Number,
    Checkbox,
    Date,
    Select,
    MultiSelect,
    Person,
    Url,
    Email,
    Phone,
    File,
    Relation,
    CreatedTime,
    UpdatedTime,
    CreatedBy,
}

impl PropertyType {
    pub fn key(&self) -> &'static str {
        match self {
            PropertyType::Title => "title",
            PropertyType::Text => "text",
            PropertyType::Number => "number",
            PropertyType::Checkbox => "checkbox",
            PropertyType::Date => "date",
            PropertyType::Select => "select",
            PropertyType::MultiSelect => "multi_select",
            PropertyType::Person => "person",
            PropertyType::Url => "url",
            PropertyType::Email => "email",
            PropertyType::Phone => "phone",
            PropertyType::File => "file",
            PropertyType::Relation => "relation",
            PropertyType::CreatedTime => "created_time",
            PropertyType::UpdatedTime => "updated_time",
            PropertyType::CreatedBy => "created_by",
        }
    }

    pub fn entry(&self) -> &'static CatalogEntry {
        catalog().entry(*self)
    }

    pub fn is_read_only(&self) -> bool {
        self.entry().read_only
    }

    /// Column backing a system property, if this is one
    pub fn system_column(&self) -> Option<&'static str> {
        match self {
            PropertyType::CreatedTime => Some("created_at"),
            PropertyType::UpdatedTime => Some("updated_at"),
            PropertyType::CreatedBy => Some("created_by"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Datetime,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Basic,
    Advanced,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: PropertyType,
    pub label: String,
    pub category: TypeCategory,
    pub value_kind: ValueKind,
    pub default_width: u16,
    pub requires_options: bool,
    pub read_only: bool,
    pub sortable: bool,
    pub operators: Vec<String>,
    pub convertible_to: Vec<PropertyType>,
}

impl CatalogEntry {
    pub fn can_convert_to(&self, target: PropertyType) -> bool {
        self.key == target || self.convertible_to.contains(&target)
    }
}

#[derive(Debug)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    fn load() -> Self {
        let entries: Vec<CatalogEntry> = serde_yaml::from_str(include_str!("property_types.yaml"))
            .expect("embedded property type catalog must parse");
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn entry(&self, key: PropertyType) -> &CatalogEntry {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .expect("every property type has a catalog entry")
    }
}

static CATALOG: Lazy<Catalog> = Lazy::new(Catalog::load);

pub fn catalog() -> &'static Catalog {
    &CATALOG
}

/// Pinned column side in table views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_database_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
}

/// One column of a flexible table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: PropertyOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<PinSide>,
    #[serde(default)]
    pub hidden: bool,
}

impl PropertyDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            property_type,
            required: false,
            options: PropertyOptions::default(),
            width: None,
            pinned: None,
            hidden: false,
        }
    }

    pub fn effective_width(&self) -> u16 {
        self.width.unwrap_or(self.property_type.entry().default_width)
    }

    pub fn has_choice(&self, id: &str) -> bool {
        self.options.choices.iter().any(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_is_in_catalog() {
        use PropertyType::*;
        for t in [
            Title, Text, Number, Checkbox, Date, Select, MultiSelect, Person, Url, Email, Phone, File, Relation,
            CreatedTime, UpdatedTime, CreatedBy,
        ] {
            assert_eq!(catalog().entry(t).key, t);
        }
        assert_eq!(catalog().entries().len(), 16);
    }

    #[test]
    fn system_types_are_read_only() {
        assert!(PropertyType::CreatedTime.is_read_only());
        assert!(PropertyType::CreatedBy.is_read_only());
        assert!(!PropertyType::Text.is_read_only());
        assert_eq!(PropertyType::UpdatedTime.system_column(), Some("updated_at"));
    }

    #[test]
    fn conversions_follow_catalog() {
        assert!(PropertyType::Select.entry().can_convert_to(PropertyType::MultiSelect));
        assert!(PropertyType::Text.entry().can_convert_to(PropertyType::Number));
        assert!(!PropertyType::File.entry().can_convert_to(PropertyType::Text));
        assert!(PropertyType::File.entry().can_convert_to(PropertyType::File));
    }

    #[test]
    fn definition_deserializes_with_defaults() {
        let def: PropertyDefinition =
            serde_json::from_value(serde_json::json!({"id": "status", "name": "Status", "type": "select"})).unwrap();
        assert_eq!(def.property_type, PropertyType::Select);
        assert!(!def.required);
        assert_eq!(def.effective_width(), 160);
        assert!(def.options.choices.is_empty());
    }
}
