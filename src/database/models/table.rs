use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::catalog::{PinSide, PropertyDefinition, PropertyOptions, PropertyType};

/// User-defined table ("database") whose rows are JSONB records
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FlexDatabase {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub properties: Json<Vec<PropertyDefinition>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FlexDatabase {
    pub fn property(&self, id: &str) -> Option<&PropertyDefinition> {
        self.properties.0.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct FlexRecordRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub database_id: Uuid,
    pub properties: Value,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Record as returned to clients, with system properties filled in
#[derive(Debug, Clone, Serialize)]
pub struct FlexRecord {
    pub id: Uuid,
    pub database_id: Uuid,
    pub properties: Map<String, Value>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseInput {
    pub workspace_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseUpdate {
    pub title: String,
    pub description: Option<String>,
    pub version: i32,
}

/// Partial update of one property definition; absent fields stay unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub property_type: Option<PropertyType>,
    pub required: Option<bool>,
    pub options: Option<PropertyOptions>,
    pub width: Option<u16>,
    /// `Some(None)` unpins
    #[serde(default, deserialize_with = "double_option")]
    pub pinned: Option<Option<PinSide>>,
    pub hidden: Option<bool>,
    pub version: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddPropertyInput {
    pub property: PropertyDefinition,
    pub version: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderInput {
    pub order: Vec<String>,
    pub version: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordInput {
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Required on patch
    pub version: Option<i32>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
