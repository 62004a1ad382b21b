use serde::Deserialize;
use serde_json::Value;
use sqlx::types::Json;
use std::time::Instant;
use uuid::Uuid;

use super::workspace::WorkspaceService;
use super::{require_version, stale_or_missing, ServiceResult};
use crate::auth::Principal;
use crate::catalog::{convert_value, PropertyDefinition, PropertyType};
use crate::config;
use crate::database::models::table::{
    AddPropertyInput, DatabaseInput, DatabaseUpdate, FlexDatabase, FlexRecord, FlexRecordRow, PropertyPatch,
    RecordInput, ReorderInput,
};
use crate::database::{DatabaseManager, TenantTx};
use crate::domain::schema::{
    apply_property_patch, merge_record, normalize_schema, present_record, reorder, validate_definition, validate_schema,
    PatchedProperty,
};
use crate::error::ApiError;
use crate::filter::{FilterOrder, FilterWhere, PropertyResolver};
use crate::types::{Page, PageRequest};
use crate::validation::ValidationErrors;

/// Query string of `GET /databases/{id}/records`
#[derive(Debug, Default, Deserialize)]
pub struct RecordQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
    /// JSON where-clause over property ids
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
}

impl RecordQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest { page: self.page, size: self.size, sort: self.sort.clone() }
    }
}

fn validate_metadata(title: &str, description: Option<&str>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    errors.require_length("title", title, 1, 200);
    errors.optional_length("description", description, 2000);
    errors.into_result()
}

/// Predicate and parameters for a record listing. Parameters are text and
/// numbered from `$1`; the tenant and database ids come first.
fn record_filter(properties: &[PropertyDefinition], tenant_id: Uuid, database_id: Uuid, query: &RecordQuery) -> ServiceResult<(String, Vec<Option<String>>, String)> {
    let resolver = PropertyResolver::new(properties);
    let mut params = vec![Some(tenant_id.to_string()), Some(database_id.to_string())];
    let mut where_sql = "\"tenant_id\" = $1::uuid AND \"database_id\" = $2::uuid AND \"deleted_at\" IS NULL".to_string();

    if let Some(raw) = query.where_clause.as_deref().filter(|w| !w.trim().is_empty()) {
        let where_data: Value =
            serde_json::from_str(raw).map_err(|e| ApiError::field_error("where", format!("Invalid JSON: {}", e)))?;
        let filter = FilterWhere::generate(&where_data, &resolver, params.len(), config::config().filter.max_nested_depth)?;
        if config::config().filter.debug_logging {
            tracing::debug!(sql = %filter.query, "Record filter");
        }
        where_sql.push_str(&format!(" AND ({})", filter.query));
        params.extend(filter.params);
    }

    let order_sql = match query.page_request().order() {
        Some(order) => FilterOrder::generate(&FilterOrder::parse(&order)?, &resolver, "\"created_at\" ASC, \"id\" ASC")?,
        None => "\"created_at\" ASC, \"id\" ASC".to_string(),
    };
    Ok((where_sql, params, order_sql))
}

/// What a property change does to the values already stored under its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoredValues {
    Keep,
    Convert,
    /// The property became computed from a system column
    Strip,
}

fn stored_value_action(current: &PropertyDefinition, patched: &PatchedProperty) -> StoredValues {
    let target = patched.definition.property_type;
    if target.system_column().is_some() {
        return if current.property_type.system_column().is_none() { StoredValues::Strip } else { StoredValues::Keep };
    }
    let options_changed = patched.definition.options != current.options && target.entry().requires_options;
    if patched.converted_from.is_some() || options_changed {
        StoredValues::Convert
    } else {
        StoredValues::Keep
    }
}

/// Values of `def` that need rewriting after a schema change, as
/// `(record id, new value)`; `Null` means the key is dropped.
fn converted_values(def: &PropertyDefinition, rows: &[(Uuid, Value)]) -> Vec<(Uuid, Value)> {
    rows.iter()
        .filter_map(|(id, old)| {
            let new = convert_value(def, old);
            (&new != old).then_some((*id, new))
        })
        .collect()
}

pub struct TableService;

impl TableService {
    pub(crate) async fn fetch_database(tx: &mut TenantTx, tenant_id: Uuid, id: Uuid) -> ServiceResult<FlexDatabase> {
        sqlx::query_as::<_, FlexDatabase>(
            "SELECT * FROM databases WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Database not found"))
    }

    /// Lock the database row so schema and record writes see one schema
    /// Schema read for record writes; holds off schema changes until commit
    async fn share_database(tx: &mut TenantTx, tenant_id: Uuid, id: Uuid) -> ServiceResult<FlexDatabase> {
        sqlx::query_as::<_, FlexDatabase>(
            "SELECT * FROM databases WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL FOR SHARE",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Database not found"))
    }

    async fn strip_property(tx: &mut TenantTx, tenant_id: Uuid, database_id: Uuid, property_id: &str) -> ServiceResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE records SET properties = properties - $3, version = version + 1
            WHERE database_id = $1 AND tenant_id = $2 AND properties ? $3
            "#,
        )
        .bind(database_id)
        .bind(tenant_id)
        .bind(property_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn lock_database(tx: &mut TenantTx, tenant_id: Uuid, id: Uuid) -> ServiceResult<FlexDatabase> {
        sqlx::query_as::<_, FlexDatabase>(
            "SELECT * FROM databases WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Database not found"))
    }

    async fn save_schema(
        tx: &mut TenantTx,
        principal: &Principal,
        id: Uuid,
        version: i32,
        properties: &[PropertyDefinition],
    ) -> ServiceResult<FlexDatabase> {
        let saved = sqlx::query_as::<_, FlexDatabase>(
            r#"
            UPDATE databases SET properties = $4, updated_by = $5, updated_at = now(), version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND version = $3 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(version)
        .bind(Json(properties))
        .bind(&principal.subject)
        .fetch_optional(&mut **tx)
        .await?;
        match saved {
            Some(db) => Ok(db),
            None => Err(stale_or_missing(tx, "databases", id, "Database").await),
        }
    }

    // Databases

    pub async fn list_databases(principal: &Principal, workspace_id: Option<Uuid>) -> ServiceResult<Vec<FlexDatabase>> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let rows = sqlx::query_as::<_, FlexDatabase>(
            r#"
            SELECT * FROM databases
            WHERE tenant_id = $1 AND deleted_at IS NULL AND ($2::uuid IS NULL OR workspace_id = $2)
            ORDER BY lower(title), id
            "#,
        )
        .bind(principal.tenant_id)
        .bind(workspace_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rows)
    }

    pub async fn get_database(principal: &Principal, id: Uuid) -> ServiceResult<FlexDatabase> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let db = Self::fetch_database(&mut tx, principal.tenant_id, id).await?;
        tx.commit().await?;
        Ok(db)
    }

    pub async fn create_database(principal: &Principal, input: DatabaseInput) -> ServiceResult<FlexDatabase> {
        validate_metadata(&input.title, input.description.as_deref())?;
        let properties = normalize_schema(input.properties)?;

        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        WorkspaceService::fetch(&mut tx, principal.tenant_id, input.workspace_id)
            .await
            .map_err(|_| ApiError::field_error("workspace_id", "Unknown workspace"))?;

        let db = sqlx::query_as::<_, FlexDatabase>(
            r#"
            INSERT INTO databases (tenant_id, workspace_id, title, description, properties, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(principal.tenant_id)
        .bind(input.workspace_id)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(Json(&properties))
        .bind(&principal.subject)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::info!(tenant = %principal.tenant_id, database = %db.id, properties = properties.len(), "Database created");
        Ok(db)
    }

    pub async fn update_database(principal: &Principal, id: Uuid, input: DatabaseUpdate) -> ServiceResult<FlexDatabase> {
        validate_metadata(&input.title, input.description.as_deref())?;
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let db = sqlx::query_as::<_, FlexDatabase>(
            r#"
            UPDATE databases SET title = $4, description = $5, updated_by = $6, updated_at = now(), version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND version = $3 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(input.version)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(db) = db else {
            return Err(stale_or_missing(&mut tx, "databases", id, "Database").await);
        };
        tx.commit().await?;
        Ok(db)
    }

    /// Soft delete of the database and all of its records
    pub async fn delete_database(principal: &Principal, id: Uuid) -> ServiceResult<()> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let deleted = sqlx::query(
            r#"
            UPDATE databases SET deleted_at = now(), updated_at = now(), updated_by = $3, version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(&principal.subject)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if deleted == 0 {
            return Err(ApiError::not_found("Database not found"));
        }

        let records = sqlx::query(
            "UPDATE records SET deleted_at = now(), updated_by = $3 WHERE database_id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(&principal.subject)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        tracing::info!(tenant = %principal.tenant_id, database = %id, records, "Database deleted");
        Ok(())
    }

    // Schema

    pub async fn add_property(principal: &Principal, database_id: Uuid, input: AddPropertyInput) -> ServiceResult<FlexDatabase> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let db = Self::lock_database(&mut tx, principal.tenant_id, database_id).await?;

        if input.property.property_type == PropertyType::Title {
            return Err(ApiError::field_error("type", "A database has exactly one title property"));
        }
        let mut properties = db.properties.0.clone();
        properties.push(input.property);
        validate_schema(&properties)?;

        let db = Self::save_schema(&mut tx, principal, database_id, input.version, &properties).await?;
        tx.commit().await?;
        Ok(db)
    }

    /// Patch one property. A type change, or new options on a select type,
    /// rewrites the stored values through the catalog conversion.
    pub async fn update_property(
        principal: &Principal,
        database_id: Uuid,
        property_id: &str,
        patch: PropertyPatch,
    ) -> ServiceResult<FlexDatabase> {
        let started = Instant::now();
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let db = Self::lock_database(&mut tx, principal.tenant_id, database_id).await?;
        let current = db
            .property(property_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("Property '{}' not found", property_id)))?;

        let patched = apply_property_patch(&current, &patch)?;
        validate_definition(&patched.definition).map_err(|msg| ApiError::field_error(format!("properties.{}", property_id), msg))?;

        let properties: Vec<PropertyDefinition> = db
            .properties
            .0
            .iter()
            .map(|p| if p.id == property_id { patched.definition.clone() } else { p.clone() })
            .collect();
        validate_schema(&properties)?;

        let action = stored_value_action(&current, &patched);
        let db = Self::save_schema(&mut tx, principal, database_id, patch.version, &properties).await?;

        if action == StoredValues::Strip {
            let stripped = Self::strip_property(&mut tx, principal.tenant_id, database_id, property_id).await?;
            tracing::info!(database = %database_id, property = property_id, stripped, "Dropped values of computed property");
        }
        if action == StoredValues::Convert {
            let rows: Vec<(Uuid, Value)> = sqlx::query_as(
                r#"
                SELECT id, properties -> $3 FROM records
                WHERE database_id = $1 AND tenant_id = $2 AND deleted_at IS NULL AND properties ? $3
                "#,
            )
            .bind(database_id)
            .bind(principal.tenant_id)
            .bind(property_id)
            .fetch_all(&mut *tx)
            .await?;

            let changes = converted_values(&patched.definition, &rows);
            for (record_id, value) in &changes {
                sqlx::query(
                    r#"
                    UPDATE records
                    SET properties = CASE WHEN $4::jsonb = 'null'::jsonb THEN properties - $3
                                          ELSE properties || jsonb_build_object($3::text, $4::jsonb) END,
                        version = version + 1
                    WHERE id = $1 AND tenant_id = $2
                    "#,
                )
                .bind(record_id)
                .bind(principal.tenant_id)
                .bind(property_id)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            }
            tracing::info!(
                tenant = %principal.tenant_id,
                database = %database_id,
                property = property_id,
                from = patched.converted_from.map(|t| t.key()).unwrap_or(current.property_type.key()),
                to = patched.definition.property_type.key(),
                rewritten = changes.len(),
                "Converted property values"
            );
        }

        tx.commit().await?;
        DatabaseManager::observe("databases.update_property", started);
        Ok(db)
    }

    /// Remove a property and strip its key from every record
    pub async fn remove_property(principal: &Principal, database_id: Uuid, property_id: &str, version: i32) -> ServiceResult<FlexDatabase> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let db = Self::lock_database(&mut tx, principal.tenant_id, database_id).await?;
        let current = db
            .property(property_id)
            .ok_or_else(|| ApiError::not_found(format!("Property '{}' not found", property_id)))?;
        if current.property_type == PropertyType::Title {
            return Err(ApiError::conflict("The title property cannot be removed"));
        }

        let properties: Vec<PropertyDefinition> = db.properties.0.iter().filter(|p| p.id != property_id).cloned().collect();
        let db = Self::save_schema(&mut tx, principal, database_id, version, &properties).await?;
        Self::strip_property(&mut tx, principal.tenant_id, database_id, property_id).await?;
        tx.commit().await?;
        Ok(db)
    }

    pub async fn reorder_properties(principal: &Principal, database_id: Uuid, input: ReorderInput) -> ServiceResult<FlexDatabase> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let db = Self::lock_database(&mut tx, principal.tenant_id, database_id).await?;
        let properties = reorder(&db.properties.0, &input.order)?;
        let db = Self::save_schema(&mut tx, principal, database_id, input.version, &properties).await?;
        tx.commit().await?;
        Ok(db)
    }

    // Records

    async fn fetch_record(tx: &mut TenantTx, tenant_id: Uuid, id: Uuid) -> ServiceResult<FlexRecordRow> {
        sqlx::query_as::<_, FlexRecordRow>(
            "SELECT * FROM records WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Record not found"))
    }

    pub async fn list_records(principal: &Principal, database_id: Uuid, query: &RecordQuery) -> ServiceResult<Page<FlexRecord>> {
        let started = Instant::now();
        let page = query.page_request();
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let db = Self::fetch_database(&mut tx, principal.tenant_id, database_id).await?;
        let (where_sql, params, order_sql) = record_filter(&db.properties.0, principal.tenant_id, database_id, query)?;

        let count_sql = format!("SELECT COUNT(*) FROM records WHERE {}", where_sql);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        for p in &params {
            count = count.bind(p);
        }
        let total = count.fetch_one(&mut *tx).await?;

        let list_sql = format!(
            "SELECT * FROM records WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
            where_sql,
            order_sql,
            page.limit(),
            page.offset()
        );
        let mut rows = sqlx::query_as::<_, FlexRecordRow>(&list_sql);
        for p in &params {
            rows = rows.bind(p);
        }
        let rows = rows.fetch_all(&mut *tx).await?;
        tx.commit().await?;

        DatabaseManager::observe("records.list", started);
        let content = rows.into_iter().map(|row| present_record(&db.properties.0, row)).collect();
        Ok(Page::new(content, &page, total))
    }

    pub async fn get_record(principal: &Principal, id: Uuid) -> ServiceResult<FlexRecord> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let row = Self::fetch_record(&mut tx, principal.tenant_id, id).await?;
        let db = Self::fetch_database(&mut tx, principal.tenant_id, row.database_id).await?;
        tx.commit().await?;
        Ok(present_record(&db.properties.0, row))
    }

    pub async fn create_record(principal: &Principal, database_id: Uuid, input: RecordInput) -> ServiceResult<FlexRecord> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let db = Self::share_database(&mut tx, principal.tenant_id, database_id).await?;
        let values = merge_record(&db.properties.0, None, &input.properties)?;

        let row = sqlx::query_as::<_, FlexRecordRow>(
            r#"
            INSERT INTO records (tenant_id, database_id, properties, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING *
            "#,
        )
        .bind(principal.tenant_id)
        .bind(database_id)
        .bind(Value::Object(values))
        .bind(&principal.subject)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(present_record(&db.properties.0, row))
    }

    /// Merge `input.properties` into the record; `null` removes a key
    pub async fn patch_record(principal: &Principal, id: Uuid, input: RecordInput) -> ServiceResult<FlexRecord> {
        let version = require_version(input.version)?;
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let database_id = Self::fetch_record(&mut tx, principal.tenant_id, id).await?.database_id;
        let db = Self::share_database(&mut tx, principal.tenant_id, database_id).await?;
        // Re-read once the schema is pinned so a concurrent conversion is seen
        let row = Self::fetch_record(&mut tx, principal.tenant_id, id).await?;
        if row.version != version {
            return Err(ApiError::stale_version("Record"));
        }
        let existing = row.properties.as_object();
        let values = merge_record(&db.properties.0, existing, &input.properties)?;

        let row = sqlx::query_as::<_, FlexRecordRow>(
            r#"
            UPDATE records SET properties = $4, updated_by = $5, updated_at = now(), version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND version = $3 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(version)
        .bind(Value::Object(values))
        .bind(&principal.subject)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(stale_or_missing(&mut tx, "records", id, "Record").await);
        };
        tx.commit().await?;
        Ok(present_record(&db.properties.0, row))
    }

    pub async fn delete_record(principal: &Principal, id: Uuid) -> ServiceResult<()> {
        let mut tx = DatabaseManager::tenant_tx(principal.tenant_id).await?;
        let deleted = sqlx::query(
            r#"
            UPDATE records SET deleted_at = now(), updated_at = now(), updated_by = $3, version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(principal.tenant_id)
        .bind(&principal.subject)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if deleted == 0 {
            return Err(ApiError::not_found("Record not found"));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PropertyOptions, SelectOption};
    use serde_json::json;

    fn schema() -> Vec<PropertyDefinition> {
        let mut stage = PropertyDefinition::new("stage", "Stage", PropertyType::Select);
        stage.options = PropertyOptions {
            choices: vec![
                SelectOption { id: "open".into(), name: "Open".into(), color: None },
                SelectOption { id: "closed".into(), name: "Closed".into(), color: None },
            ],
            ..Default::default()
        };
        vec![
            PropertyDefinition::new("name", "Name", PropertyType::Title),
            PropertyDefinition::new("fee", "Fee", PropertyType::Number),
            stage,
        ]
    }

    fn query(sort: Option<&str>, where_clause: Option<&str>) -> RecordQuery {
        RecordQuery {
            page: None,
            size: None,
            sort: sort.map(str::to_string),
            where_clause: where_clause.map(str::to_string),
        }
    }

    #[test]
    fn record_filter_numbers_after_scope_params() {
        let (tenant, database) = (Uuid::new_v4(), Uuid::new_v4());
        let (where_sql, params, order) =
            record_filter(&schema(), tenant, database, &query(Some("fee,desc"), Some(r#"{"fee": {"$gte": 100}}"#))).unwrap();
        assert!(where_sql.contains("(\"properties\" ->> 'fee')::numeric >= $3::numeric"), "{}", where_sql);
        assert_eq!(params.len(), 3);
        assert_eq!(params[1].as_deref(), Some(database.to_string().as_str()));
        assert_eq!(params[2].as_deref(), Some("100"));
        assert!(order.starts_with("(\"properties\" ->> 'fee')::numeric DESC NULLS LAST"), "{}", order);
    }

    #[test]
    fn record_filter_defaults_to_insertion_order() {
        let (_, params, order) = record_filter(&schema(), Uuid::new_v4(), Uuid::new_v4(), &query(None, None)).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(order, "\"created_at\" ASC, \"id\" ASC");
    }

    #[test]
    fn record_filter_rejects_unknown_property() {
        let err = record_filter(&schema(), Uuid::new_v4(), Uuid::new_v4(), &query(None, Some(r#"{"nope": 1}"#)))
            .err()
            .unwrap();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn conversion_rewrites_only_changed_values() {
        let target = PropertyDefinition::new("fee", "Fee", PropertyType::Number);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let rows = vec![(a, json!("42")), (b, json!(7)), (c, json!("n/a"))];
        let changes = converted_values(&target, &rows);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], (a, json!(42.0)));
        assert_eq!(changes[1], (c, Value::Null));
    }

    #[test]
    fn stored_values_follow_the_patch() {
        let text = PropertyDefinition::new("note", "Note", PropertyType::Text);
        let patched = |def: PropertyDefinition, from: Option<PropertyType>| PatchedProperty { definition: def, converted_from: from };

        let stamped = patched(PropertyDefinition::new("note", "Note", PropertyType::CreatedTime), Some(PropertyType::Text));
        assert_eq!(stored_value_action(&text, &stamped), StoredValues::Strip);

        let number = patched(PropertyDefinition::new("note", "Note", PropertyType::Number), Some(PropertyType::Text));
        assert_eq!(stored_value_action(&text, &number), StoredValues::Convert);

        let renamed = patched(PropertyDefinition::new("note", "Memo", PropertyType::Text), None);
        assert_eq!(stored_value_action(&text, &renamed), StoredValues::Keep);

        let stage = schema().remove(2);
        let mut narrowed = stage.clone();
        narrowed.options.choices.truncate(1);
        assert_eq!(stored_value_action(&stage, &patched(narrowed, None)), StoredValues::Convert);
    }

    #[test]
    fn dropped_choice_is_cleared() {
        let mut stage = schema().remove(2);
        stage.options.choices.retain(|c| c.id == "open");
        let id = Uuid::new_v4();
        let changes = converted_values(&stage, &[(id, json!("closed")), (Uuid::new_v4(), json!("open"))]);
        assert_eq!(changes, vec![(id, Value::Null)]);
    }
}
