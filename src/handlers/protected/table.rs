// Flexible tables: databases, their property schema, and records.
use axum::{extract::Path, Extension};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::database::models::table::{
    AddPropertyInput, DatabaseInput, DatabaseUpdate, FlexDatabase, FlexRecord, PropertyPatch, RecordInput,
    ReorderInput,
};
use crate::handlers::{ApiJson, ApiQuery};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::table::{RecordQuery, TableService};
use crate::types::Page;

#[derive(Debug, Default, Deserialize)]
pub struct DatabaseQuery {
    pub workspace_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: i32,
}

pub async fn list_databases(
    Extension(principal): Extension<Principal>,
    ApiQuery(query): ApiQuery<DatabaseQuery>,
) -> ApiResult<Vec<FlexDatabase>> {
    principal.require(Permission::TableRead)?;
    Ok(ApiResponse::success(TableService::list_databases(&principal, query.workspace_id).await?))
}

pub async fn get_database(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<FlexDatabase> {
    principal.require(Permission::TableRead)?;
    Ok(ApiResponse::success(TableService::get_database(&principal, id).await?))
}

pub async fn create_database(
    Extension(principal): Extension<Principal>,
    ApiJson(input): ApiJson<DatabaseInput>,
) -> ApiResult<FlexDatabase> {
    principal.require(Permission::TableAdmin)?;
    Ok(ApiResponse::created(TableService::create_database(&principal, input).await?))
}

pub async fn update_database(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<DatabaseUpdate>,
) -> ApiResult<FlexDatabase> {
    principal.require(Permission::TableAdmin)?;
    Ok(ApiResponse::success(TableService::update_database(&principal, id, input).await?))
}

pub async fn delete_database(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<()> {
    principal.require(Permission::TableAdmin)?;
    TableService::delete_database(&principal, id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/v1/databases/:id/properties
pub async fn add_property(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<AddPropertyInput>,
) -> ApiResult<FlexDatabase> {
    principal.require(Permission::TableAdmin)?;
    Ok(ApiResponse::success(TableService::add_property(&principal, id, input).await?))
}

/// PATCH /api/v1/databases/:id/properties/:prop
pub async fn update_property(
    Extension(principal): Extension<Principal>,
    Path((id, property_id)): Path<(Uuid, String)>,
    ApiJson(patch): ApiJson<PropertyPatch>,
) -> ApiResult<FlexDatabase> {
    principal.require(Permission::TableAdmin)?;
    Ok(ApiResponse::success(TableService::update_property(&principal, id, &property_id, patch).await?))
}

/// DELETE /api/v1/databases/:id/properties/:prop?version=
pub async fn remove_property(
    Extension(principal): Extension<Principal>,
    Path((id, property_id)): Path<(Uuid, String)>,
    ApiQuery(query): ApiQuery<VersionQuery>,
) -> ApiResult<FlexDatabase> {
    principal.require(Permission::TableAdmin)?;
    Ok(ApiResponse::success(
        TableService::remove_property(&principal, id, &property_id, query.version).await?,
    ))
}

/// PUT /api/v1/databases/:id/properties/order
pub async fn reorder_properties(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<ReorderInput>,
) -> ApiResult<FlexDatabase> {
    principal.require(Permission::TableAdmin)?;
    Ok(ApiResponse::success(TableService::reorder_properties(&principal, id, input).await?))
}

/// GET /api/v1/databases/:id/records?where=&sort=&page=&size=
pub async fn list_records(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiQuery(query): ApiQuery<RecordQuery>,
) -> ApiResult<Page<FlexRecord>> {
    principal.require(Permission::TableRead)?;
    Ok(ApiResponse::success(TableService::list_records(&principal, id, &query).await?))
}

pub async fn create_record(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<RecordInput>,
) -> ApiResult<FlexRecord> {
    principal.require(Permission::TableWrite)?;
    Ok(ApiResponse::created(TableService::create_record(&principal, id, input).await?))
}

pub async fn get_record(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<FlexRecord> {
    principal.require(Permission::TableRead)?;
    Ok(ApiResponse::success(TableService::get_record(&principal, id).await?))
}

pub async fn patch_record(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<RecordInput>,
) -> ApiResult<FlexRecord> {
    principal.require(Permission::TableWrite)?;
    Ok(ApiResponse::success(TableService::patch_record(&principal, id, input).await?))
}

pub async fn delete_record(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<()> {
    principal.require(Permission::TableWrite)?;
    TableService::delete_record(&principal, id).await?;
    Ok(ApiResponse::no_content())
}
