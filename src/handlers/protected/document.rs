use axum::{extract::Path, Extension};
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::database::models::document::{Document, DocumentInput, StatusInput};
use crate::handlers::{ApiJson, ApiQuery};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::document::{DocumentQuery, DocumentService};
use crate::types::Page;

pub async fn list(
    Extension(principal): Extension<Principal>,
    ApiQuery(query): ApiQuery<DocumentQuery>,
) -> ApiResult<Page<Document>> {
    principal.require(Permission::DocumentRead)?;
    Ok(ApiResponse::success(DocumentService::list(&principal, query).await?))
}

pub async fn get(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<Document> {
    principal.require(Permission::DocumentRead)?;
    Ok(ApiResponse::success(DocumentService::get(&principal, id).await?))
}

pub async fn create(
    Extension(principal): Extension<Principal>,
    ApiJson(input): ApiJson<DocumentInput>,
) -> ApiResult<Document> {
    principal.require(Permission::DocumentWrite)?;
    Ok(ApiResponse::created(DocumentService::create(&principal, input).await?))
}

pub async fn update(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<DocumentInput>,
) -> ApiResult<Document> {
    principal.require(Permission::DocumentWrite)?;
    Ok(ApiResponse::success(DocumentService::update(&principal, id, input).await?))
}

/// PUT /api/v1/documents/:id/status
pub async fn transition(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<StatusInput>,
) -> ApiResult<Document> {
    principal.require(Permission::DocumentWrite)?;
    Ok(ApiResponse::success(DocumentService::transition(&principal, id, input).await?))
}

pub async fn delete(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<()> {
    principal.require(Permission::DocumentWrite)?;
    DocumentService::delete(&principal, id).await?;
    Ok(ApiResponse::no_content())
}
