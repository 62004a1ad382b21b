use axum::{extract::Path, Extension};
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::database::models::tag::{Tag, TagInput};
use crate::handlers::ApiJson;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tag::TagService;

pub async fn list(Extension(principal): Extension<Principal>) -> ApiResult<Vec<Tag>> {
    principal.require(Permission::TagRead)?;
    Ok(ApiResponse::success(TagService::list(&principal).await?))
}

pub async fn get(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<Tag> {
    principal.require(Permission::TagRead)?;
    Ok(ApiResponse::success(TagService::get(&principal, id).await?))
}

pub async fn create(Extension(principal): Extension<Principal>, ApiJson(input): ApiJson<TagInput>) -> ApiResult<Tag> {
    principal.require(Permission::TagWrite)?;
    Ok(ApiResponse::created(TagService::create(&principal, input).await?))
}

pub async fn update(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<TagInput>,
) -> ApiResult<Tag> {
    principal.require(Permission::TagWrite)?;
    Ok(ApiResponse::success(TagService::update(&principal, id, input).await?))
}

pub async fn delete(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<()> {
    principal.require(Permission::TagWrite)?;
    TagService::delete(&principal, id).await?;
    Ok(ApiResponse::no_content())
}
