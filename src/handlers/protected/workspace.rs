use axum::{extract::Path, Extension};
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::database::models::workspace::{Workspace, WorkspaceInput};
use crate::handlers::ApiJson;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::workspace::WorkspaceService;

pub async fn list(Extension(principal): Extension<Principal>) -> ApiResult<Vec<Workspace>> {
    principal.require(Permission::TableRead)?;
    Ok(ApiResponse::success(WorkspaceService::list(&principal).await?))
}

pub async fn get(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<Workspace> {
    principal.require(Permission::TableRead)?;
    Ok(ApiResponse::success(WorkspaceService::get(&principal, id).await?))
}

pub async fn create(
    Extension(principal): Extension<Principal>,
    ApiJson(input): ApiJson<WorkspaceInput>,
) -> ApiResult<Workspace> {
    principal.require(Permission::TableAdmin)?;
    Ok(ApiResponse::created(WorkspaceService::create(&principal, input).await?))
}

pub async fn update(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<WorkspaceInput>,
) -> ApiResult<Workspace> {
    principal.require(Permission::TableAdmin)?;
    Ok(ApiResponse::success(WorkspaceService::update(&principal, id, input).await?))
}

pub async fn delete(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<()> {
    principal.require(Permission::TableAdmin)?;
    WorkspaceService::delete(&principal, id).await?;
    Ok(ApiResponse::no_content())
}
