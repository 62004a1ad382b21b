use axum::{extract::Path, Extension};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::database::models::role::{AssignmentInput, CustomRole, RoleAssignment, RoleInput};
use crate::handlers::{ApiJson, ApiQuery};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::role::{RoleService, RoleView};

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentQuery {
    pub subject: Option<String>,
}

/// GET /api/v1/roles - built-in roles followed by the tenant's custom roles
pub async fn list(Extension(principal): Extension<Principal>) -> ApiResult<Vec<RoleView>> {
    principal.require(Permission::RoleManage)?;
    Ok(ApiResponse::success(RoleService::list(&principal).await?))
}

pub async fn create(Extension(principal): Extension<Principal>, ApiJson(input): ApiJson<RoleInput>) -> ApiResult<CustomRole> {
    principal.require(Permission::RoleManage)?;
    Ok(ApiResponse::created(RoleService::create(&principal, input).await?))
}

pub async fn update(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<RoleInput>,
) -> ApiResult<CustomRole> {
    principal.require(Permission::RoleManage)?;
    Ok(ApiResponse::success(RoleService::update(&principal, id, input).await?))
}

pub async fn delete(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<()> {
    principal.require(Permission::RoleManage)?;
    RoleService::delete(&principal, id).await?;
    Ok(ApiResponse::no_content())
}

/// GET /api/v1/role-assignments?subject=
pub async fn list_assignments(
    Extension(principal): Extension<Principal>,
    ApiQuery(query): ApiQuery<AssignmentQuery>,
) -> ApiResult<Vec<RoleAssignment>> {
    principal.require(Permission::RoleManage)?;
    Ok(ApiResponse::success(RoleService::list_assignments(&principal, query.subject.as_deref()).await?))
}

/// POST /api/v1/role-assignments
pub async fn assign(
    Extension(principal): Extension<Principal>,
    ApiJson(input): ApiJson<AssignmentInput>,
) -> ApiResult<RoleAssignment> {
    principal.require(Permission::RoleManage)?;
    Ok(ApiResponse::created(RoleService::assign(&principal, input).await?))
}

/// DELETE /api/v1/role-assignments
pub async fn revoke(Extension(principal): Extension<Principal>, ApiJson(input): ApiJson<AssignmentInput>) -> ApiResult<()> {
    principal.require(Permission::RoleManage)?;
    RoleService::revoke(&principal, input).await?;
    Ok(ApiResponse::no_content())
}
