use axum::{
    extract::Path,
    http::header,
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Permission, Principal};
use crate::database::models::expense::{Expense, ExpenseInput};
use crate::error::ApiError;
use crate::handlers::{ApiJson, ApiQuery};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::expense::{ExpenseQuery, ExpenseService};
use crate::types::Page;

#[derive(Debug, Deserialize)]
pub struct TagIdsInput {
    pub tag_ids: Vec<Uuid>,
}

/// GET /api/v1/expenses
pub async fn list(
    Extension(principal): Extension<Principal>,
    ApiQuery(query): ApiQuery<ExpenseQuery>,
) -> ApiResult<Page<Expense>> {
    principal.require(Permission::ExpenseRead)?;
    Ok(ApiResponse::success(ExpenseService::list(&principal, &query).await?))
}

/// GET /api/v1/expenses/:id
pub async fn get(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<Expense> {
    principal.require(Permission::ExpenseRead)?;
    Ok(ApiResponse::success(ExpenseService::get(&principal, id).await?))
}

/// POST /api/v1/expenses
pub async fn create(
    Extension(principal): Extension<Principal>,
    ApiJson(input): ApiJson<ExpenseInput>,
) -> ApiResult<Expense> {
    principal.require(Permission::ExpenseWrite)?;
    Ok(ApiResponse::created(ExpenseService::create(&principal, input).await?))
}

/// PUT /api/v1/expenses/:id
pub async fn update(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<ExpenseInput>,
) -> ApiResult<Expense> {
    principal.require(Permission::ExpenseWrite)?;
    Ok(ApiResponse::success(ExpenseService::update(&principal, id, input).await?))
}

/// DELETE /api/v1/expenses/:id
pub async fn delete(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<()> {
    principal.require(Permission::ExpenseDelete)?;
    ExpenseService::delete(&principal, id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/v1/expenses/:id/restore
pub async fn restore(Extension(principal): Extension<Principal>, Path(id): Path<Uuid>) -> ApiResult<Expense> {
    principal.require(Permission::ExpenseDelete)?;
    Ok(ApiResponse::success(ExpenseService::restore(&principal, id).await?))
}

/// PUT /api/v1/expenses/:id/tags
pub async fn set_tags(
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<TagIdsInput>,
) -> ApiResult<Expense> {
    principal.require(Permission::ExpenseWrite)?;
    Ok(ApiResponse::success(ExpenseService::set_tags(&principal, id, &input.tag_ids).await?))
}

/// GET /api/v1/expenses/export - CSV of every expense matching the list filters
pub async fn export(
    Extension(principal): Extension<Principal>,
    ApiQuery(query): ApiQuery<ExpenseQuery>,
) -> Result<Response, ApiError> {
    principal.require(Permission::ExpenseRead)?;
    principal.require(Permission::ReportRead)?;
    let body = ExpenseService::export_csv(&principal, &query).await?;
    let file_name = format!("expenses-{}.csv", chrono::Utc::now().format("%Y%m%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", file_name)),
        ],
        body,
    )
        .into_response())
}
