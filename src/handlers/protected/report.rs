use axum::Extension;

use crate::auth::{Permission, Principal};
use crate::handlers::ApiQuery;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::report::{CategoryRow, MonthRow, MonthlyQuery, ReportRange, ReportService, Summary, TagRow};

/// GET /api/v1/reports/summary?from=&to=
pub async fn summary(
    Extension(principal): Extension<Principal>,
    ApiQuery(range): ApiQuery<ReportRange>,
) -> ApiResult<Summary> {
    principal.require(Permission::ReportRead)?;
    Ok(ApiResponse::success(ReportService::summary(&principal, &range).await?))
}

/// GET /api/v1/reports/monthly?year=
pub async fn monthly(
    Extension(principal): Extension<Principal>,
    ApiQuery(query): ApiQuery<MonthlyQuery>,
) -> ApiResult<Vec<MonthRow>> {
    principal.require(Permission::ReportRead)?;
    Ok(ApiResponse::success(ReportService::monthly(&principal, query.year).await?))
}

pub async fn categories(
    Extension(principal): Extension<Principal>,
    ApiQuery(range): ApiQuery<ReportRange>,
) -> ApiResult<Vec<CategoryRow>> {
    principal.require(Permission::ReportRead)?;
    Ok(ApiResponse::success(ReportService::categories(&principal, &range).await?))
}

pub async fn tags(Extension(principal): Extension<Principal>, ApiQuery(range): ApiQuery<ReportRange>) -> ApiResult<Vec<TagRow>> {
    principal.require(Permission::ReportRead)?;
    Ok(ApiResponse::success(ReportService::tags(&principal, &range).await?))
}
