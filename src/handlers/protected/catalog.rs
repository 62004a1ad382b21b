use axum::Extension;

use crate::auth::{Permission, Principal};
use crate::catalog::{catalog, CatalogEntry};
use crate::middleware::{ApiResponse, ApiResult};

/// GET /api/v1/property-types
pub async fn list(Extension(principal): Extension<Principal>) -> ApiResult<&'static [CatalogEntry]> {
    principal.require(Permission::TableRead)?;
    Ok(ApiResponse::success(catalog().entries()))
}
