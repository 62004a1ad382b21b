use axum::{extract::Request, middleware::Next, response::Response};

use super::auth::AuthUser;
use crate::auth::{AuthError, JwtValidator};
use crate::database::models::tenant::Tenant;
use crate::error::ApiError;
use crate::services::tenant::TenantService;

/// Active tenant named by the token's tenant claim
#[derive(Clone, Debug)]
pub struct ValidatedTenant(pub Tenant);

/// Resolves the tenant claim against `tenants`; unknown, suspended or deleted
/// tenants are refused with 403
pub async fn validate_tenant_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before tenant validation"))?;

    let tenant_id = auth_user
        .claims
        .tenant_id(&JwtValidator::global().namespace)
        .ok_or(AuthError::MissingTenant)?;

    let tenant = match TenantService::find(tenant_id).await? {
        Some(tenant) if tenant.is_active() => tenant,
        _ => {
            tracing::warn!(tenant = %tenant_id, subject = auth_user.subject(), "Tenant not found or inactive");
            return Err(ApiError::forbidden("Tenant is not active or does not exist"));
        }
    };

    tracing::debug!(tenant = %tenant.id, slug = %tenant.slug, "Tenant validated");
    request.extensions_mut().insert(ValidatedTenant(tenant));
    Ok(next.run(request).await)
}
