use axum::{extract::Request, middleware::Next, response::Response};

use super::auth::AuthUser;
use super::validate_tenant::ValidatedTenant;
use crate::auth::{JwtValidator, Principal};
use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::services::role::RoleService;

/// Builds the caller's [`Principal`] from stored role assignments plus the
/// roles and permissions carried by the token
pub async fn validate_user_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before user validation"))?;
    let ValidatedTenant(tenant) = request
        .extensions()
        .get::<ValidatedTenant>()
        .cloned()
        .ok_or_else(|| ApiError::internal_server_error("Tenant required before user validation"))?;

    let namespace = &JwtValidator::global().namespace;
    let claims = &auth_user.claims;

    let mut tx = DatabaseManager::tenant_tx(tenant.id).await?;
    let (roles, permissions) =
        RoleService::effective_permissions(&mut tx, tenant.id, &claims.sub, &claims.roles(namespace), &claims.granted())
            .await?;
    tx.commit().await?;

    let principal = Principal {
        subject: claims.sub.clone(),
        tenant_id: tenant.id,
        email: claims.email(namespace),
        roles,
        permissions,
    };
    tracing::debug!(subject = %principal.subject, tenant = %tenant.id, permissions = principal.permissions.len(), "Principal resolved");

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
