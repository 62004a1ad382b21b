use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::auth::{bearer_token, Claims, JwtValidator};
use crate::error::ApiError;

/// Verified token claims, injected by [`jwt_auth_middleware`]
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub claims: Claims,
}

impl AuthUser {
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }
}

/// Validates the bearer token and injects [`AuthUser`]
pub async fn jwt_auth_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());
    let token = bearer_token(header)?;

    let claims = JwtValidator::global().validate(token).await.map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        e
    })?;

    request.extensions_mut().insert(AuthUser { claims });
    Ok(next.run(request).await)
}
