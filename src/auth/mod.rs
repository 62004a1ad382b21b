//! Bearer token validation.
//!
//! Production tokens are RS256 JWTs from Auth0, verified against the tenant's
//! JWKS. A development HS256 secret can be configured for local work and
//! integration tests; it is ignored in production.

pub mod circuit_breaker;
pub mod claims;
pub mod jwks;
pub mod permissions;
pub mod principal;
pub mod validator;

use thiserror::Error;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use claims::{Audience, Claims};
pub use jwks::JwksCache;
pub use permissions::{Permission, PermissionSet};
pub use principal::Principal;
pub use validator::JwtValidator;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("Malformed Authorization header: {0}")]
    MalformedHeader(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token signed with unknown key '{0}'")]
    UnknownKey(String),

    #[error("Token carries no tenant")]
    MissingTenant,

    #[error("Token validation is not configured")]
    NotConfigured,

    #[error("Signing keys unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("Token generation failed: {0}")]
    TokenGeneration(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(err.to_string())
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingToken)?;
    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AuthError::MalformedHeader("expected 'Bearer <token>'".to_string()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader("expected 'Bearer <token>'".to_string()));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader("empty token".to_string()));
    }
    Ok(token)
}
