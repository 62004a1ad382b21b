use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use serde_json::{json, Map};
use std::time::Duration;
use uuid::Uuid;

use super::circuit_breaker::CircuitBreakerConfig;
use super::claims::{Audience, Claims};
use super::jwks::JwksCache;
use super::AuthError;
use crate::config::{self, SecurityConfig};

/// Issuer stamped on development tokens
pub const DEV_ISSUER: &str = "legalops-dev";

/// Validates bearer tokens for the API.
///
/// RS256 tokens are checked against the Auth0 JWKS (issuer `https://{domain}/`,
/// configured audience). When a development secret is configured, HS256
/// tokens signed with it are accepted as well.
pub struct JwtValidator {
    jwks: Option<JwksCache>,
    issuer: Option<String>,
    audience: Option<String>,
    dev_secret: Option<String>,
    leeway_secs: u64,
    dev_token_expiry_hours: u64,
    pub namespace: String,
}

static VALIDATOR: Lazy<JwtValidator> = Lazy::new(|| JwtValidator::from_config(&config::config().security));

impl JwtValidator {
    pub fn global() -> &'static JwtValidator {
        &VALIDATOR
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        let jwks = security.auth0_domain.as_deref().map(|domain| {
            JwksCache::new(
                JwksCache::url_for_domain(domain),
                Duration::from_secs(security.jwks_cache_ttl_secs),
                Duration::from_secs(security.jwks_min_refresh_secs),
                CircuitBreakerConfig {
                    failure_threshold: security.jwks_breaker_failure_threshold,
                    recovery_timeout: Duration::from_secs(security.jwks_breaker_recovery_secs),
                    success_threshold: 1,
                },
            )
        });
        Self {
            jwks,
            issuer: security
                .auth0_domain
                .as_deref()
                .map(|d| format!("https://{}/", d.trim_end_matches('/'))),
            audience: security.auth0_audience.clone(),
            dev_secret: security.dev_jwt_secret.clone().filter(|s| !s.is_empty()),
            leeway_secs: security.jwt_leeway_secs,
            dev_token_expiry_hours: security.dev_token_expiry_hours,
            namespace: security.claims_namespace.clone(),
        }
    }

    pub fn dev_tokens_enabled(&self) -> bool {
        self.dev_secret.is_some()
    }

    pub async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token)?;
        match header.alg {
            Algorithm::HS256 => self.validate_dev(token),
            Algorithm::RS256 => {
                let jwks = self.jwks.as_ref().ok_or(AuthError::NotConfigured)?;
                let kid = header
                    .kid
                    .ok_or_else(|| AuthError::InvalidToken("token header has no kid".to_string()))?;
                let key = jwks.decoding_key(&kid).await?;

                let mut validation = Validation::new(Algorithm::RS256);
                validation.leeway = self.leeway_secs;
                if let Some(issuer) = &self.issuer {
                    validation.set_issuer(&[issuer]);
                }
                match &self.audience {
                    Some(aud) => validation.set_audience(&[aud]),
                    None => validation.validate_aud = false,
                }
                Ok(decode::<Claims>(token, &key, &validation)?.claims)
            }
            other => Err(AuthError::InvalidToken(format!("unsupported algorithm {:?}", other))),
        }
    }

    fn validate_dev(&self, token: &str) -> Result<Claims, AuthError> {
        let secret = self.dev_secret.as_deref().ok_or(AuthError::NotConfigured)?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        validation.set_issuer(&[DEV_ISSUER]);
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
        Ok(data.claims)
    }

    /// Mint an HS256 token with the development secret
    pub fn issue_dev_token(
        &self,
        tenant_id: Uuid,
        subject: &str,
        roles: &[String],
        permissions: &[String],
        email: Option<&str>,
    ) -> Result<String, AuthError> {
        let secret = self.dev_secret.as_deref().ok_or_else(|| {
            AuthError::TokenGeneration("development token secret is not configured".to_string())
        })?;

        let now = Utc::now();
        let mut claims = Claims {
            sub: subject.to_string(),
            iss: Some(DEV_ISSUER.to_string()),
            aud: self.audience.clone().map(Audience::One),
            exp: (now + ChronoDuration::hours(self.dev_token_expiry_hours as i64)).timestamp(),
            iat: Some(now.timestamp()),
            permissions: permissions.to_vec(),
            scope: None,
            custom: Map::new(),
        };
        claims.set_namespaced(&self.namespace, "tenant_id", json!(tenant_id.to_string()));
        claims.set_namespaced(&self.namespace, "roles", json!(roles));
        if let Some(email) = email {
            claims.set_namespaced(&self.namespace, "email", json!(email));
        }

        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security(dev_secret: Option<&str>) -> SecurityConfig {
        let mut security = config::config().security.clone();
        security.auth0_domain = None;
        security.auth0_audience = Some("legalops-api".to_string());
        security.dev_jwt_secret = dev_secret.map(str::to_string);
        security
    }

    #[tokio::test]
    async fn dev_token_round_trip() {
        let validator = JwtValidator::from_config(&security(Some("test-secret")));
        let tenant = Uuid::new_v4();
        let token = validator
            .issue_dev_token(tenant, "auth0|dev", &["staff".into()], &["report:read".into()], Some("dev@firm.example"))
            .unwrap();

        let claims = validator.validate(&token).await.unwrap();
        assert_eq!(claims.sub, "auth0|dev");
        assert_eq!(claims.tenant_id(&validator.namespace), Some(tenant));
        assert_eq!(claims.roles(&validator.namespace), vec!["staff".to_string()]);
        assert_eq!(claims.permissions, vec!["report:read".to_string()]);
    }

    #[tokio::test]
    async fn rejects_foreign_signature() {
        let issuer = JwtValidator::from_config(&security(Some("one")));
        let verifier = JwtValidator::from_config(&security(Some("two")));
        let token = issuer.issue_dev_token(Uuid::new_v4(), "u", &[], &[], None).unwrap();
        assert!(matches!(verifier.validate(&token).await, Err(AuthError::InvalidToken(_))));
    }

    #[tokio::test]
    async fn unconfigured_paths() {
        let validator = JwtValidator::from_config(&security(None));
        assert!(matches!(
            validator.issue_dev_token(Uuid::new_v4(), "u", &[], &[], None),
            Err(AuthError::TokenGeneration(_))
        ));
        let signer = JwtValidator::from_config(&security(Some("x")));
        let token = signer.issue_dev_token(Uuid::new_v4(), "u", &[], &[], None).unwrap();
        assert!(matches!(validator.validate(&token).await, Err(AuthError::NotConfigured)));
        assert!(matches!(validator.validate("garbage").await, Err(AuthError::InvalidToken(_))));
    }
}
