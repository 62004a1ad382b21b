use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, normally taken from DATABASE_URL
    #[serde(skip_serializing)]
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub enable_query_logging: bool,
    pub slow_query_threshold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
    /// Auth0 tenant domain, e.g. `example.eu.auth0.com`
    pub auth0_domain: Option<String>,
    pub auth0_audience: Option<String>,
    /// Prefix of the custom claims Auth0 actions add to access tokens
    pub claims_namespace: String,
    pub jwks_cache_ttl_secs: u64,
    pub jwks_min_refresh_secs: u64,
    pub jwks_breaker_failure_threshold: u32,
    pub jwks_breaker_recovery_secs: u64,
    pub jwt_leeway_secs: u64,
    /// HS256 secret accepted instead of Auth0 tokens. Never honoured in production.
    #[serde(skip_serializing)]
    pub dev_jwt_secret: Option<String>,
    pub dev_token_expiry_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root_dir: String,
    pub max_upload_bytes: usize,
    pub allowed_content_types: Vec<String>,
    pub temporary_ttl_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub max_nested_depth: u32,
    pub debug_logging: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }
        if let Ok(v) = env::var("DATABASE_SLOW_QUERY_THRESHOLD_MS") {
            self.database.slow_query_threshold_ms = v.parse().unwrap_or(self.database.slow_query_threshold_ms);
        }

        // API overrides
        if let Some(v) = env::var("LEGALOPS_API_PORT").ok().or_else(|| env::var("PORT").ok()) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = env::var("AUTH0_DOMAIN") {
            self.security.auth0_domain = Some(v);
        }
        if let Ok(v) = env::var("AUTH0_AUDIENCE") {
            self.security.auth0_audience = Some(v);
        }
        if let Ok(v) = env::var("AUTH0_CLAIMS_NAMESPACE") {
            self.security.claims_namespace = v;
        }
        if let Ok(v) = env::var("SECURITY_JWKS_CACHE_TTL_SECS") {
            self.security.jwks_cache_ttl_secs = v.parse().unwrap_or(self.security.jwks_cache_ttl_secs);
        }
        if let Ok(v) = env::var("SECURITY_JWKS_MIN_REFRESH_SECS") {
            self.security.jwks_min_refresh_secs = v.parse().unwrap_or(self.security.jwks_min_refresh_secs);
        }
        if let Ok(v) = env::var("SECURITY_JWKS_BREAKER_FAILURE_THRESHOLD") {
            self.security.jwks_breaker_failure_threshold =
                v.parse().unwrap_or(self.security.jwks_breaker_failure_threshold);
        }
        if let Ok(v) = env::var("SECURITY_JWKS_BREAKER_RECOVERY_SECS") {
            self.security.jwks_breaker_recovery_secs = v.parse().unwrap_or(self.security.jwks_breaker_recovery_secs);
        }
        if let Ok(v) = env::var("SECURITY_JWT_LEEWAY_SECS") {
            self.security.jwt_leeway_secs = v.parse().unwrap_or(self.security.jwt_leeway_secs);
        }
        if let Ok(v) = env::var("DEV_JWT_SECRET") {
            if self.environment == Environment::Production {
                tracing::warn!("DEV_JWT_SECRET is ignored in production");
            } else if !v.is_empty() {
                self.security.dev_jwt_secret = Some(v);
            }
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_ROOT_DIR") {
            self.storage.root_dir = v;
        }
        if let Ok(v) = env::var("STORAGE_MAX_UPLOAD_BYTES") {
            self.storage.max_upload_bytes = v.parse().unwrap_or(self.storage.max_upload_bytes);
        }
        if let Ok(v) = env::var("STORAGE_ALLOWED_CONTENT_TYPES") {
            self.storage.allowed_content_types = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = env::var("STORAGE_TEMPORARY_TTL_HOURS") {
            self.storage.temporary_ttl_hours = v.parse().unwrap_or(self.storage.temporary_ttl_hours);
        }

        // Filter overrides
        if let Ok(v) = env::var("FILTER_MAX_NESTED_DEPTH") {
            self.filter.max_nested_depth = v.parse().unwrap_or(self.filter.max_nested_depth);
        }
        if let Ok(v) = env::var("FILTER_DEBUG_LOGGING") {
            self.filter.debug_logging = v.parse().unwrap_or(self.filter.debug_logging);
        }

        self
    }

    fn default_content_types() -> Vec<String> {
        [
            "application/pdf",
            "image/png",
            "image/jpeg",
            "image/gif",
            "image/webp",
            "text/plain",
            "text/csv",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
                enable_query_logging: true,
                slow_query_threshold_ms: 100,
            },
            api: ApiConfig {
                port: 8080,
                enable_request_logging: true,
                max_request_size_bytes: 20 * 1024 * 1024, // 20MB
                default_page_size: 20,
                max_page_size: 200,
            },
            security: SecurityConfig {
                cors_origins: vec!["http://localhost:3000".to_string()],
                auth0_domain: None,
                auth0_audience: None,
                claims_namespace: "https://legalops.app/".to_string(),
                jwks_cache_ttl_secs: 600,
                jwks_min_refresh_secs: 30,
                jwks_breaker_failure_threshold: 3,
                jwks_breaker_recovery_secs: 30,
                jwt_leeway_secs: 60,
                dev_jwt_secret: None,
                dev_token_expiry_hours: 24,
            },
            storage: StorageConfig {
                root_dir: "./data/attachments".to_string(),
                max_upload_bytes: 10 * 1024 * 1024, // 10MB
                allowed_content_types: Self::default_content_types(),
                temporary_ttl_hours: 24,
            },
            filter: FilterConfig {
                max_nested_depth: 10,
                debug_logging: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
                enable_query_logging: true,
                slow_query_threshold_ms: 500,
            },
            api: ApiConfig {
                port: 8080,
                enable_request_logging: true,
                max_request_size_bytes: 20 * 1024 * 1024,
                default_page_size: 20,
                max_page_size: 100,
            },
            security: SecurityConfig {
                cors_origins: vec!["https://staging.legalops.app".to_string()],
                auth0_domain: None,
                auth0_audience: None,
                claims_namespace: "https://legalops.app/".to_string(),
                jwks_cache_ttl_secs: 600,
                jwks_min_refresh_secs: 30,
                jwks_breaker_failure_threshold: 5,
                jwks_breaker_recovery_secs: 30,
                jwt_leeway_secs: 30,
                dev_jwt_secret: None,
                dev_token_expiry_hours: 4,
            },
            storage: StorageConfig {
                root_dir: "/var/lib/legalops/attachments".to_string(),
                max_upload_bytes: 10 * 1024 * 1024,
                allowed_content_types: Self::default_content_types(),
                temporary_ttl_hours: 24,
            },
            filter: FilterConfig {
                max_nested_depth: 5,
                debug_logging: false,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
                enable_query_logging: false,
                slow_query_threshold_ms: 1000,
            },
            api: ApiConfig {
                port: 8080,
                enable_request_logging: false,
                max_request_size_bytes: 12 * 1024 * 1024,
                default_page_size: 20,
                max_page_size: 100,
            },
            security: SecurityConfig {
                cors_origins: vec!["https://app.legalops.app".to_string()],
                auth0_domain: None,
                auth0_audience: None,
                claims_namespace: "https://legalops.app/".to_string(),
                jwks_cache_ttl_secs: 3600,
                jwks_min_refresh_secs: 60,
                jwks_breaker_failure_threshold: 5,
                jwks_breaker_recovery_secs: 60,
                jwt_leeway_secs: 30,
                dev_jwt_secret: None,
                dev_token_expiry_hours: 1,
            },
            storage: StorageConfig {
                root_dir: "/var/lib/legalops/attachments".to_string(),
                max_upload_bytes: 10 * 1024 * 1024,
                allowed_content_types: Self::default_content_types(),
                temporary_ttl_hours: 12,
            },
            filter: FilterConfig {
                max_nested_depth: 4,
                debug_logging: false,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults_are_permissive() {
        let config = AppConfig::development();
        assert_eq!(config.api.max_page_size, 200);
        assert_eq!(config.filter.max_nested_depth, 10);
        assert!(config.security.dev_jwt_secret.is_none());
    }

    #[test]
    fn production_defaults_are_strict() {
        let config = AppConfig::production();
        assert_eq!(config.api.max_page_size, 100);
        assert!(!config.database.enable_query_logging);
        assert!(config.storage.allowed_content_types.contains(&"application/pdf".to_string()));
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut config = AppConfig::development();
        config.security.dev_jwt_secret = Some("hunter2".to_string());
        config.database.url = Some("postgres://u:p@localhost/db".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("postgres://"));
    }
}
