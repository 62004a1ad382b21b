use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::JwtValidator;
use crate::config;
use crate::database::DatabaseManager;
use crate::handlers::{protected, public};
use crate::middleware::{jwt_auth_middleware, validate_tenant_middleware, validate_user_middleware};

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Bind `0.0.0.0:{port}` and serve until Ctrl-C
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let config = config::config();
    tracing::info!("Starting LegalOps API in {:?} mode", config.environment);
    if crate::is_production!() && config.security.auth0_domain.is_none() {
        tracing::warn!("AUTH0_DOMAIN is not set; protected routes will answer 503");
    }
    if crate::is_development!() && JwtValidator::global().dev_tokens_enabled() {
        tracing::warn!("Accepting HS256 development tokens");
    }

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    DatabaseManager::close().await;
    Ok(())
}

/// Complete application router
pub fn router() -> Router {
    let api = &config::config().api;

    let router = Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .nest("/api/v1", api_routes())
        .layer(DefaultBodyLimit::max(api.max_request_size_bytes))
        .layer(cors_layer());
    with_request_logging(router, api.enable_request_logging)
}

/// Wrap in a request trace span when `api.enable_request_logging` is set
fn with_request_logging(router: Router, enabled: bool) -> Router {
    if enabled {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn cors_layer() -> CorsLayer {
    let origins = &config::config().security.cors_origins;
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_DISPOSITION])
}

/// Routes under `/api/v1`; layers run outermost-last, so JWT validation
/// happens before tenant and principal resolution
fn api_routes() -> Router {
    Router::new()
        .merge(expense_routes())
        .merge(attachment_routes())
        .merge(rbac_routes())
        .merge(table_routes())
        .merge(document_routes())
        .merge(report_routes())
        .route("/me", get(protected::me::get))
        .layer(from_fn(validate_user_middleware))
        .layer(from_fn(validate_tenant_middleware))
        .layer(from_fn(jwt_auth_middleware))
}

fn expense_routes() -> Router {
    use protected::{expense, tag};

    Router::new()
        .route("/expenses", get(expense::list).post(expense::create))
        .route("/expenses/export", get(expense::export))
        .route("/expenses/:id", get(expense::get).put(expense::update).delete(expense::delete))
        .route("/expenses/:id/restore", post(expense::restore))
        .route("/expenses/:id/tags", put(expense::set_tags))
        .route("/tags", get(tag::list).post(tag::create))
        .route("/tags/:id", get(tag::get).put(tag::update).delete(tag::delete))
}

fn attachment_routes() -> Router {
    use protected::attachment;

    let upload_limit = config::config().storage.max_upload_bytes + MULTIPART_OVERHEAD;
    Router::new()
        .route(
            "/attachments",
            get(attachment::list)
                .post(attachment::upload)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/attachments/:id", get(attachment::get).delete(attachment::delete))
        .route("/attachments/:id/content", get(attachment::download))
        .route("/attachments/:id/link", put(attachment::link))
}

fn rbac_routes() -> Router {
    use protected::role;

    Router::new()
        .route("/roles", get(role::list).post(role::create))
        .route("/roles/:id", put(role::update).delete(role::delete))
        .route(
            "/role-assignments",
            get(role::list_assignments).post(role::assign).delete(role::revoke),
        )
}

fn table_routes() -> Router {
    use protected::{catalog, table, workspace};

    Router::new()
        .route("/property-types", get(catalog::list))
        .route("/workspaces", get(workspace::list).post(workspace::create))
        .route(
            "/workspaces/:id",
            get(workspace::get).put(workspace::update).delete(workspace::delete),
        )
        .route("/databases", get(table::list_databases).post(table::create_database))
        .route(
            "/databases/:id",
            get(table::get_database).put(table::update_database).delete(table::delete_database),
        )
        .route("/databases/:id/properties", post(table::add_property))
        .route("/databases/:id/properties/order", put(table::reorder_properties))
        .route(
            "/databases/:id/properties/:prop",
            patch(table::update_property).delete(table::remove_property),
        )
        .route("/databases/:id/records", get(table::list_records).post(table::create_record))
        .route(
            "/records/:id",
            get(table::get_record).patch(table::patch_record).delete(table::delete_record),
        )
}

fn document_routes() -> Router {
    use protected::document;

    Router::new()
        .route("/documents", get(document::list).post(document::create))
        .route(
            "/documents/:id",
            get(document::get).put(document::update).delete(document::delete),
        )
        .route("/documents/:id/status", put(document::transition))
}

fn report_routes() -> Router {
    use protected::report;

    Router::new()
        .route("/reports/summary", get(report::summary))
        .route("/reports/monthly", get(report::monthly))
        .route("/reports/categories", get(report::categories))
        .route("/reports/tags", get(report::tags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn call(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn root_is_public() {
        let (status, body) = call(Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["name"], "LegalOps API");
    }

    #[tokio::test]
    async fn api_requires_bearer_token() {
        let (status, body) = call(Request::get("/api/v1/expenses").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], true);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn malformed_token_is_unauthorized() {
        let request = Request::get("/api/v1/me")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn serves_with_request_logging_off() {
        let app = with_request_logging(Router::new().route("/", get(public::root)), false);
        let response = app.oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (status, _) = call(Request::get("/api/v2/nothing").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
