// Public handlers: no authentication
use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::database::DatabaseManager;

/// GET / - service identity and entry points
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "LegalOps API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Multi-tenant legal practice management backend",
            "endpoints": {
                "health": "/health (public)",
                "me": "/api/v1/me",
                "expenses": "/api/v1/expenses[/:id[/restore|/tags]], /api/v1/expenses/export",
                "tags": "/api/v1/tags[/:id]",
                "attachments": "/api/v1/attachments[/:id[/content|/link]]",
                "roles": "/api/v1/roles[/:id], /api/v1/role-assignments",
                "tables": "/api/v1/property-types, /api/v1/workspaces, /api/v1/databases, /api/v1/records/:id",
                "documents": "/api/v1/documents[/:id[/status]]",
                "reports": "/api/v1/reports/{summary,monthly,categories,tags}",
            }
        }
    }))
}

/// GET /health - 503 while the database is unreachable
pub async fn health() -> impl IntoResponse {
    let now = Utc::now();
    match DatabaseManager::health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "status": "ok", "timestamp": now, "database": "ok" }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": true,
                    "message": "Database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": { "status": "degraded", "timestamp": now }
                })),
            )
        }
    }
}
