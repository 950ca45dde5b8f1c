use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::database::DatabaseManager;
use crate::middleware::ApiResponse;
use crate::server::AppState;

/// GET /v1/healthcheck
pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    let mut status = StatusCode::OK;
    let database = match &state.pool {
        None => "memory",
        Some(pool) => match DatabaseManager::health_check(pool, state.config.database.query_timeout()).await {
            Ok(()) => "ok",
            Err(e) => {
                tracing::error!(error = %e, "database health check failed");
                status = StatusCode::SERVICE_UNAVAILABLE;
                "unavailable"
            }
        },
    };

    ApiResponse::with_status(
        json!({
            "status": if status == StatusCode::OK { "available" } else { "degraded" },
            "system_info": {
                "environment": state.config.environment.as_str(),
                "version": env!("CARGO_PKG_VERSION"),
                "database": database,
            }
        }),
        status,
    )
}
