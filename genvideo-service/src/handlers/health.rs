use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::{dtos::MessageResponse, services, AppState};

/// GET /
pub async fn index() -> Json<MessageResponse> {
    Json(MessageResponse::new("Backend is running"))
}

/// GET /favicon.ico
pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.users.ping().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            "down"
        }
    };

    let status = if database == "up" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database == "up" { "healthy" } else { "unhealthy" },
            "service": state.config.service_name,
            "version": state.config.service_version,
            "database": database,
        })),
    )
}

/// GET /metrics
pub async fn metrics_endpoint() -> String {
    services::get_metrics()
}
