// handlers/public/service.rs - GET / and GET /health

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};

use crate::database::StorageBackend;
use crate::error::ApiError;

#[derive(Clone)]
pub struct ServiceState {
    pub storage: StorageBackend,
    pub api_base_path: String,
}

pub fn routes(state: ServiceState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state)
}

/// GET / - Service description
pub async fn root(State(state): State<ServiceState>) -> Json<Value> {
    let api = state.api_base_path.trim_end_matches('/');

    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "storage": state.storage.kind(),
        "endpoints": {
            "health": "/health (public)",
            "session": format!("{}/session/signup, {}/session/login, {}/session/logout (public)", api, api, api),
            "todo": format!("{}/todo[/:id], {}/todo/paging (protected)", api, api),
            "upload": format!("{}/upload (protected)", api),
        }
    }))
}

/// GET /health - Liveness plus a storage ping
pub async fn health(State(state): State<ServiceState>) -> Result<Json<Value>, ApiError> {
    if let Err(e) = state.storage.health_check().await {
        tracing::error!("Storage health check failed: {}", e);
        return Err(ApiError::service_unavailable("Storage is unavailable"));
    }

    Ok(Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "storage": "ok"
    })))
}
