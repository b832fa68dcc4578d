use axum::response::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::config::AppConfig;

/// Everything a handler needs: the store and the loaded configuration
pub struct AppContext<S> {
    pub store: S,
    pub config: AppConfig,
}

impl<S> AppContext<S> {
    pub fn new(store: S, config: AppConfig) -> Self {
        Self { store, config }
    }
}

pub type AppState<S> = Arc<AppContext<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
