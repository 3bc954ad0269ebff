use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub ledger_store: String,
    pub version: String,
    pub environment: String,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let (code, status, ledger_store) = match state.store().ping().await {
        Ok(()) => (StatusCode::OK, "healthy", "reachable"),
        Err(e) => {
            warn!("Ledger store health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "unreachable")
        }
    };

    let response = HealthResponse {
        status: status.to_string(),
        ledger_store: ledger_store.to_string(),
        version,
        environment: state.environment.clone(),
    };

    (code, Json(response))
}
