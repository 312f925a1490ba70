use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::dto::HealthCheckResponse;
use crate::state::AppState;

const DB_PING_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthCheckResponse>) {
    match tokio::time::timeout(DB_PING_TIMEOUT, atlas_db::ping(&state.db)).await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(HealthCheckResponse {
                status: "OK",
                message: "All Systems Normal",
            }),
        ),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "database health check failed");
            unhealthy()
        }
        Err(_) => {
            tracing::error!(timeout_secs = DB_PING_TIMEOUT.as_secs(), "database health check timed out");
            unhealthy()
        }
    }
}

fn unhealthy() -> (StatusCode, Json<HealthCheckResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(HealthCheckResponse {
            status: "Error",
            message: "Database Connection Error",
        }),
    )
}
