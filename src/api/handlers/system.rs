use axum::{extract::State, http::StatusCode, Json};

use crate::api::{state::AppState, types::*};

/// GET /health -- lightweight liveness/readiness probe
pub async fn health_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let db_ok = state.store.ping().await;
    let model_ok = state.inference.model_state().is_ready();

    let resp = HealthResponse {
        status: if db_ok && model_ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        db: if db_ok { "connected" } else { "disconnected" }.to_string(),
        model: if model_ok { "loaded" } else { "unavailable" }.to_string(),
        uptime_secs: state.uptime_seconds(),
    };

    if db_ok {
        Ok(Json(resp))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(resp)))
    }
}
