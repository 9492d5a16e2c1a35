use axum::{extract::State, Json};

use crate::api::{state::AppState, types::ApiError};
use crate::domain::PredictionRecord;

/// GET /api/history
pub async fn get_history(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<PredictionRecord>>, ApiError> {
    let rows = state.store.list_all().await?;
    Ok(Json(rows))
}
