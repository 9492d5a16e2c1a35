use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use tracing::{debug, warn};

use crate::api::{state::AppState, types::*};
use crate::services::PredictRequest;

pub const FILE_FIELD: &str = "file";
pub const ROLL_NUMBER_FIELD: &str = "roll_number";
const NO_FILE: &str = "No file sent";

/// POST /api/predict (multipart: `file`, optional `roll_number`)
pub async fn predict(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<PredictResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("rejected predict request: {e}");
        ApiError::bad_request(NO_FILE)
    })?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut roll_number: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("malformed multipart body: {e}");
        ApiError::bad_request(NO_FILE)
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                // A part without a filename is form text, not an upload.
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    debug!("ignoring `file` part without a filename");
                    continue;
                };
                let bytes = field.bytes().await.map_err(|e| {
                    warn!("failed reading upload: {e}");
                    ApiError::bad_request(NO_FILE)
                })?;
                upload = Some((file_name, bytes.to_vec()));
            }
            Some(ROLL_NUMBER_FIELD) => {
                roll_number = Some(field.text().await.map_err(|e| {
                    warn!("failed reading roll_number: {e}");
                    ApiError::bad_request("Invalid roll_number field")
                })?);
            }
            other => debug!("ignoring multipart field {:?}", other),
        }
    }

    let Some((image_name, image)) = upload else {
        return Err(ApiError::bad_request(NO_FILE));
    };

    let prediction = state
        .inference
        .predict(PredictRequest {
            image,
            image_name,
            roll_number,
        })
        .await?;

    Ok(Json(PredictResponse::from(&prediction)))
}
