use chrono::Local;
use serde::{Deserialize, Serialize};

use super::label::BinaryClass;

/// Timestamp layout stored in the history table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome of one classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class: BinaryClass,
    pub label: String,
    /// Raw positive-class probability from the model
    pub probability: f64,
    /// Probability of `class`, unrounded
    pub confidence: f64,
}

impl Prediction {
    /// Confidence as a fraction rounded to 4 decimals (API response form).
    pub fn confidence_fraction(&self) -> f64 {
        round_to(self.confidence, 4)
    }

    /// Confidence as a percentage rounded to 2 decimals (history form).
    pub fn confidence_percent(&self) -> f64 {
        round_to(self.confidence * 100.0, 2)
    }
}

/// History row awaiting insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPredictionRecord {
    pub roll_number: String,
    pub image_name: String,
    pub confidence: f64,
    pub label: String,
    pub timestamp: String,
}

impl NewPredictionRecord {
    pub fn from_prediction(
        prediction: &Prediction,
        roll_number: impl Into<String>,
        image_name: impl Into<String>,
    ) -> Self {
        Self {
            roll_number: roll_number.into(),
            image_name: image_name.into(),
            confidence: prediction.confidence_percent(),
            label: prediction.label.clone(),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Stored history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub roll_number: String,
    pub image_name: String,
    /// Percentage, 0 to 100
    pub confidence: f64,
    pub label: String,
    pub timestamp: String,
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
