//! Prediction orchestration: preprocess, classify, threshold, record.

use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::SqliteStore;
use crate::config::AppConfig;
use crate::domain::{BinaryClass, LabelMap, NewPredictionRecord, Prediction};
use crate::error::{FakelensError, Result};
use crate::ml::{load_classifier, preprocess_image, Classifier};

/// Classifier slot filled once at startup.
#[derive(Clone)]
pub enum ModelState {
    Ready(Arc<dyn Classifier>),
    /// Loading failed; every prediction reports this reason.
    Unavailable(String),
}

impl ModelState {
    pub fn load(config: &AppConfig) -> Self {
        match load_classifier(&config.model) {
            Ok(classifier) => Self::Ready(classifier),
            Err(e) => {
                warn!("Classifier unavailable, predictions will fail: {e}");
                Self::Unavailable(e.to_string())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Image upload to classify.
#[derive(Debug, Clone)]
pub struct PredictRequest {
    pub image: Vec<u8>,
    pub image_name: String,
    pub roll_number: Option<String>,
}

pub struct InferenceService {
    model: ModelState,
    labels: LabelMap,
    store: Arc<SqliteStore>,
    threshold: f64,
    default_roll_number: String,
}

impl InferenceService {
    pub fn new(
        model: ModelState,
        labels: LabelMap,
        store: Arc<SqliteStore>,
        threshold: f64,
        default_roll_number: impl Into<String>,
    ) -> Self {
        Self {
            model,
            labels,
            store,
            threshold,
            default_roll_number: default_roll_number.into(),
        }
    }

    /// Load classifier and label map as configured.
    pub fn from_config(config: &AppConfig, store: Arc<SqliteStore>) -> Result<Self> {
        let labels = LabelMap::load_or_default(&config.model.classes_path)?;
        info!(
            "Labels: 0 => {}, 1 => {}",
            labels.label(BinaryClass::Negative),
            labels.label(BinaryClass::Positive)
        );
        Ok(Self::new(
            ModelState::load(config),
            labels,
            store,
            config.model.threshold,
            config.inference.default_roll_number.clone(),
        ))
    }

    pub fn model_state(&self) -> &ModelState {
        &self.model
    }

    /// Classify an image and append it to history.
    pub async fn predict(&self, request: PredictRequest) -> Result<Prediction> {
        let classifier = match &self.model {
            ModelState::Ready(c) => Arc::clone(c),
            ModelState::Unavailable(reason) => {
                return Err(FakelensError::ModelUnavailable(reason.clone()))
            }
        };

        let image = request.image;
        let probability = tokio::task::spawn_blocking(move || {
            let input = preprocess_image(&image, classifier.image_size())?;
            classifier.predict_proba(&input)
        })
        .await
        .map_err(|e| FakelensError::Internal(format!("inference task failed: {e}")))??;

        let prediction = classify(probability as f64, self.threshold, &self.labels);

        let roll_number = request
            .roll_number
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| self.default_roll_number.clone());
        let record =
            NewPredictionRecord::from_prediction(&prediction, roll_number, request.image_name);
        self.store.append(&record).await?;

        info!(
            "Prediction: {} ({:.2}%)",
            prediction.label,
            prediction.confidence * 100.0
        );
        Ok(prediction)
    }
}

/// Threshold a positive-class probability and resolve its label.
pub fn classify(probability: f64, threshold: f64, labels: &LabelMap) -> Prediction {
    let class = BinaryClass::from_probability(probability, threshold);
    Prediction {
        class,
        label: labels.label(class).to_string(),
        probability,
        confidence: class.confidence(probability),
    }
}
