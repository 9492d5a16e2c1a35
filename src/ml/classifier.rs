use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::preprocess::PreprocessedTensor;
use crate::config::ModelConfig;
use crate::error::{FakelensError, Result};

/// A trained binary classifier.
#[cfg_attr(test, mockall::automock)]
pub trait Classifier: Send + Sync {
    /// Probability of the positive class (index 1) for a single image.
    fn predict_proba(&self, input: &PreprocessedTensor) -> Result<f32>;

    /// Square input resolution the model expects.
    fn image_size(&self) -> usize;
}

/// Load the classifier selected by the checkpoint's file extension.
pub fn load_classifier(config: &ModelConfig) -> Result<Arc<dyn Classifier>> {
    let path = config.path.as_path();
    if !path.exists() {
        return Err(FakelensError::ModelUnavailable(format!(
            "Trained model not found. Ensure {} exists.",
            path.display()
        )));
    }

    let classifier: Arc<dyn Classifier> = if is_onnx(path) {
        load_onnx(path)?
    } else {
        Arc::new(super::cnn::CnnClassifier::load(path, &config.config_path)?)
    };
    info!(
        "Loaded classifier from {} (input {}x{})",
        path.display(),
        classifier.image_size(),
        classifier.image_size()
    );
    Ok(classifier)
}

fn is_onnx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("onnx"))
}

#[cfg(feature = "onnx")]
fn load_onnx(path: &Path) -> Result<Arc<dyn Classifier>> {
    Ok(Arc::new(super::onnx::OnnxClassifier::load(
        path,
        super::preprocess::IMAGE_SIZE,
    )?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(path: &Path) -> Result<Arc<dyn Classifier>> {
    Err(FakelensError::ModelUnavailable(format!(
        "{} is an ONNX model but this build lacks the `onnx` feature",
        path.display()
    )))
}
