//! ONNX inference wrapper (pure Rust via `tract-onnx`).
//!
//! Serves a classifier exported from another framework. The graph must take a
//! single `[1, size, size, 3]` f32 input and emit one sigmoid probability.

use std::path::Path;

use tract_onnx::prelude::*;

use super::classifier::Classifier;
use super::preprocess::{PreprocessedTensor, CHANNELS};
use crate::error::{FakelensError, Result};

#[derive(Clone)]
pub struct OnnxClassifier {
    plan: TypedRunnableModel<TypedModel>,
    input_shape: [usize; 4],
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("input_shape", &self.input_shape)
            .finish()
    }
}

impl OnnxClassifier {
    /// Load an ONNX model and specialize it to a `[1, size, size, 3]` input.
    pub fn load(path: &Path, image_size: usize) -> Result<Self> {
        if image_size == 0 {
            return Err(FakelensError::Validation(
                "image_size must be > 0".to_string(),
            ));
        }
        let input_shape = [1, image_size, image_size, CHANNELS];

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| FakelensError::Checkpoint(format!("onnx load failed: {e}")))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, image_size, image_size, CHANNELS)),
            )
            .map_err(|e| FakelensError::Checkpoint(format!("onnx input fact failed: {e}")))?;

        let plan = model
            .into_optimized()
            .map_err(|e| FakelensError::Checkpoint(format!("onnx optimize failed: {e}")))?
            .into_runnable()
            .map_err(|e| FakelensError::Checkpoint(format!("onnx runnable failed: {e}")))?;

        let classifier = Self { plan, input_shape };

        // Reject graphs that do not reduce to a single probability.
        let zeros = vec![0.0f32; input_shape.iter().product()];
        let out = classifier.run(&zeros)?;
        if out.len() != 1 {
            return Err(FakelensError::Checkpoint(format!(
                "onnx model must produce exactly one output value, got {}",
                out.len()
            )));
        }

        Ok(classifier)
    }

    fn run(&self, input: &[f32]) -> Result<Vec<f32>> {
        let tensor = tract_ndarray::ArrayD::<f32>::from_shape_vec(
            tract_ndarray::IxDyn(&self.input_shape),
            input.to_vec(),
        )
        .map_err(|e| FakelensError::Inference(format!("onnx input reshape failed: {e}")))?
        .into_tvalue();

        let outputs = self
            .plan
            .run(tvec!(tensor))
            .map_err(|e| FakelensError::Inference(format!("onnx run failed: {e}")))?;
        let first = outputs
            .first()
            .ok_or_else(|| FakelensError::Inference("onnx produced no outputs".to_string()))?;

        let arr = first
            .to_array_view::<f32>()
            .map_err(|e| FakelensError::Inference(format!("onnx output decode failed: {e}")))?;
        Ok(arr.iter().copied().collect())
    }
}

impl Classifier for OnnxClassifier {
    fn predict_proba(&self, input: &PreprocessedTensor) -> Result<f32> {
        if input.shape() != self.input_shape {
            return Err(FakelensError::Validation(format!(
                "onnx input shape mismatch: got {:?}, expected {:?}",
                input.shape(),
                self.input_shape
            )));
        }
        let out = self.run(input.as_slice())?;
        out.first()
            .copied()
            .ok_or_else(|| FakelensError::Inference("onnx output is empty".to_string()))
    }

    fn image_size(&self) -> usize {
        self.input_shape[1]
    }
}
