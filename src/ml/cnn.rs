//! Convolutional real/fake classifier built on `burn`.
//!
//! Three conv(3x3) + max-pool(2x2) stages of 32, 64 and 128 filters, a dense
//! layer of 256 units, dropout and a single sigmoid output.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use burn::backend::NdArray;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::activation::sigmoid;
use burn::tensor::ElementConversion;
use tracing::{info, warn};

use super::classifier::Classifier;
use super::preprocess::{PreprocessedTensor, CHANNELS, IMAGE_SIZE};
use crate::error::FakelensError;

/// Backend used for serving.
pub type InferenceBackend = NdArray;

const CONV_FILTERS: [usize; 3] = [32, 64, 128];
const KERNEL: usize = 3;
const HIDDEN_UNITS: usize = 256;

/// Smallest input that survives three conv + pool stages.
pub const MIN_IMAGE_SIZE: usize = 24;

/// Architecture hyperparameters, saved next to the checkpoint.
#[derive(Config, Debug)]
pub struct CnnConfig {
    /// Square input resolution
    #[config(default = "128")]
    pub image_size: usize,
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl Default for CnnConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CnnConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.image_size < MIN_IMAGE_SIZE {
            return Err(format!(
                "image_size {} is below the minimum of {}",
                self.image_size, MIN_IMAGE_SIZE
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        Ok(())
    }

    /// Spatial size after the three valid-padding conv + pool stages.
    pub fn feature_map_size(&self) -> usize {
        CONV_FILTERS
            .iter()
            .fold(self.image_size, |size, _| (size - (KERNEL - 1)) / 2)
    }

    pub fn flattened_features(&self) -> usize {
        let side = self.feature_map_size();
        CONV_FILTERS[2] * side * side
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Cnn<B> {
        let conv = |i: usize, o: usize| Conv2dConfig::new([i, o], [KERNEL, KERNEL]).init(device);

        Cnn {
            conv1: conv(CHANNELS, CONV_FILTERS[0]),
            conv2: conv(CONV_FILTERS[0], CONV_FILTERS[1]),
            conv3: conv(CONV_FILTERS[1], CONV_FILTERS[2]),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc: LinearConfig::new(self.flattened_features(), HIDDEN_UNITS).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(HIDDEN_UNITS, 1).init(device),
            activation: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct Cnn<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    fc: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> Cnn<B> {
    /// `images` is `[batch, height, width, channels]`; returns `[batch, 1]`
    /// positive-class probabilities.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // NHWC -> NCHW
        let x = images.swap_dims(1, 3).swap_dims(2, 3);

        let x = self.pool.forward(self.activation.forward(self.conv1.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv3.forward(x)));

        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = self.activation.forward(self.fc.forward(x));
        let x = self.dropout.forward(x);
        sigmoid(self.output.forward(x))
    }
}

/// Stack NHWC pixel buffers into a batch tensor.
pub fn images_to_tensor<B: Backend>(
    pixels: &[f32],
    batch: usize,
    size: usize,
    device: &B::Device,
) -> Tensor<B, 4> {
    Tensor::<B, 1>::from_floats(pixels, device).reshape([batch, size, size, CHANNELS])
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Write model weights to `path` (extension forced to `.mpk`).
pub fn save_checkpoint<B: Backend>(model: &Cnn<B>, path: &Path) -> crate::error::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder())
        .map_err(|e| FakelensError::Checkpoint(format!("failed to save {}: {e}", path.display())))?;
    Ok(path.with_extension("mpk"))
}

pub fn load_checkpoint<B: Backend>(
    config: &CnnConfig,
    path: &Path,
    device: &B::Device,
) -> crate::error::Result<Cnn<B>> {
    let record = recorder()
        .load(path.to_path_buf(), device)
        .map_err(|e| FakelensError::Checkpoint(format!("failed to load {}: {e}", path.display())))?;
    Ok(config.init::<B>(device).load_record(record))
}

/// Serving wrapper around a loaded [`Cnn`].
pub struct CnnClassifier {
    model: Mutex<Cnn<InferenceBackend>>,
    config: CnnConfig,
    device: <InferenceBackend as Backend>::Device,
}

impl CnnClassifier {
    pub fn new(model: Cnn<InferenceBackend>, config: CnnConfig) -> Self {
        Self {
            model: Mutex::new(model),
            config,
            device: Default::default(),
        }
    }

    /// Load weights, rebuilding the architecture from `config_path` when present.
    pub fn load(model_path: &Path, config_path: &Path) -> crate::error::Result<Self> {
        let config = if config_path.exists() {
            CnnConfig::load(config_path).map_err(|e| {
                FakelensError::Checkpoint(format!(
                    "invalid model config {}: {e}",
                    config_path.display()
                ))
            })?
        } else {
            warn!(
                "Model config {} not found, assuming {}x{} input",
                config_path.display(),
                IMAGE_SIZE,
                IMAGE_SIZE
            );
            CnnConfig::new()
        };
        config.validate().map_err(|e| {
            FakelensError::Checkpoint(format!(
                "invalid model config {}: {e}",
                config_path.display()
            ))
        })?;

        let device = Default::default();
        let model = load_checkpoint::<InferenceBackend>(&config, model_path, &device)?;
        info!(
            "CNN checkpoint loaded: {} ({} flattened features)",
            model_path.display(),
            config.flattened_features()
        );
        Ok(Self::new(model, config))
    }
}

impl Classifier for CnnClassifier {
    fn predict_proba(&self, input: &PreprocessedTensor) -> crate::error::Result<f32> {
        if input.size() != self.config.image_size {
            return Err(FakelensError::Validation(format!(
                "input is {}x{}, model expects {}x{}",
                input.size(),
                input.size(),
                self.config.image_size,
                self.config.image_size
            )));
        }

        let images =
            images_to_tensor::<InferenceBackend>(input.as_slice(), 1, input.size(), &self.device);
        let model = self
            .model
            .lock()
            .map_err(|_| FakelensError::Inference("model lock poisoned".to_string()))?;
        let output = model.forward(images);
        drop(model);

        let probability: f32 = output.into_scalar().elem();
        if !probability.is_finite() {
            return Err(FakelensError::Inference(format!(
                "model produced non-finite probability {probability}"
            )));
        }
        Ok(probability)
    }

    fn image_size(&self) -> usize {
        self.config.image_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::preprocess::{preprocess_image, test_images::rgb_png};

    fn small_config() -> CnnConfig {
        CnnConfig::new().with_image_size(32)
    }

    #[test]
    fn test_feature_map_size() {
        // 128 -> 126 -> 63 -> 61 -> 30 -> 28 -> 14
        assert_eq!(CnnConfig::new().feature_map_size(), 14);
        assert_eq!(CnnConfig::new().flattened_features(), 128 * 14 * 14);
        // 32 -> 30 -> 15 -> 13 -> 6 -> 4 -> 2
        assert_eq!(small_config().feature_map_size(), 2);
    }

    #[test]
    fn test_forward_shape_and_range() {
        let device = Default::default();
        let model = small_config().init::<InferenceBackend>(&device);
        let pixels = vec![0.5f32; 2 * 32 * 32 * 3];
        let images = images_to_tensor::<InferenceBackend>(&pixels, 2, 32, &device);

        let output = model.forward(images);
        assert_eq!(output.dims(), [2, 1]);
        let values = output.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|p| *p > 0.0 && *p < 1.0));
    }

    #[test]
    fn test_checkpoint_roundtrip_preserves_predictions() {
        let dir = std::env::temp_dir().join(format!("fakelens-cnn-{}", uuid::Uuid::new_v4()));
        let model_path = dir.join("best_model.mpk");
        let config_path = dir.join("model_config.json");
        let config = small_config();

        let device = Default::default();
        let model = config.init::<InferenceBackend>(&device);
        save_checkpoint(&model, &model_path).unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        config.save(&config_path).unwrap();

        let input = preprocess_image(&rgb_png(40, 40, [10, 200, 30]), 32).unwrap();
        let expected = CnnClassifier::new(model, small_config())
            .predict_proba(&input)
            .unwrap();

        let loaded = CnnClassifier::load(&model_path, &config_path).unwrap();
        assert_eq!(loaded.image_size(), 32);
        let actual = loaded.predict_proba(&input).unwrap();
        assert!((expected - actual).abs() < 1e-6);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_undersized_model_config_rejected() {
        let dir = std::env::temp_dir().join(format!("fakelens-cnn-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let model_path = dir.join("best_model.mpk");
        let config_path = dir.join("model_config.json");

        let device = Default::default();
        save_checkpoint(&small_config().init::<InferenceBackend>(&device), &model_path).unwrap();
        CnnConfig::new().with_image_size(16).save(&config_path).unwrap();

        let err = CnnClassifier::load(&model_path, &config_path).err().unwrap();
        assert!(matches!(err, FakelensError::Checkpoint(_)));
        assert!(err.to_string().contains("image_size 16"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_validation_bounds() {
        assert!(CnnConfig::new().with_image_size(MIN_IMAGE_SIZE).validate().is_ok());
        assert!(CnnConfig::new().with_image_size(MIN_IMAGE_SIZE - 1).validate().is_err());
        assert!(CnnConfig::new().with_dropout(1.0).validate().is_err());
    }

    #[test]
    fn test_wrong_input_size_rejected() {
        let device = Default::default();
        let classifier = CnnClassifier::new(small_config().init(&device), small_config());
        let input = preprocess_image(&rgb_png(8, 8, [0, 0, 0]), 64).unwrap();
        assert!(matches!(
            classifier.predict_proba(&input),
            Err(FakelensError::Validation(_))
        ));
    }
}
