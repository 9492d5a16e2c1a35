//! Image preprocessing, augmentation and the classifier backends.
//!
//! The burn CNN is always available; ONNX graphs can be served with the
//! `onnx` feature.

pub mod augment;
pub mod classifier;
pub mod cnn;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod preprocess;

pub use classifier::{load_classifier, Classifier};
pub use cnn::{Cnn, CnnClassifier, CnnConfig, InferenceBackend};
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;
pub use preprocess::{preprocess_image, PreprocessedTensor, IMAGE_SIZE};
