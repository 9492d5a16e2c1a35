pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod ml;
pub mod services;
pub mod training;

pub use adapters::SqliteStore;
pub use api::{create_app, create_router, AppState};
pub use config::AppConfig;
pub use domain::{BinaryClass, LabelMap, Prediction, PredictionRecord};
pub use error::{FakelensError, Result};
pub use ml::{Classifier, PreprocessedTensor};
pub use services::{InferenceService, ModelState, PredictRequest};
