pub mod inference;

pub use inference::{classify, InferenceService, ModelState, PredictRequest};
