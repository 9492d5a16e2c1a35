//! Training Infrastructure
//!
//! Dataset loading, the fit loop, checkpointing and early stopping.

pub mod checkpointing;
pub mod dataset;
pub mod trainer;

pub use checkpointing::{BestModelCheckpoint, EarlyStopping, StoppingDecision};
pub use dataset::{DatasetSplit, ImageBatch, ImageBatcher, ImageItem};
pub use trainer::{train, EpochStats, Trainer, TrainBackend, TrainingSummary};
