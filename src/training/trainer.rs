//! Training Loop
//!
//! Fits the CNN with Adam on binary cross-entropy, validates every epoch,
//! keeps the best checkpoint by validation accuracy and stops early.

use std::path::PathBuf;

use burn::backend::{Autodiff, NdArray};
use burn::data::dataloader::batcher::Batcher;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use super::checkpointing::{BestModelCheckpoint, EarlyStopping, StoppingDecision};
use super::dataset::{load_item, DatasetSplit, ImageBatch, ImageBatcher, ImageItem};
use crate::config::{ModelConfig, TrainingConfig};
use crate::error::{FakelensError, Result};
use crate::ml::cnn::{Cnn, CnnConfig};

/// Backend used by the `train` command.
pub type TrainBackend = Autodiff<NdArray>;

const EPS: f32 = 1e-7;

/// Metrics for one epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub valid_loss: f64,
    pub valid_accuracy: f64,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub class_names: [String; 2],
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_valid_accuracy: f64,
    pub stopped_early: bool,
    pub model_path: PathBuf,
    pub history: Vec<EpochStats>,
}

/// Mean binary cross-entropy of probabilities against 0/1 targets.
pub fn binary_cross_entropy<B: Backend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let probs = probs.clamp(EPS, 1.0 - EPS);
    let positive = targets.clone() * probs.clone().log();
    let negative = targets.neg().add_scalar(1.0) * probs.neg().add_scalar(1.0).log();
    (positive + negative).mean().neg()
}

/// Count of predictions on the right side of 0.5.
fn correct_predictions<B: Backend>(probs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Result<usize> {
    let probs = probs
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| FakelensError::Internal(format!("probability readback failed: {e:?}")))?;
    let targets = targets
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| FakelensError::Internal(format!("target readback failed: {e:?}")))?;
    Ok(probs
        .iter()
        .zip(targets.iter())
        .filter(|(p, t)| (**p >= 0.5) == (**t >= 0.5))
        .count())
}

#[derive(Default)]
struct Running {
    loss_sum: f64,
    correct: usize,
    seen: usize,
}

impl Running {
    fn add(&mut self, batch_loss: f64, correct: usize, batch_size: usize) {
        self.loss_sum += batch_loss * batch_size as f64;
        self.correct += correct;
        self.seen += batch_size;
    }

    fn loss(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.loss_sum / self.seen as f64
        }
    }

    fn accuracy(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.correct as f64 / self.seen as f64
        }
    }
}

pub struct Trainer<'a> {
    config: &'a TrainingConfig,
    artifacts: &'a ModelConfig,
}

impl<'a> Trainer<'a> {
    pub fn new(config: &'a TrainingConfig, artifacts: &'a ModelConfig) -> Self {
        Self { config, artifacts }
    }

    /// Run the full pipeline: scan, write labels, fit, checkpoint.
    pub fn run<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainingSummary> {
        self.config.validate().map_err(FakelensError::Validation)?;

        let split = DatasetSplit::from_directory(&self.config.dataset_dir, self.config.validation_split)?;
        split.label_map().save(&self.artifacts.classes_path)?;
        info!(
            "Saved class mapping to {}",
            self.artifacts.classes_path.display()
        );

        B::seed(self.config.seed);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let model_config = CnnConfig::new()
            .with_image_size(self.config.image_size)
            .with_dropout(self.config.dropout);
        let mut model: Cnn<B> = model_config.init(&device);
        let mut optim = AdamConfig::new().init::<B, Cnn<B>>();

        let checkpoint = BestModelCheckpoint::new(&self.artifacts.path, &self.artifacts.config_path);
        let mut stopping = EarlyStopping::new(self.config.patience);
        let mut best_model = model.clone();
        let mut history = Vec::with_capacity(self.config.epochs);
        let mut stopped_early = false;

        let train_batcher = ImageBatcher::<B>::new(device.clone());
        let valid_batcher = ImageBatcher::<B::InnerBackend>::new(device.clone());
        let mut train_items = split.train.clone();

        for epoch in 1..=self.config.epochs {
            train_items.shuffle(&mut rng);

            let mut train = Running::default();
            for (step, chunk) in train_items.chunks(self.config.batch_size).enumerate() {
                let Some(batch) = self.load_batch(chunk, &train_batcher, true, &mut rng) else {
                    continue;
                };
                let n = batch.targets.dims()[0];

                let probs = model.forward(batch.images);
                let loss = binary_cross_entropy(probs.clone(), batch.targets.clone());
                let loss_value: f32 = loss.clone().into_scalar().elem();
                let correct = correct_predictions(probs.inner(), batch.targets.inner())?;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(self.config.learning_rate, model, grads);

                train.add(loss_value as f64, correct, n);
                debug!(epoch, step, loss = loss_value, "train batch");
            }

            let valid = self.evaluate(&model.valid(), &split.valid, &valid_batcher, &mut rng)?;
            let stats = EpochStats {
                epoch,
                train_loss: train.loss(),
                train_accuracy: train.accuracy(),
                valid_loss: valid.loss(),
                valid_accuracy: valid.accuracy(),
            };
            info!(
                "Epoch {}/{}: loss={:.4} accuracy={:.4} val_loss={:.4} val_accuracy={:.4}",
                epoch,
                self.config.epochs,
                stats.train_loss,
                stats.train_accuracy,
                stats.valid_loss,
                stats.valid_accuracy
            );
            history.push(stats);

            match stopping.observe(epoch, valid.accuracy()) {
                StoppingDecision::Improved => {
                    info!("val_accuracy improved to {:.4}", valid.accuracy());
                    checkpoint.save(&model, &model_config)?;
                    best_model = model.clone();
                }
                StoppingDecision::Continue => {}
                StoppingDecision::Stop => {
                    info!(
                        "Early stopping at epoch {}: no val_accuracy improvement for {} epochs",
                        epoch, self.config.patience
                    );
                    stopped_early = true;
                    break;
                }
            }
        }

        // Restore the best weights and write them as the final artifact.
        let model_path = checkpoint.save(&best_model, &model_config)?;
        info!(
            "Training complete. Best model (epoch {}) saved to {}",
            stopping.best_epoch(),
            model_path.display()
        );

        Ok(TrainingSummary {
            class_names: split.class_names,
            epochs_run: history.len(),
            best_epoch: stopping.best_epoch(),
            best_valid_accuracy: stopping.best().unwrap_or(0.0),
            stopped_early,
            model_path,
            history,
        })
    }

    fn load_batch<B: Backend>(
        &self,
        chunk: &[ImageItem],
        batcher: &ImageBatcher<B>,
        augment: bool,
        rng: &mut StdRng,
    ) -> Option<ImageBatch<B>> {
        let augmentation = augment.then_some(&self.config.augmentation);
        let items: Vec<_> = chunk
            .iter()
            .filter_map(|item| load_item(item, self.config.image_size, augmentation, rng))
            .collect();
        if items.is_empty() {
            return None;
        }
        Some(batcher.batch(items))
    }

    fn evaluate<B: Backend>(
        &self,
        model: &Cnn<B>,
        items: &[ImageItem],
        batcher: &ImageBatcher<B>,
        rng: &mut StdRng,
    ) -> Result<Running> {
        let mut running = Running::default();
        for chunk in items.chunks(self.config.batch_size) {
            let Some(batch) = self.load_batch(chunk, batcher, false, rng) else {
                continue;
            };
            let n = batch.targets.dims()[0];
            let probs = model.forward(batch.images);
            let loss: f32 = binary_cross_entropy(probs.clone(), batch.targets.clone())
                .into_scalar()
                .elem();
            let correct = correct_predictions(probs, batch.targets)?;
            running.add(loss as f64, correct, n);
        }
        Ok(running)
    }
}

/// Train on the CPU ndarray backend.
pub fn train(config: &TrainingConfig, artifacts: &ModelConfig) -> Result<TrainingSummary> {
    Trainer::new(config, artifacts).run::<TrainBackend>(Default::default())
}
