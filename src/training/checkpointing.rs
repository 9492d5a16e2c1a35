//! Best-model checkpointing and early stopping on a validation metric.

use std::path::{Path, PathBuf};

use burn::prelude::*;
use tracing::info;

use crate::error::{FakelensError, Result};
use crate::ml::cnn::{save_checkpoint, Cnn, CnnConfig};

/// Keeps a single checkpoint on disk: the best epoch so far.
pub struct BestModelCheckpoint {
    model_path: PathBuf,
    config_path: PathBuf,
}

impl BestModelCheckpoint {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(model_path: P, config_path: Q) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Overwrite the checkpoint and its architecture config.
    pub fn save<B: Backend>(&self, model: &Cnn<B>, config: &CnnConfig) -> Result<PathBuf> {
        let path = save_checkpoint(model, &self.model_path)?;
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        config.save(&self.config_path).map_err(|e| {
            FakelensError::Checkpoint(format!(
                "failed to write model config {}: {e}",
                self.config_path.display()
            ))
        })?;
        info!("Saved checkpoint to {:?}", path);
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingDecision {
    /// New best value; checkpoint this epoch.
    Improved,
    /// No improvement, patience not exhausted.
    Continue,
    /// Patience exhausted.
    Stop,
}

/// Stops when a maximized metric fails to improve for `patience` epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<f64>,
    best_epoch: usize,
    stale_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            best_epoch: 0,
            stale_epochs: 0,
        }
    }

    pub fn observe(&mut self, epoch: usize, value: f64) -> StoppingDecision {
        let improved = match self.best {
            None => true,
            Some(best) => value > best,
        };

        if improved {
            self.best = Some(value);
            self.best_epoch = epoch;
            self.stale_epochs = 0;
            return StoppingDecision::Improved;
        }

        self.stale_epochs += 1;
        if self.stale_epochs >= self.patience {
            StoppingDecision::Stop
        } else {
            StoppingDecision::Continue
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_improves() {
        let mut es = EarlyStopping::new(5);
        assert_eq!(es.observe(1, 0.0), StoppingDecision::Improved);
        assert_eq!(es.best(), Some(0.0));
    }

    #[test]
    fn test_stops_after_patience_stale_epochs() {
        let mut es = EarlyStopping::new(3);
        assert_eq!(es.observe(1, 0.6), StoppingDecision::Improved);
        assert_eq!(es.observe(2, 0.7), StoppingDecision::Improved);
        assert_eq!(es.observe(3, 0.7), StoppingDecision::Continue);
        assert_eq!(es.observe(4, 0.65), StoppingDecision::Continue);
        assert_eq!(es.observe(5, 0.69), StoppingDecision::Stop);
        assert_eq!(es.best_epoch(), 2);
        assert_eq!(es.best(), Some(0.7));
    }

    #[test]
    fn test_improvement_resets_patience() {
        let mut es = EarlyStopping::new(2);
        es.observe(1, 0.5);
        assert_eq!(es.observe(2, 0.4), StoppingDecision::Continue);
        assert_eq!(es.observe(3, 0.8), StoppingDecision::Improved);
        assert_eq!(es.observe(4, 0.8), StoppingDecision::Continue);
        assert_eq!(es.observe(5, 0.1), StoppingDecision::Stop);
        assert_eq!(es.best_epoch(), 3);
    }
}
