use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::ml::preprocess::IMAGE_SIZE;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Front-end directory served as the router fallback (skipped if missing)
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Request body limit for uploads; unset means unlimited
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("frontend")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            max_upload_bytes: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Message(format!("invalid bind address: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Checkpoint file (`.mpk` for the burn CNN, `.onnx` with the `onnx` feature)
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    /// Architecture config written next to the checkpoint by `train`
    #[serde(default = "default_model_config_path")]
    pub config_path: PathBuf,
    /// Index-to-label JSON written by `train`
    #[serde(default = "default_classes_path")]
    pub classes_path: PathBuf,
    /// Probabilities at or above this value select the positive class
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("saved_model/best_model.mpk")
}

fn default_model_config_path() -> PathBuf {
    PathBuf::from("saved_model/model_config.json")
}

fn default_classes_path() -> PathBuf {
    PathBuf::from("saved_model/classes.json")
}

fn default_threshold() -> f64 {
    0.5
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            config_path: default_model_config_path(),
            classes_path: default_classes_path(),
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://database/history.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// Subject identifier recorded when the request carries none
    #[serde(default = "default_roll_number")]
    pub default_roll_number: String,
}

fn default_roll_number() -> String {
    "711523BAM022".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            default_roll_number: default_roll_number(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Directory holding one sub-directory per class
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Fraction of each class held out for validation
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    /// Epochs without validation accuracy improvement before stopping
    #[serde(default = "default_patience")]
    pub patience: usize,
    #[serde(default = "default_dropout")]
    pub dropout: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub augmentation: AugmentationConfig,
}

fn default_dataset_dir() -> PathBuf {
    PathBuf::from("dataset")
}

fn default_image_size() -> usize {
    IMAGE_SIZE
}

fn default_batch_size() -> usize {
    32
}

fn default_epochs() -> usize {
    25
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_validation_split() -> f64 {
    0.2
}

fn default_patience() -> usize {
    5
}

fn default_dropout() -> f64 {
    0.5
}

fn default_seed() -> u64 {
    42
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset_dir: default_dataset_dir(),
            image_size: default_image_size(),
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            validation_split: default_validation_split(),
            patience: default_patience(),
            dropout: default_dropout(),
            seed: default_seed(),
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.image_size < crate::ml::cnn::MIN_IMAGE_SIZE {
            return Err(format!(
                "image_size {} is too small for three conv/pool stages",
                self.image_size
            ));
        }
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.epochs == 0 {
            return Err("epochs must be > 0".to_string());
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(format!(
                "validation_split must be in (0, 1), got {}",
                self.validation_split
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err("learning_rate must be finite and > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AugmentationConfig {
    #[serde(default = "default_true")]
    pub horizontal_flip: bool,
    /// Maximum absolute rotation in degrees
    #[serde(default = "default_rotation_degrees")]
    pub rotation_degrees: f32,
    /// Zoom factor is drawn from `[1 - zoom_range, 1 + zoom_range]` per axis
    #[serde(default = "default_zoom_range")]
    pub zoom_range: f32,
}

fn default_true() -> bool {
    true
}

fn default_rotation_degrees() -> f32 {
    10.0
}

fn default_zoom_range() -> f32 {
    0.1
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            horizontal_flip: true,
            rotation_degrees: default_rotation_degrees(),
            zoom_range: default_zoom_range(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("model.threshold", 0.5)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("FAKELENS_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (FAKELENS_SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("FAKELENS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.model.threshold > 0.0 && self.model.threshold < 1.0) {
            return Err(ConfigError::Message(format!(
                "model.threshold must be in (0, 1), got {}",
                self.model.threshold
            )));
        }
        self.training.validate().map_err(ConfigError::Message)
    }
}
