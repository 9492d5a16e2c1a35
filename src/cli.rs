use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

use crate::adapters::SqliteStore;
use crate::config::AppConfig;
use crate::domain::{LabelMap, Prediction, PredictionRecord};
use crate::error::Result;
use crate::ml::{load_classifier, preprocess_image};
use crate::services::classify;

#[derive(Parser)]
#[command(name = "fakelens")]
#[command(author = "Fakelens Team")]
#[command(version = "0.1.0")]
#[command(about = "Real vs fake image classifier: train, serve and predict", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml, <FAKELENS_ENV>.toml)
    #[arg(short, long, default_value = "config", global = true)]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP prediction API
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Classify a single image file
    Predict {
        /// Path to image file
        #[arg(short, long)]
        image: PathBuf,
        /// Path to model file (overrides model.path)
        #[arg(short, long)]
        model: Option<PathBuf>,
        /// Path to classes json (overrides model.classes_path)
        #[arg(long)]
        classes: Option<PathBuf>,
    },
    /// Train the CNN on a directory-per-class dataset
    Train {
        /// Dataset root (overrides training.dataset_dir)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
        /// Maximum epochs (overrides training.epochs)
        #[arg(short, long)]
        epochs: Option<usize>,
        /// Batch size (overrides training.batch_size)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Show prediction history, most recent first
    History,
    /// Create the history database and schema
    InitDb,
}

/// Classify one image file without touching history.
pub fn predict_file(config: &AppConfig, image: &Path) -> Result<Prediction> {
    let classifier = load_classifier(&config.model)?;
    let labels = LabelMap::load_or_default(&config.model.classes_path)?;

    let bytes = std::fs::read(image)?;
    let input = preprocess_image(&bytes, classifier.image_size())?;
    let probability = classifier.predict_proba(&input)?;

    Ok(classify(probability as f64, config.model.threshold, &labels))
}

pub fn format_prediction(prediction: &Prediction) -> String {
    format!(
        "Prediction: {} ({:.2}%)",
        prediction.label,
        prediction.confidence * 100.0
    )
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Roll number")]
    roll_number: String,
    #[tabled(rename = "Image")]
    image_name: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
}

impl From<PredictionRecord> for HistoryRow {
    fn from(r: PredictionRecord) -> Self {
        Self {
            id: r.id,
            roll_number: r.roll_number,
            image_name: r.image_name,
            label: r.label,
            confidence: format!("{:.2}%", r.confidence),
            timestamp: r.timestamp,
        }
    }
}

pub fn render_history(records: Vec<PredictionRecord>) -> String {
    if records.is_empty() {
        return "No predictions recorded yet.".to_string();
    }
    let rows: Vec<HistoryRow> = records.into_iter().map(HistoryRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub async fn show_history(store: &SqliteStore) -> Result<()> {
    let records = store.list_all().await?;
    println!("{}", render_history(records));
    Ok(())
}
