use clap::Parser;
use fakelens::adapters::SqliteStore;
use fakelens::api::{create_app, AppState};
use fakelens::cli::{self, Cli, Commands};
use fakelens::config::AppConfig;
use fakelens::error::{FakelensError, Result};
use fakelens::services::InferenceService;
use fakelens::training;
use std::sync::Arc;
use tracing::{error, info};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config)?;

    match cli.command {
        Commands::Serve { host, port } => {
            init_logging(&config.logging);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await?;
        }
        Commands::Predict {
            image,
            model,
            classes,
        } => {
            init_logging_simple();
            if let Some(model) = model {
                config.model.path = model;
            }
            if let Some(classes) = classes {
                config.model.classes_path = classes;
            }
            match cli::predict_file(&config, &image) {
                Ok(prediction) => println!("{}", cli::format_prediction(&prediction)),
                Err(e) => {
                    eprintln!("\x1b[31m✗ {e}\x1b[0m");
                    return Err(e);
                }
            }
        }
        Commands::Train {
            dataset,
            epochs,
            batch_size,
        } => {
            init_logging(&config.logging);
            if let Some(dataset) = dataset {
                config.training.dataset_dir = dataset;
            }
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.training.batch_size = batch_size;
            }
            run_training(config).await?;
        }
        Commands::History => {
            init_logging_simple();
            let store =
                SqliteStore::new(&config.database.url, config.database.max_connections).await?;
            cli::show_history(&store).await?;
        }
        Commands::InitDb => {
            init_logging(&config.logging);
            let store =
                SqliteStore::new(&config.database.url, config.database.max_connections).await?;
            info!(
                "History database ready at {} ({} rows)",
                config.database.url,
                store.count().await?
            );
        }
    }

    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    let addr = config.server.bind_addr()?;

    let store =
        Arc::new(SqliteStore::new(&config.database.url, config.database.max_connections).await?);
    info!("History database: {}", config.database.url);

    let inference = Arc::new(InferenceService::from_config(&config, Arc::clone(&store))?);
    if !inference.model_state().is_ready() {
        error!("Serving without a model; /api/predict will return errors until one is trained");
    }

    let app = create_app(AppState::new(store, inference), &config.server);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn run_training(config: AppConfig) -> Result<()> {
    info!(
        "Training on {} for up to {} epochs",
        config.training.dataset_dir.display(),
        config.training.epochs
    );

    // burn training is CPU-bound and synchronous
    let summary = tokio::task::spawn_blocking(move || {
        training::train(&config.training, &config.model)
    })
    .await
    .map_err(|e| FakelensError::Internal(format!("training task failed: {e}")))??;

    info!(
        "Training finished after {} epochs (best epoch {}, val accuracy {:.4}{}), model saved to {}",
        summary.epochs_run,
        summary.best_epoch,
        summary.best_valid_accuracy,
        if summary.stopped_early { ", stopped early" } else { "" },
        summary.model_path.display()
    );
    Ok(())
}
