use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::adapters::SqliteStore;
use crate::services::InferenceService;

/// Shared application state for API handlers, built once at startup.
#[derive(Clone)]
pub struct AppState {
    /// History database
    pub store: Arc<SqliteStore>,

    /// Loaded classifier, labels and thresholding policy
    pub inference: Arc<InferenceService>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>, inference: Arc<InferenceService>) -> Self {
        Self {
            store,
            inference,
            start_time: Utc::now(),
        }
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
