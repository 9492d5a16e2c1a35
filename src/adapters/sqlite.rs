use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

use crate::domain::{NewPredictionRecord, PredictionRecord};
use crate::error::Result;

/// SQLite-backed prediction history
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database and apply the schema.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db_file = options.clone().get_filename();
        ensure_parent_dir(&db_file)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!("Connected to SQLite at {}", database_url);
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database, kept alive on a single connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run migrations; safe to repeat.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("History schema ready");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert one history row and return its id.
    #[instrument(skip(self, record), fields(label = %record.label))]
    pub async fn append(&self, record: &NewPredictionRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO history (roll_number, image_name, confidence, label, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.roll_number)
        .bind(&record.image_name)
        .bind(record.confidence)
        .bind(&record.label)
        .bind(&record.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All history rows, most recent first.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<PredictionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, roll_number, image_name, confidence, label, timestamp
            FROM history
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(row_to_record)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

fn row_to_record(row: &SqliteRow) -> std::result::Result<PredictionRecord, sqlx::Error> {
    Ok(PredictionRecord {
        id: row.try_get("id")?,
        roll_number: row.try_get("roll_number")?,
        image_name: row.try_get("image_name")?,
        confidence: row.try_get("confidence")?,
        label: row.try_get("label")?,
        timestamp: row.try_get("timestamp")?,
    })
}

fn ensure_parent_dir(db_file: &Path) -> Result<()> {
    if db_file.as_os_str().is_empty() || db_file == Path::new(":memory:") {
        return Ok(());
    }
    if let Some(parent) = db_file.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            info!("Created database directory {}", parent.display());
        }
    }
    Ok(())
}
