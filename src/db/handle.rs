use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::sqlite::LibraryStorage;
use crate::error::AppError;

/// Process-wide database handle.
///
/// Starts out disconnected and is filled in exactly once when the startup
/// connection succeeds. A failed connection is logged and never retried; data
/// routes then answer with [`AppError::DatabaseUnavailable`].
#[derive(Clone, Default)]
pub struct Database {
    storage: Arc<OnceLock<LibraryStorage>>,
}

impl Database {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.storage.get().is_some()
    }

    pub fn storage(&self) -> Result<&LibraryStorage, AppError> {
        self.storage.get().ok_or(AppError::DatabaseUnavailable)
    }

    /// Open the pool and install the schema.
    pub async fn connect(&self, database_url: &str) -> Result<(), AppError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        let storage = LibraryStorage::new(pool);
        storage.init_schema().await?;

        // A second successful connect keeps the first pool.
        if let Err(extra) = self.storage.set(storage) {
            warn!("database already connected; closing the new pool");
            extra.close().await;
        }
        Ok(())
    }

    /// Connect in the background so a dead database never blocks startup.
    pub fn spawn_connect(&self, database_url: String) -> JoinHandle<()> {
        let db = self.clone();
        tokio::spawn(async move {
            match db.connect(&database_url).await {
                Ok(()) => {
                    info!("------------------------------");
                    info!("Database connected!");
                }
                Err(e) => {
                    error!(error = %e, "Connection failed!");
                }
            }
        })
    }
}
