//! Entity storage.
//!
//! Handlers reach persistence only through [`EntityStore`]. Each call is its
//! own unit of work: a create either commits every column or nothing.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageType};
use crate::entities::{FormEntity, Prison};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqlitePrisonStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The write was rejected by a data constraint (duplicate key, check, ...).
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Entity not found: {0}")]
    NotFound(Uuid),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage failure: {0}")]
    Unexpected(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => StorageError::Integrity(err.to_string()),
                _ => StorageError::Unexpected(err.to_string()),
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StorageError::Corrupt(err.to_string())
            }
            _ => StorageError::Unexpected(err.to_string()),
        }
    }
}

/// CRUD contract of the entity store.
#[async_trait]
pub trait EntityStore<E: FormEntity>: Send + Sync {
    /// Persist a new entity atomically.
    async fn create(&self, entity: E) -> Result<()>;

    /// Every stored entity, in the store's natural order.
    async fn list_all(&self) -> Result<Vec<E>>;

    /// Fetch one entity or fail with [`StorageError::NotFound`].
    async fn get_by_id(&self, id: Uuid) -> Result<E>;
}

/// Initialize the prison store based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn EntityStore<Prison>>> {
    match config.storage_type {
        StorageType::Memory => {
            info!(storage_type = "memory", "Storage initialized");
            Ok(Arc::new(MemoryStore::<Prison>::new()))
        }
        StorageType::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                let store = SqlitePrisonStore::connect(&config.dsn).await?;
                store.init().await?;
                info!(storage_type = "sqlite", dsn = %config.dsn, "Storage initialized");
                Ok(Arc::new(store))
            }

            #[cfg(not(feature = "sqlite"))]
            {
                tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
                Err(StorageError::Unexpected(
                    "SQLite support requires the 'sqlite' feature".to_string(),
                ))
            }
        }
    }
}
