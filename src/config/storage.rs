//! Entity store configuration types.

use serde::Deserialize;

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// SQLite database reached through `dsn`.
    #[default]
    Sqlite,
    /// Process-local store, lost on exit.
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// sqlx connection string.
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            dsn: "sqlite:local_db.sqlite?mode=rwc".to_string(),
        }
    }
}
