//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod messaging;
mod server;
mod storage;

pub use messaging::{MessagingConfig, MessagingType, NatsConfig};
pub use server::{FormConfig, ServerConfig};
pub use storage::{StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "FORMBUS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "FORMBUS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "FORMBUS_LOG";

use serde::Deserialize;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The form served by this process.
    pub form: FormConfig,
    /// HTTP read surface.
    pub server: ServerConfig,
    /// Broker configuration.
    pub messaging: MessagingConfig,
    /// Entity store configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("messaging.nats.servers")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !crate::subject::is_valid_token(&self.form.name) {
            return Err(ConfigError::Invalid(format!(
                "form name '{}' must be a single subject token",
                self.form.name
            )));
        }
        if self.messaging.nats.max_deliver == 0 {
            return Err(ConfigError::Invalid(
                "messaging.nats.max_deliver must be at least 1".to_string(),
            ));
        }
        if self.messaging.messaging_type == MessagingType::Nats
            && self.messaging.nats.servers.is_empty()
        {
            return Err(ConfigError::Invalid(
                "messaging.nats.servers must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Create config for testing: in-process bus and in-memory store.
    pub fn for_test() -> Self {
        Self {
            messaging: MessagingConfig {
                messaging_type: MessagingType::Channel,
                ..Default::default()
            },
            storage: StorageConfig {
                storage_type: StorageType::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
