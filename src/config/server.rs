//! Form and HTTP server configuration types.

use serde::Deserialize;

/// The form this process serves.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Unique form name, used as a subject token.
    pub name: String,
    pub description: String,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            name: "prisons".to_string(),
            description: String::new(),
        }
    }
}

/// HTTP read surface configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Serve the read-only HTTP endpoints.
    pub enabled: bool,
    /// Host to bind to.
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8084,
        }
    }
}
