//! Client configuration loaded from TOML
//!
//! ```toml
//! [connection]
//! websocket_uri = "wss://api.example.com/runtime/session"
//! app_id = "my-app"
//!
//! [protocol]      # optional
//! [reconnect]     # optional
//! ```

use crate::connection::backoff::ReconnectPolicy;
use crate::connection::protocol::WireProtocol;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Main client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub connection: ConnectionSection,
    #[serde(default)]
    pub protocol: WireProtocol,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

/// Where to connect and as which application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    /// Base websocket URI (ws:// or wss://)
    pub websocket_uri: String,
    /// Application identifier (must match [a-zA-Z0-9._-]+)
    pub app_id: String,
    /// Query parameter carrying the application identifier
    #[serde(default = "default_app_id_param")]
    pub app_id_param: String,
}

fn default_app_id_param() -> String {
    "app_id".to_string()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid websocket URI: {0}")]
    InvalidUri(String),
    #[error("Invalid app ID format: {0}")]
    InvalidAppId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConnectionSection {
    /// Base URI with the application identifier appended as a query parameter
    pub fn connection_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.websocket_uri)
            .map_err(|e| ConfigError::InvalidUri(format!("{}: {e}", self.websocket_uri)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidUri(format!(
                "{}: scheme must be ws or wss",
                self.websocket_uri
            )));
        }
        url.query_pairs_mut()
            .append_pair(&self.app_id_param, &self.app_id);
        Ok(url)
    }
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_app_id(&self.connection.app_id)?;
        if self.connection.app_id_param.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "app_id_param must not be empty".to_string(),
            ));
        }
        self.connection.connection_url()?;
        self.protocol
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(format!("[protocol] {e}")))?;
        self.reconnect
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(format!("[reconnect] {e}")))?;
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[connection]
websocket_uri = "ws://localhost:8888/runtime/session"
app_id = "test-app"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate app ID format
fn validate_app_id(app_id: &str) -> Result<(), ConfigError> {
    let valid_chars = app_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if app_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidAppId(format!(
            "App ID '{app_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
