//! Endpoint configuration loading.
//!
//! The configuration file never contains the password. It names an
//! environment variable the password is read from at load time.

use std::{
    env,
    path::{Path, PathBuf},
};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::{AuthenticationMechanism, Endpoint};

/// Default WinRM HTTPS port.
pub const DEFAULT_PORT: u16 = 5986;

/// Default environment variable holding the password.
pub const DEFAULT_PASSWORD_ENV: &str = "PSREMOTE_PASSWORD";

const CONFIG_DIR: &str = "psremote-explorer";
const CONFIG_FILE: &str = "endpoint.json";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Password environment variable {0} is not set")]
    MissingPassword(String),
    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_password_env() -> String {
    DEFAULT_PASSWORD_ENV.to_string()
}

/// Serialized endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub authentication: AuthenticationMechanism,
    /// Environment variable the password is read from.
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl EndpointConfig {
    /// Default location: `<config dir>/psremote-explorer/endpoint.json`.
    ///
    /// # Errors
    /// Returns error if the platform has no configuration directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse from JSON text.
    ///
    /// # Errors
    /// Returns error if the text is not a valid configuration.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Build the endpoint, reading the password from the configured variable.
    ///
    /// # Errors
    /// Returns error if the password variable is unset.
    pub fn into_endpoint(self) -> Result<Endpoint, ConfigError> {
        let password = env::var(&self.password_env)
            .map_err(|_| ConfigError::MissingPassword(self.password_env.clone()))?;
        Ok(self.into_endpoint_with(SecretString::from(password)))
    }

    /// Build the endpoint with an explicit password.
    #[must_use]
    pub fn into_endpoint_with(self, password: SecretString) -> Endpoint {
        Endpoint::new(
            self.host,
            self.port,
            self.username,
            password,
            self.authentication,
        )
    }
}
