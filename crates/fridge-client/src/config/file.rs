use crate::settings::ConnectionSettings;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Contents of `config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Wait per remote call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
}

/// One parameter to register on startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub default_value: Value,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,

    #[serde(default)]
    pub settable: bool,

    /// Setter argument key, `"argument"` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_key: Option<String>,
}

fn default_name() -> String {
    "fridge".to_string()
}
fn default_timeout_secs() -> f64 {
    5.0
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            connection: ConnectionSettings::default(),
            timeout_secs: default_timeout_secs(),
            parameters: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Load config from file, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, &path.display().to_string());
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `Error::Config` for a negative, zero or non-finite timeout.
    pub fn timeout(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(Error::Config(format!(
                "timeoutSecs must be a positive number of seconds, got {}",
                self.timeout_secs
            ))),
        }
    }
}
