//! Configuration loading for embedding applications.
//!
//! A small YAML file selects the storage backend and tunes the persistence
//! scheduler. Everything has a default, so an absent file is not an error
//! for callers that want one - but a present, malformed file is: startup
//! must not continue half-configured.

use crate::error::{Error, Result};
use crate::store::StoreBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Default name of the configuration file
pub const CONFIG_FILE_NAME: &str = "quill.yaml";

/// Default name of the snapshot data file
pub const DATA_FILE_NAME: &str = "journal.jsonl";

fn default_save_delay() -> u64 {
    3
}

/// Configuration file structure for quill
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuillConfig {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Debounce delay for the persistence scheduler, in seconds
    #[serde(rename = "save-delay-seconds", default = "default_save_delay")]
    pub save_delay_seconds: u64,

    /// Optional path to an award catalog overriding the bundled one
    #[serde(rename = "awards-file", default, skip_serializing_if = "Option::is_none")]
    pub awards_file: Option<PathBuf>,
}

/// Storage configuration section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Storage backend type ("memory", or "jsonl" for snapshot persistence)
    pub backend: String,

    /// Path to the data file (required for the "jsonl" backend)
    #[serde(rename = "data-file", default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
}

impl QuillConfig {
    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config`
    /// if it cannot be parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {}", e)))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Resolve the configured storage backend.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unknown backend name or a "jsonl"
    /// backend with no data file.
    pub fn to_backend(&self) -> Result<StoreBackend> {
        match self.storage.backend.as_str() {
            "memory" => Ok(StoreBackend::InMemory),
            "jsonl" => {
                let path = self.storage.data_file.clone().ok_or_else(|| {
                    Error::Config("jsonl backend requires a data-file path".to_string())
                })?;
                Ok(StoreBackend::Jsonl(path))
            }
            other => Err(Error::Config(format!("unknown storage backend: {}", other))),
        }
    }

    /// The debounce delay as a [`Duration`].
    pub fn save_delay(&self) -> Duration {
        Duration::from_secs(self.save_delay_seconds)
    }
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: "jsonl".to_string(),
                data_file: Some(PathBuf::from(DATA_FILE_NAME)),
            },
            save_delay_seconds: default_save_delay(),
            awards_file: None,
        }
    }
}
