//! Ledger configuration (TOML)
//!
//! Every key is optional; missing keys take the built-in defaults.
//!
//! ```toml
//! base_path = "/var/lib/ledger"
//! enable_audit = true
//! auto_cleanup = false
//! rotation_size_mb = 100
//! user = "pipeline"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::audit::DEFAULT_ROTATION_SIZE_MB;

/// Error types for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Settings for an [`crate::ArtifactManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Root holding `storage/` and `audit/`
    pub base_path: PathBuf,

    /// Keep an audit journal under `<base_path>/audit`
    pub enable_audit: bool,

    /// Purge the temp area whenever a run ends
    pub auto_cleanup: bool,

    /// Audit file size that triggers rotation
    pub rotation_size_mb: u64,

    /// Stamped into the `user` field of every audit entry
    pub user: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./ledger"),
            enable_audit: true,
            auto_cleanup: false,
            rotation_size_mb: DEFAULT_ROTATION_SIZE_MB,
            user: std::env::var("USER").ok(),
        }
    }
}

impl LedgerConfig {
    /// Defaults rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Load and parse config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse config from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: LedgerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "base_path must not be empty".to_string(),
            ));
        }

        if self.rotation_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "rotation_size_mb must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
