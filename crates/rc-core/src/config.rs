//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::media::RebaseMode;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub trim: TrimConfig,
    pub jobs: JobsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| Error::Config(format!("parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.trim.min_window_ms == 0 {
            warnings.push("trim.min_window_ms is 0; zero-length windows are still refused".into());
        }
        if self.trim.min_output_bytes == 0 {
            warnings.push("trim.min_output_bytes is 0; empty outputs will not be caught".into());
        }
        if self.trim.temp_infix.is_empty() {
            warnings.push("trim.temp_infix is empty; using the default".into());
        }
        if self.trim.backup_suffix.is_empty() {
            warnings.push("trim.backup_suffix is empty; using the default".into());
        }
        if self.jobs.event_capacity == 0 {
            warnings.push("jobs.event_capacity is 0; using the default".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Settings for the trim orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    /// Shortest window a request may ask for.
    pub min_window_ms: u64,
    /// Trimmed output at or below this size is treated as broken.
    pub min_output_bytes: u64,
    /// Timestamp rebasing strategy.
    pub rebase: RebaseMode,
    /// Inserted between the source stem and a timestamp to name the temp file.
    pub temp_infix: String,
    /// Appended to the source path to name the backup file.
    pub backup_suffix: String,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            min_window_ms: 1000,
            min_output_bytes: 1024,
            rebase: RebaseMode::FirstSample,
            temp_infix: default_temp_infix(),
            backup_suffix: default_backup_suffix(),
        }
    }
}

impl TrimConfig {
    /// The temp infix, falling back to the default when blank.
    pub fn temp_infix(&self) -> &str {
        if self.temp_infix.is_empty() {
            "_trimmed_"
        } else {
            &self.temp_infix
        }
    }

    /// The backup suffix, falling back to the default when blank.
    pub fn backup_suffix(&self) -> &str {
        if self.backup_suffix.is_empty() {
            ".bak"
        } else {
            &self.backup_suffix
        }
    }
}

fn default_temp_infix() -> String {
    "_trimmed_".into()
}

fn default_backup_suffix() -> String {
    ".bak".into()
}

/// Settings for the trim job coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Broadcast channel capacity for job events.
    pub event_capacity: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            event_capacity: 64,
        }
    }
}

/// Logging settings. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: Option<String>,
}
