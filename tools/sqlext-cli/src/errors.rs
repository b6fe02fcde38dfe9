///
/// CLI error types.
///
/// Everything that can stop the shell: reading and validating the config
/// file, enabling extensions, running SQL, and writing results.
///

use std::path::PathBuf;
use thiserror::Error;

use sqlext::{DatabaseError, ExtensionError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Config file not found at {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to parse config at {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("Unknown {kind} '{name}' in config (available: {})", .available.join(", "))]
    UnknownExtension {
        kind: &'static str,
        name: String,
        available: Vec<String>,
    },

    #[error("{0}")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Extension(#[from] ExtensionError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
