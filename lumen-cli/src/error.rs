//! Error types for the CLI.

use crate::config::ConfigError;
use lumen_core::LumenError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lumen(#[from] LumenError),
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to install log subscriber: {0}")]
    Logging(String),
}

pub type CliResult<T> = Result<T, CliError>;
