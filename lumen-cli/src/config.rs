//! Configuration loading for the Lumen CLI.
//!
//! The file is TOML, found through `--config <path>` or `LUMEN_CONFIG`.
//! `[lumen]` may be omitted and then takes the library defaults; every other
//! section is required.

use lumen_core::LumenConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(default)]
    pub lumen: LumenConfig,
    pub providers: ProvidersConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    pub completion: ProviderConfig,
    pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Base URL; the provider default when absent.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    pub dimensions: i32,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_cache_entries")]
    pub cache_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub relational_path: PathBuf,
    pub vector_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub image_dir: PathBuf,
    /// Rows shown when printing a dataset.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    /// Turns kept in the conversation history.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// Start with JSON output instead of text.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directive used when `LUMEN_LOG` is unset.
    pub filter: Option<String>,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_cache_entries() -> usize {
    1024
}

fn default_preview_rows() -> usize {
    10
}

fn default_history_turns() -> usize {
    20
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or LUMEN_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("Environment variable {name} is not set")]
    MissingEnv { name: String },
    #[error(transparent)]
    Lumen(#[from] lumen_core::LumenError),
}

impl CliConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    /// Parse, apply `LUMEN_*` overrides, validate.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&contents)?;
        config.lumen = config.lumen.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lumen.validate()?;
        if self.providers.completion.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "providers.completion.model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.providers.embedding.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "providers.embedding.model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.providers.embedding.dimensions <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "providers.embedding.dimensions",
                reason: "must be > 0".to_string(),
            });
        }
        if self.providers.completion.kind == ProviderKind::OpenAi
            && self.providers.completion.api_key_env.is_none()
        {
            return Err(ConfigError::InvalidValue {
                field: "providers.completion.api_key_env",
                reason: "required for the openai provider".to_string(),
            });
        }
        if self.providers.embedding.kind == ProviderKind::OpenAi
            && self.providers.embedding.api_key_env.is_none()
        {
            return Err(ConfigError::InvalidValue {
                field: "providers.embedding.api_key_env",
                reason: "required for the openai provider".to_string(),
            });
        }
        if self.storage.relational_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.relational_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.storage.vector_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.vector_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.output.image_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output.image_dir",
                reason: "must not be empty".to_string(),
            });
        }
        if self.output.history_turns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "output.history_turns",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Read the API key named by `api_key_env`.
pub fn resolve_api_key(api_key_env: Option<&str>) -> Result<String, ConfigError> {
    let name = api_key_env.ok_or_else(|| ConfigError::MissingEnv {
        name: "<api_key_env>".to_string(),
    })?;
    std::env::var(name).map_err(|_| ConfigError::MissingEnv {
        name: name.to_string(),
    })
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("LUMEN_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
