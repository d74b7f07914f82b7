//! Error types for Lumen operations

use thiserror::Error;

/// Relational store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Statement failed: {reason}")]
    StatementFailed { reason: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

/// Text-generation and embedding provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No LLM provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Embedding failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
}

/// Vector store and embedding vector errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: i32, got: i32 },

    #[error("Invalid vector: {reason}")]
    InvalidVector { reason: String },

    #[error("Model mismatch: expected {expected}, got {got}")]
    ModelMismatch { expected: String, got: String },

    #[error("Vector store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Vector query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Provider not supported: {provider}")]
    ProviderNotSupported { provider: String },
}

/// Document ingestion errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Document {source_name} has no content")]
    EmptyDocument { source_name: String },

    #[error("Invalid chunking parameters: size {chunk_size}, overlap {overlap}")]
    InvalidChunking { chunk_size: usize, overlap: usize },
}

/// Master error type for all Lumen errors.
#[derive(Debug, Clone, Error)]
pub enum LumenError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),
}

/// Result type alias for Lumen operations.
pub type LumenResult<T> = Result<T, LumenError>;

impl LumenError {
    /// True when the error means the collaborator could not be reached at all,
    /// as opposed to rejecting a well-formed request.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            LumenError::Storage(StorageError::Unavailable { .. })
                | LumenError::Storage(StorageError::Timeout { .. })
                | LumenError::Llm(LlmError::ProviderNotConfigured)
                | LumenError::Llm(LlmError::Timeout { .. })
                | LumenError::Llm(LlmError::RequestFailed { status: 0, .. })
                | LumenError::Vector(VectorError::StoreUnavailable { .. })
                | LumenError::Vector(VectorError::Timeout { .. })
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
