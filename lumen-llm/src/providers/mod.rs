//! LLM provider implementations
//!
//! Concrete implementations of the CompletionProvider and EmbeddingProvider
//! traits for hosted (OpenAI) and local (Ollama) services.

pub mod ollama;
pub mod openai;

pub use ollama::{OllamaChatProvider, OllamaEmbeddingProvider};
pub use openai::{OpenAIClient, OpenAICompletionProvider, OpenAIEmbeddingProvider};

use lumen_core::{LlmError, LumenError};

pub(crate) fn request_failed(provider: &str, status: i32, message: impl Into<String>) -> LumenError {
    LumenError::Llm(LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> LumenError {
    LumenError::Llm(LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> LumenError {
    LumenError::Llm(LlmError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    })
}
