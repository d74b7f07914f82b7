//! OpenAI provider implementation
//!
//! Chat completions and embeddings over the OpenAI HTTP API.

pub mod client;
pub mod completion;
pub mod embedding;
pub mod types;

pub use client::OpenAIClient;
pub use completion::OpenAICompletionProvider;
pub use embedding::OpenAIEmbeddingProvider;
