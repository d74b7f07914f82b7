//! Collaborator construction from configuration.

use crate::config::{
    resolve_api_key, CliConfig, EmbeddingProviderConfig, ProviderConfig, ProviderKind,
};
use crate::error::CliResult;
use lumen_llm::providers::{
    OllamaChatProvider, OllamaEmbeddingProvider, OpenAIClient, OpenAICompletionProvider,
    OpenAIEmbeddingProvider,
};
use lumen_llm::{CachedEmbeddingProvider, CompletionProvider, EmbeddingProvider};
use lumen_orchestrator::Collaborators;
use lumen_sql::SqliteStore;
use lumen_vector::SqliteVectorStore;
use std::sync::Arc;

pub fn completion_provider(config: &ProviderConfig) -> CliResult<Arc<dyn CompletionProvider>> {
    let provider: Arc<dyn CompletionProvider> = match config.kind {
        ProviderKind::OpenAi => {
            let client = openai_client(
                config.api_key_env.as_deref(),
                config.endpoint.as_deref(),
                config.requests_per_minute,
            )?;
            Arc::new(OpenAICompletionProvider::with_client(
                client,
                config.model.clone(),
            ))
        }
        ProviderKind::Ollama => match &config.endpoint {
            Some(endpoint) => Arc::new(OllamaChatProvider::new(
                endpoint.clone(),
                config.model.clone(),
            )),
            None => Arc::new(OllamaChatProvider::with_default_url(config.model.clone())),
        },
    };
    Ok(provider)
}

pub fn embedding_provider(
    config: &EmbeddingProviderConfig,
) -> CliResult<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.kind {
        ProviderKind::OpenAi => {
            let client = openai_client(
                config.api_key_env.as_deref(),
                config.endpoint.as_deref(),
                config.requests_per_minute,
            )?;
            Arc::new(OpenAIEmbeddingProvider::with_client(
                client,
                config.model.clone(),
                config.dimensions,
            ))
        }
        ProviderKind::Ollama => {
            let endpoint = config
                .endpoint
                .clone()
                .unwrap_or_else(|| lumen_llm::providers::ollama::DEFAULT_BASE_URL.to_string());
            Arc::new(OllamaEmbeddingProvider::new(
                endpoint,
                config.model.clone(),
                config.dimensions,
            ))
        }
    };
    Ok(Arc::new(CachedEmbeddingProvider::new(
        provider,
        config.cache_entries,
    )))
}

fn openai_client(
    api_key_env: Option<&str>,
    endpoint: Option<&str>,
    requests_per_minute: u32,
) -> CliResult<OpenAIClient> {
    let client = OpenAIClient::new(resolve_api_key(api_key_env)?, requests_per_minute);
    Ok(match endpoint {
        Some(endpoint) => client.with_base_url(endpoint),
        None => client,
    })
}

/// Open both stores (creating the relational schema when absent) and the
/// completion provider.
pub fn collaborators(config: &CliConfig) -> CliResult<Collaborators> {
    let relational = SqliteStore::open(&config.storage.relational_path)?;
    relational.bootstrap_schema()?;
    let embedder = embedding_provider(&config.providers.embedding)?;
    let vector = SqliteVectorStore::open(&config.storage.vector_path, embedder)?;
    Ok(Collaborators {
        completion: completion_provider(&config.providers.completion)?,
        relational: Arc::new(relational),
        vector: Arc::new(vector),
    })
}
