//! LUMEN LLM - Provider Abstraction Layer
//!
//! Provider-agnostic traits for text generation and embeddings, the
//! completion client used by every synthesizer, and prompt assembly.
//! Concrete HTTP providers live in [`providers`].

use async_trait::async_trait;
use lumen_core::{compute_content_hash, ContentHash, EmbeddingVector, LumenResult, TurnRole};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub mod client;
pub mod prompt;
pub mod providers;

pub use client::{strip_code_fences, CompletionClient};
pub use prompt::{PromptBuilder, PromptSection};

// ============================================================================
// COMPLETION PROVIDER TRAIT
// ============================================================================

/// A single chat message sent to a text-generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: TurnRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }
}

/// Parameters for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// A request consisting of a single user prompt.
    pub fn prompt(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, ChatMessage::system(system));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Text of the last user message.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == TurnRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Trait for text-generation providers.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for the given messages.
    ///
    /// # Returns
    /// * `Ok(String)` - The raw generated text
    /// * `Err(LumenError::Llm)` - If the provider rejects or cannot serve the call
    async fn complete(&self, request: &CompletionRequest) -> LumenResult<String>;

    /// Identifier used in logs and errors (e.g., "openai").
    fn provider_id(&self) -> &str;
}

// ============================================================================
// EMBEDDING PROVIDER TRAIT
// ============================================================================

/// Trait for embedding providers.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> LumenResult<EmbeddingVector>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> LumenResult<Vec<EmbeddingVector>>;

    /// The dimension count (e.g., 384, 768, 1536, 3072).
    fn dimensions(&self) -> i32;

    /// A string identifying the model (e.g., "text-embedding-3-small").
    fn model_id(&self) -> &str;
}

// ============================================================================
// EMBEDDING CACHE
// ============================================================================

/// Cache for embedding vectors to avoid redundant API calls.
/// Thread-safe via RwLock.
pub struct EmbeddingCache {
    /// Cache storage: content hash -> embedding
    cache: RwLock<HashMap<ContentHash, EmbeddingVector>>,
    /// Maximum number of entries
    max_size: usize,
}

impl EmbeddingCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_size,
        }
    }

    pub fn get(&self, hash: &ContentHash) -> Option<EmbeddingVector> {
        self.cache.read().ok()?.get(hash).cloned()
    }

    /// Insert an embedding into the cache.
    /// If cache is full, this is a no-op.
    pub fn insert(&self, hash: ContentHash, embedding: EmbeddingVector) {
        if let Ok(mut cache) = self.cache.write() {
            if cache.len() < self.max_size {
                cache.insert(hash, embedding);
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("max_size", &self.max_size)
            .field("current_size", &self.len())
            .finish()
    }
}

/// Embedding provider that memoizes single-text embeddings by content hash.
/// Repeated queries for the same request text skip the remote call.
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, max_entries: usize) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(max_entries),
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn embed(&self, text: &str) -> LumenResult<EmbeddingVector> {
        let hash = compute_content_hash(text.as_bytes());
        if let Some(hit) = self.cache.get(&hash) {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.cache.insert(hash, embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[&str]) -> LumenResult<Vec<EmbeddingVector>> {
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> i32 {
        self.inner.dimensions()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

impl std::fmt::Debug for CachedEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEmbeddingProvider")
            .field("model", &self.inner.model_id())
            .field("cache", &self.cache)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> LumenResult<EmbeddingVector> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EmbeddingVector::new(
                vec![text.len() as f32, 1.0],
                "counting".to_string(),
            ))
        }

        async fn embed_batch(&self, texts: &[&str]) -> LumenResult<Vec<EmbeddingVector>> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> i32 {
            2
        }

        fn model_id(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_embedding_cache_basic() {
        let cache = EmbeddingCache::new(2);
        assert!(cache.is_empty());
        let hash = compute_content_hash(b"hello");
        cache.insert(hash, EmbeddingVector::new(vec![1.0], "m".into()));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&hash).is_some());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_embedding_cache_full_is_noop() {
        let cache = EmbeddingCache::new(1);
        cache.insert([1u8; 32], EmbeddingVector::new(vec![1.0], "m".into()));
        cache.insert([2u8; 32], EmbeddingVector::new(vec![2.0], "m".into()));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&[2u8; 32]).is_none());
    }

    #[tokio::test]
    async fn test_cached_provider_skips_repeat_calls() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedEmbeddingProvider::new(inner.clone(), 16);
        cached.embed("contacts par secteur").await.unwrap();
        cached.embed("contacts par secteur").await.unwrap();
        cached.embed("autre").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.dimensions(), 2);
    }

    #[test]
    fn test_completion_request_builders() {
        let request = CompletionRequest::prompt("Bonjour", 0.0)
            .with_system("Tu es un assistant")
            .with_max_tokens(10);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, TurnRole::System);
        assert_eq!(request.last_user_content(), Some("Bonjour"));
        assert_eq!(request.max_tokens, Some(10));
    }
}
