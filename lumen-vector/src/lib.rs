//! LUMEN Vector - Semantic Path
//!
//! The document store seam, a SQLite-backed embedding store, relevance
//! filtered retrieval, and plain-text ingestion.

use async_trait::async_trait;
use lumen_core::{DocumentChunk, LumenResult, RetrievedDocument};

pub mod ingest;
pub mod retriever;
pub mod sqlite;

pub use ingest::{chunk_text, DocumentIngestor, IngestReport};
pub use retriever::{select_relevant, SemanticRetriever};
pub use sqlite::SqliteVectorStore;

/// A store of text chunks searchable by semantic distance.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `limit` nearest chunks to `text`, ordered by ascending distance.
    async fn query(&self, text: &str, limit: usize) -> LumenResult<Vec<RetrievedDocument>>;

    /// Store chunks. Returns the number written.
    async fn insert(&self, chunks: &[DocumentChunk]) -> LumenResult<usize>;

    /// Delete every chunk of `source`. Returns the number removed.
    async fn remove_source(&self, source: &str) -> LumenResult<usize>;

    /// Total number of stored chunks.
    async fn count(&self) -> LumenResult<usize>;
}
