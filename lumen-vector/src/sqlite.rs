//! SQLite-backed embedding store with brute-force nearest-neighbour search

use crate::VectorStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumen_core::{
    DocumentChunk, DocumentMetadata, EmbeddingVector, LumenError, LumenResult, RetrievedDocument,
    VectorError,
};
use lumen_llm::EmbeddingProvider;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS document_chunks (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    ingested_at TEXT NOT NULL,
    source_type TEXT NOT NULL,
    text TEXT NOT NULL,
    model_id TEXT NOT NULL,
    embedding_dimension INTEGER NOT NULL,
    embedding_vector BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_document_chunks_source
    ON document_chunks(source);

CREATE INDEX IF NOT EXISTS idx_document_chunks_model
    ON document_chunks(model_id);
";

/// Chunks and their embeddings in one SQLite table. Distances are squared
/// L2 over unit-normalized vectors, so they range over [0, 4].
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteVectorStore {
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> LumenResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            unavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_connection(conn, embedder)
    }

    pub fn in_memory(embedder: Arc<dyn EmbeddingProvider>) -> LumenResult<Self> {
        let conn = Connection::open_in_memory().map_err(store_error)?;
        Self::from_connection(conn, embedder)
    }

    fn from_connection(conn: Connection, embedder: Arc<dyn EmbeddingProvider>) -> LumenResult<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(store_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder,
        })
    }

    async fn with_connection<T, F>(&self, f: F) -> LumenResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> LumenResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| unavailable("vector store lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| unavailable(format!("sqlite worker failed: {}", e)))?
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn query(&self, text: &str, limit: usize) -> LumenResult<Vec<RetrievedDocument>> {
        let query = self.embedder.embed(text).await?;
        if !query.is_valid() {
            return Err(LumenError::Vector(VectorError::InvalidVector {
                reason: "query embedding is empty or non-finite".to_string(),
            }));
        }
        let model_id = self.embedder.model_id().to_string();

        self.with_connection(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, text, source, chunk_index, total_chunks, ingested_at, source_type,
                            embedding_dimension, embedding_vector
                     FROM document_chunks
                     WHERE model_id = ?1",
                )
                .map_err(store_error)?;

            let rows = stmt
                .query_map(params![model_id], |row| {
                    Ok(StoredRow {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        source: row.get(2)?,
                        chunk_index: row.get(3)?,
                        total_chunks: row.get(4)?,
                        ingested_at: row.get(5)?,
                        source_type: row.get(6)?,
                        dimension: row.get(7)?,
                        blob: row.get(8)?,
                    })
                })
                .map_err(store_error)?;

            let mut hits = Vec::new();
            for row in rows {
                let row = row.map_err(store_error)?;
                if row.dimension != query.dimensions as i64 {
                    tracing::warn!(
                        chunk_id = %row.id,
                        expected = query.dimensions,
                        got = row.dimension,
                        "Skipping chunk with mismatched embedding dimension"
                    );
                    continue;
                }
                let candidate = EmbeddingVector::new(
                    decode_f32_embedding_blob(&row.blob)?,
                    query.model_id.clone(),
                );
                let distance = query.squared_l2_distance(&candidate)?;
                hits.push(row.into_document(distance));
            }

            hits.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            hits.truncate(limit);
            Ok(hits)
        })
        .await
    }

    async fn insert(&self, chunks: &[DocumentChunk]) -> LumenResult<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(LumenError::Vector(VectorError::InvalidVector {
                reason: format!(
                    "expected {} embeddings, provider returned {}",
                    chunks.len(),
                    embeddings.len()
                ),
            }));
        }
        let rows: Vec<(DocumentChunk, EmbeddingVector)> =
            chunks.iter().cloned().zip(embeddings).collect();

        self.with_connection(move |conn| {
            let tx = conn.transaction().map_err(store_error)?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT OR REPLACE INTO document_chunks (
                            id, source, chunk_index, total_chunks, ingested_at, source_type,
                            text, model_id, embedding_dimension, embedding_vector
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    )
                    .map_err(store_error)?;
                for (chunk, embedding) in &rows {
                    let meta = &chunk.metadata;
                    stmt.execute(params![
                        chunk.id,
                        meta.source,
                        meta.chunk_index as i64,
                        meta.total_chunks as i64,
                        meta.ingested_at.to_rfc3339(),
                        meta.source_type,
                        chunk.text,
                        embedding.model_id,
                        embedding.dimensions as i64,
                        encode_f32_embedding_blob(&embedding.data),
                    ])
                    .map_err(store_error)?;
                }
            }
            tx.commit().map_err(store_error)?;
            Ok(rows.len())
        })
        .await
    }

    async fn remove_source(&self, source: &str) -> LumenResult<usize> {
        let source = source.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM document_chunks WHERE source = ?1", params![source])
                .map_err(store_error)
        })
        .await
    }

    async fn count(&self) -> LumenResult<usize> {
        self.with_connection(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM document_chunks", [], |row| row.get(0))
                .map_err(store_error)?;
            Ok(n as usize)
        })
        .await
    }
}

impl std::fmt::Debug for SqliteVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorStore")
            .field("model", &self.embedder.model_id())
            .finish()
    }
}

struct StoredRow {
    id: String,
    text: String,
    source: String,
    chunk_index: i64,
    total_chunks: i64,
    ingested_at: String,
    source_type: String,
    dimension: i64,
    blob: Vec<u8>,
}

impl StoredRow {
    fn into_document(self, distance: f32) -> RetrievedDocument {
        let ingested_at = DateTime::parse_from_rfc3339(&self.ingested_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();
        RetrievedDocument {
            id: self.id,
            text: self.text,
            distance,
            metadata: Some(DocumentMetadata {
                source: self.source,
                chunk_index: self.chunk_index.max(0) as usize,
                total_chunks: self.total_chunks.max(0) as usize,
                ingested_at,
                source_type: self.source_type,
            }),
        }
    }
}

fn encode_f32_embedding_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_f32_embedding_blob(blob: &[u8]) -> LumenResult<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(LumenError::Vector(VectorError::InvalidVector {
            reason: format!("embedding blob length {} is not a multiple of 4", blob.len()),
        }));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn unavailable(reason: impl Into<String>) -> LumenError {
    LumenError::Vector(VectorError::StoreUnavailable {
        reason: reason.into(),
    })
}

fn store_error(e: rusqlite::Error) -> LumenError {
    unavailable(e.to_string())
}
