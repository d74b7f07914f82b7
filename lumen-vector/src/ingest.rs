//! Plain-text chunking and ingestion into the document store

use crate::VectorStore;
use chrono::Utc;
use lumen_core::{
    with_deadline, DocumentChunk, DocumentMetadata, IngestError, LumenError, LumenResult,
    RetrievalConfig, VectorError,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Summary of one ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: String,
    pub chunks: usize,
}

/// Splits text into overlapping chunks and writes them to a [`VectorStore`].
#[derive(Clone)]
pub struct DocumentIngestor {
    store: Arc<dyn VectorStore>,
    chunk_size: usize,
    chunk_overlap: usize,
    timeout: Duration,
}

impl DocumentIngestor {
    pub fn new(store: Arc<dyn VectorStore>, config: &RetrievalConfig, timeout: Duration) -> Self {
        Self {
            store,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            timeout,
        }
    }

    /// Chunk `text` and store every chunk under `source`.
    pub async fn ingest_text(&self, source: &str, text: &str) -> LumenResult<IngestReport> {
        let pieces = chunk_text(text, self.chunk_size, self.chunk_overlap)?;
        if pieces.is_empty() {
            return Err(IngestError::EmptyDocument {
                source_name: source.to_string(),
            }
            .into());
        }

        let batch_id = Uuid::now_v7().simple().to_string();
        let batch_id = &batch_id[batch_id.len() - 8..];
        let ingested_at = Utc::now();
        let source_type = source_type(source);
        let total = pieces.len();

        let chunks: Vec<DocumentChunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(index, text)| DocumentChunk {
                id: format!("{source}_{batch_id}_{index}"),
                text,
                metadata: DocumentMetadata {
                    source: source.to_string(),
                    chunk_index: index,
                    total_chunks: total,
                    ingested_at,
                    source_type: source_type.clone(),
                },
            })
            .collect();

        let written = with_deadline(self.timeout, self.store.insert(&chunks), timeout_error).await?;
        tracing::info!(source, chunks = written, "Document ingested");
        Ok(IngestReport {
            source: source.to_string(),
            chunks: written,
        })
    }

    /// Delete every chunk previously ingested under `source`.
    pub async fn remove(&self, source: &str) -> LumenResult<usize> {
        let removed =
            with_deadline(self.timeout, self.store.remove_source(source), timeout_error).await?;
        tracing::info!(source, chunks = removed, "Document removed");
        Ok(removed)
    }
}

impl std::fmt::Debug for DocumentIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIngestor")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish()
    }
}

fn timeout_error(timeout_ms: u64) -> LumenError {
    LumenError::Vector(VectorError::Timeout { timeout_ms })
}

/// File extension after the last `.`, or `"unknown"`.
pub fn source_type(source: &str) -> String {
    match source.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Split `text` into windows of at most `chunk_size` characters that overlap
/// by `overlap` characters.
///
/// A window that does not reach the end of the text is cut after the last
/// `.` or newline it contains, when there is one past its first character.
/// Text no longer than `chunk_size` is returned whole. Blank text yields no
/// chunks.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> LumenResult<Vec<String>> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(IngestError::InvalidChunking {
            chunk_size,
            overlap,
        }
        .into());
    }
    let chars: Vec<char> = text.trim().chars().collect();
    Ok(chunk_spans(&chars, chunk_size, overlap)
        .into_iter()
        .map(|(start, end)| chars[start..end].iter().collect::<String>().trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect())
}

fn chunk_spans(chars: &[char], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }
    if len <= chunk_size {
        return vec![(0, len)];
    }

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let mut end = (start + chunk_size).min(len);
        if end < len {
            let cut = chars[start..end]
                .iter()
                .rposition(|&c| c == '.' || c == '\n')
                .map(|offset| start + offset);
            if let Some(cut) = cut.filter(|&cut| cut > start) {
                end = cut + 1;
            }
        }
        spans.push((start, end));
        if end >= len {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }
    spans
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("  Une seule phrase.  ", 1000, 200).unwrap();
        assert_eq!(chunks, vec!["Une seule phrase."]);
    }

    #[test]
    fn test_blank_text_no_chunks() {
        assert!(chunk_text(" \n\t ", 1000, 200).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(chunk_text("abc", 0, 0).is_err());
        assert!(chunk_text("abc", 10, 10).is_err());
    }

    #[test]
    fn test_cut_at_sentence_boundary() {
        let text = format!("{}. {}", "a".repeat(30), "b".repeat(30));
        let chunks = chunk_text(&text, 40, 5).unwrap();
        assert_eq!(chunks[0], format!("{}.", "a".repeat(30)));
        assert!(chunks.last().unwrap().ends_with('b'));
    }

    #[test]
    fn test_hard_cut_without_boundary() {
        let text = "x".repeat(25);
        let spans = chunk_spans(&text.chars().collect::<Vec<_>>(), 10, 3);
        assert_eq!(spans, vec![(0, 10), (7, 17), (14, 24), (21, 25)]);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "é".repeat(15);
        let chunks = chunk_text(&text, 10, 2).unwrap();
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_source_type() {
        assert_eq!(source_type("rapport.txt"), "txt");
        assert_eq!(source_type("archive.tar.gz"), "gz");
        assert_eq!(source_type("README"), "unknown");
        assert_eq!(source_type(".env"), "unknown");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_spans_cover_text_with_overlap(
            text in "[a-z .\n]{1,400}",
            chunk_size in 5usize..80,
            overlap_ratio in 0.0f64..0.9,
        ) {
            let overlap = ((chunk_size as f64) * overlap_ratio) as usize;
            let chars: Vec<char> = text.chars().collect();
            let spans = chunk_spans(&chars, chunk_size, overlap);

            prop_assert_eq!(spans.first().map(|s| s.0), Some(0));
            prop_assert_eq!(spans.last().map(|s| s.1), Some(chars.len()));
            for (start, end) in &spans {
                prop_assert!(start < end);
                prop_assert!(end - start <= chunk_size);
            }
            for pair in spans.windows(2) {
                prop_assert!(pair[1].0 > pair[0].0);
                prop_assert!(pair[1].0 <= pair[0].1);
            }
        }
    }
}
