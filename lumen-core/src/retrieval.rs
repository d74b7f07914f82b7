//! Retrieved documents and semantic context

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Metadata stored alongside every ingested chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Source identifier, usually the file name.
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub ingested_at: Timestamp,
    /// File extension of the source, or "unknown".
    pub source_type: String,
}

/// A chunk ready to be written to the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// A passage returned by a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub text: String,
    pub distance: f32,
    pub metadata: Option<DocumentMetadata>,
}

/// Result of semantic retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum SemanticContext {
    /// Passages below the relevance threshold, nearest first.
    Relevant(Vec<RetrievedDocument>),
    /// Nothing passed the threshold; the single nearest candidate.
    LowConfidence(RetrievedDocument),
    /// The store returned no candidates.
    NoDocuments,
    /// The store could not be queried.
    Unavailable(String),
}

impl SemanticContext {
    /// Text handed to downstream prompts. Relevant passages are joined with a
    /// blank line.
    pub fn text(&self) -> String {
        match self {
            SemanticContext::Relevant(docs) => docs
                .iter()
                .map(|d| d.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            SemanticContext::LowConfidence(doc) => doc.text.clone(),
            SemanticContext::NoDocuments => "Aucun document pertinent trouvé.".to_string(),
            SemanticContext::Unavailable(reason) => {
                format!("Erreur lors de la recherche vectorielle : {reason}")
            }
        }
    }

    /// True for the variants that carry no usable passage.
    pub fn is_sentinel(&self) -> bool {
        matches!(
            self,
            SemanticContext::NoDocuments | SemanticContext::Unavailable(_)
        )
    }

    pub fn is_low_confidence(&self) -> bool {
        matches!(self, SemanticContext::LowConfidence(_))
    }

    pub fn documents(&self) -> Vec<&RetrievedDocument> {
        match self {
            SemanticContext::Relevant(docs) => docs.iter().collect(),
            SemanticContext::LowConfidence(doc) => vec![doc],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str, distance: f32) -> RetrievedDocument {
        RetrievedDocument {
            id: text.to_string(),
            text: text.to_string(),
            distance,
            metadata: None,
        }
    }

    #[test]
    fn test_relevant_text_joined_with_blank_line() {
        let ctx = SemanticContext::Relevant(vec![doc("first", 0.1), doc("second", 0.5)]);
        assert_eq!(ctx.text(), "first\n\nsecond");
        assert!(!ctx.is_sentinel());
    }

    #[test]
    fn test_sentinels() {
        assert!(SemanticContext::NoDocuments.is_sentinel());
        assert!(SemanticContext::Unavailable("down".into()).is_sentinel());
        assert!(!SemanticContext::LowConfidence(doc("x", 3.0)).is_sentinel());
        assert!(SemanticContext::NoDocuments.documents().is_empty());
    }
}
