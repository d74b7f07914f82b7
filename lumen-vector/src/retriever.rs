//! Relevance-filtered semantic retrieval

use crate::VectorStore;
use lumen_core::{
    with_deadline, LumenError, LumenResult, RetrievalConfig, RetrievedDocument, SemanticContext,
    VectorError,
};
use std::sync::Arc;
use std::time::Duration;

/// Queries a [`VectorStore`] and filters candidates by distance.
///
/// Retrieval never fails: store errors and timeouts become
/// [`SemanticContext::Unavailable`].
#[derive(Clone)]
pub struct SemanticRetriever {
    store: Arc<dyn VectorStore>,
    candidate_count: usize,
    relevance_threshold: f32,
    timeout: Duration,
}

impl SemanticRetriever {
    pub fn new(store: Arc<dyn VectorStore>, config: &RetrievalConfig, timeout: Duration) -> Self {
        Self {
            store,
            candidate_count: config.candidate_count,
            relevance_threshold: config.relevance_threshold,
            timeout,
        }
    }

    pub async fn retrieve(&self, query: &str) -> SemanticContext {
        match self.candidates(query).await {
            Ok(candidates) => {
                let context = select_relevant(candidates, self.relevance_threshold);
                match &context {
                    SemanticContext::Relevant(docs) => {
                        tracing::debug!(relevant = docs.len(), "Semantic context retrieved")
                    }
                    SemanticContext::LowConfidence(doc) => tracing::info!(
                        distance = doc.distance,
                        threshold = self.relevance_threshold,
                        "No candidate under the relevance threshold; keeping the nearest"
                    ),
                    _ => tracing::info!("Document store returned no candidates"),
                }
                context
            }
            Err(e) => {
                tracing::warn!(error = %e, "Semantic retrieval failed");
                SemanticContext::Unavailable(e.to_string())
            }
        }
    }

    /// Whether the store answers at all.
    pub async fn is_reachable(&self) -> bool {
        self.count().await.is_ok()
    }

    async fn candidates(&self, query: &str) -> LumenResult<Vec<RetrievedDocument>> {
        with_deadline(
            self.timeout,
            self.store.query(query, self.candidate_count),
            |timeout_ms| LumenError::Vector(VectorError::Timeout { timeout_ms }),
        )
        .await
    }

    async fn count(&self) -> LumenResult<usize> {
        with_deadline(self.timeout, self.store.count(), |timeout_ms| {
            LumenError::Vector(VectorError::Timeout { timeout_ms })
        })
        .await
    }
}

impl std::fmt::Debug for SemanticRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticRetriever")
            .field("candidate_count", &self.candidate_count)
            .field("relevance_threshold", &self.relevance_threshold)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Keep candidates strictly below `threshold`, nearest first. When none
/// pass, keep the single nearest candidate as low-confidence.
pub fn select_relevant(mut candidates: Vec<RetrievedDocument>, threshold: f32) -> SemanticContext {
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let relevant: Vec<RetrievedDocument> = candidates
        .iter()
        .filter(|d| d.distance < threshold)
        .cloned()
        .collect();
    if !relevant.is_empty() {
        return SemanticContext::Relevant(relevant);
    }

    match candidates.into_iter().next() {
        Some(nearest) => SemanticContext::LowConfidence(nearest),
        None => SemanticContext::NoDocuments,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, distance: f32) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            text: format!("passage {id}"),
            distance,
            metadata: None,
        }
    }

    #[test]
    fn test_relevant_sorted_ascending() {
        let ctx = select_relevant(vec![doc("b", 1.5), doc("a", 0.3), doc("c", 2.5)], 2.0);
        match ctx {
            SemanticContext::Relevant(docs) => {
                let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b"]);
            }
            other => panic!("expected relevant context, got {other:?}"),
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        let ctx = select_relevant(vec![doc("edge", 2.0)], 2.0);
        assert!(ctx.is_low_confidence());
    }

    #[test]
    fn test_low_confidence_keeps_nearest() {
        let ctx = select_relevant(vec![doc("far", 3.5), doc("near", 2.2), doc("mid", 3.0)], 2.0);
        assert_eq!(ctx, SemanticContext::LowConfidence(doc("near", 2.2)));
    }

    #[test]
    fn test_no_candidates() {
        assert_eq!(select_relevant(Vec::new(), 2.0), SemanticContext::NoDocuments);
    }
}
