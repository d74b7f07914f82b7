//! LUMEN Test Utilities
//!
//! Shared test infrastructure for the Lumen workspace:
//! - Fake collaborators (completion, embedding, stores, message sender)
//! - Proptest generators for core types
//! - Fixtures for common scenarios
//! - Assertions for Lumen-specific results

pub use lumen_core::{
    Cell, ConversationTurn, Dataset, DocumentChunk, DocumentMetadata, EmbeddingVector, LlmError,
    LumenConfig, LumenError, LumenResult, MutationAck, Request, RetrievedDocument,
    SemanticContext, StatementResult, StorageError, VectorError,
};
pub use lumen_campaign::{CampaignError, CampaignResult, MessageSender, OutgoingMessage};
pub use lumen_llm::{CompletionProvider, CompletionRequest, EmbeddingProvider};
pub use lumen_sql::RelationalStore;
pub use lumen_vector::VectorStore;

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// COMPLETION PROVIDERS
// ============================================================================

/// Completion provider that replays a script of responses and records every
/// request it receives.
///
/// Once the script is exhausted the fallback response is returned.
#[derive(Debug)]
pub struct ScriptedCompletionProvider {
    script: Mutex<VecDeque<LumenResult<String>>>,
    fallback: String,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedCompletionProvider {
    pub fn new() -> Self {
        Self::with_fallback("")
    }

    pub fn with_fallback(fallback: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Provider whose first responses are `responses`, in order.
    pub fn replying<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for response in responses {
            provider.push_response(response);
        }
        provider
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.lock_script().push_back(Ok(response.into()));
    }

    pub fn push_error(&self, error: LumenError) {
        self.lock_script().push_back(Err(error));
    }

    /// Number of `complete` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Last user message of every request received.
    pub fn prompts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.last_user_content().map(str::to_string))
            .collect()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<LumenResult<String>>> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for ScriptedCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletionProvider {
    async fn complete(&self, request: &CompletionRequest) -> LumenResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match self.lock_script().pop_front() {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
        }
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

/// Completion provider that is never reachable.
#[derive(Debug, Default)]
pub struct UnavailableCompletionProvider {
    calls: AtomicUsize,
}

impl UnavailableCompletionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for UnavailableCompletionProvider {
    async fn complete(&self, _request: &CompletionRequest) -> LumenResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LumenError::Llm(LlmError::RequestFailed {
            provider: "unavailable".to_string(),
            status: 0,
            message: "connection refused".to_string(),
        }))
    }

    fn provider_id(&self) -> &str {
        "unavailable"
    }
}

/// Completion provider that answers only after `delay`.
#[derive(Debug)]
pub struct SlowCompletionProvider {
    delay: Duration,
    response: String,
}

impl SlowCompletionProvider {
    pub fn new(delay: Duration, response: impl Into<String>) -> Self {
        Self {
            delay,
            response: response.into(),
        }
    }
}

#[async_trait]
impl CompletionProvider for SlowCompletionProvider {
    async fn complete(&self, _request: &CompletionRequest) -> LumenResult<String> {
        tokio::time::sleep(self.delay).await;
        Ok(self.response.clone())
    }

    fn provider_id(&self) -> &str {
        "slow"
    }
}

// ============================================================================
// EMBEDDING PROVIDER
// ============================================================================

/// Deterministic embedding provider: bytes folded into a fixed number of
/// dimensions, then unit-normalized.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    model_id: String,
    dimensions: i32,
}

impl MockEmbeddingProvider {
    pub fn new(model_id: impl Into<String>, dimensions: i32) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions,
        }
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let dims = self.dimensions.max(1) as usize;
        let mut data = vec![0.0f32; dims];

        for (i, byte) in text.bytes().enumerate() {
            data[i % dims] += (byte as f32) / 255.0;
        }

        let norm: f32 = data.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut data {
                *x /= norm;
            }
        } else {
            data[0] = 1.0;
        }

        data
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new("mock-embedding", 16)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> LumenResult<EmbeddingVector> {
        Ok(EmbeddingVector::new(
            self.generate_embedding(text),
            self.model_id.clone(),
        ))
    }

    async fn embed_batch(&self, texts: &[&str]) -> LumenResult<Vec<EmbeddingVector>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimensions(&self) -> i32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// RELATIONAL STORES
// ============================================================================

/// Relational store that refuses every call.
#[derive(Debug, Default)]
pub struct UnavailableRelationalStore;

#[async_trait]
impl RelationalStore for UnavailableRelationalStore {
    async fn execute(&self, _statement: &str) -> LumenResult<MutationAck> {
        Err(StorageError::Unavailable {
            reason: "database is offline".to_string(),
        }
        .into())
    }

    async fn query(&self, _statement: &str) -> LumenResult<Dataset> {
        Err(StorageError::Unavailable {
            reason: "database is offline".to_string(),
        }
        .into())
    }

    async fn ping(&self) -> LumenResult<()> {
        Err(StorageError::Unavailable {
            reason: "database is offline".to_string(),
        }
        .into())
    }
}

/// Relational store that never answers statements containing `marker`
/// and delegates everything else.
pub struct StallingRelationalStore<S> {
    inner: S,
    marker: String,
}

impl<S: RelationalStore> StallingRelationalStore<S> {
    pub fn new(inner: S, marker: impl Into<String>) -> Self {
        Self {
            inner,
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl<S: RelationalStore> RelationalStore for StallingRelationalStore<S> {
    async fn execute(&self, statement: &str) -> LumenResult<MutationAck> {
        if statement.contains(&self.marker) {
            std::future::pending::<()>().await;
        }
        self.inner.execute(statement).await
    }

    async fn query(&self, statement: &str) -> LumenResult<Dataset> {
        if statement.contains(&self.marker) {
            std::future::pending::<()>().await;
        }
        self.inner.query(statement).await
    }

    async fn ping(&self) -> LumenResult<()> {
        self.inner.ping().await
    }
}

/// Relational store that records statements and answers every query with a
/// fixed dataset.
#[derive(Debug, Default)]
pub struct RecordingRelationalStore {
    dataset: Dataset,
    statements: Mutex<Vec<String>>,
}

impl RecordingRelationalStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn record(&self, statement: &str) {
        if let Ok(mut statements) = self.statements.lock() {
            statements.push(statement.to_string());
        }
    }
}

#[async_trait]
impl RelationalStore for RecordingRelationalStore {
    async fn execute(&self, statement: &str) -> LumenResult<MutationAck> {
        self.record(statement);
        Ok(MutationAck { rows_affected: 1 })
    }

    async fn query(&self, statement: &str) -> LumenResult<Dataset> {
        self.record(statement);
        Ok(self.dataset.clone())
    }

    async fn ping(&self) -> LumenResult<()> {
        Ok(())
    }
}

// ============================================================================
// VECTOR STORES
// ============================================================================

/// Vector store holding documents at preset distances from every query.
#[derive(Debug, Default)]
pub struct FixedDistanceVectorStore {
    documents: Mutex<Vec<RetrievedDocument>>,
    queries: AtomicUsize,
}

impl FixedDistanceVectorStore {
    pub fn new(documents: Vec<RetrievedDocument>) -> Self {
        Self {
            documents: Mutex::new(documents),
            queries: AtomicUsize::new(0),
        }
    }

    /// Store with one document per `(text, distance)` pair.
    pub fn with_distances(entries: &[(&str, f32)]) -> Self {
        Self::new(
            entries
                .iter()
                .enumerate()
                .map(|(i, (text, distance))| fixtures::document(&format!("doc-{i}"), text, *distance))
                .collect(),
        )
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn lock(&self) -> LumenResult<std::sync::MutexGuard<'_, Vec<RetrievedDocument>>> {
        self.documents.lock().map_err(|_| {
            LumenError::Vector(VectorError::StoreUnavailable {
                reason: "lock poisoned".to_string(),
            })
        })
    }
}

#[async_trait]
impl VectorStore for FixedDistanceVectorStore {
    async fn query(&self, _text: &str, limit: usize) -> LumenResult<Vec<RetrievedDocument>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut docs = self.lock()?.clone();
        docs.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        docs.truncate(limit);
        Ok(docs)
    }

    async fn insert(&self, chunks: &[DocumentChunk]) -> LumenResult<usize> {
        let mut docs = self.lock()?;
        for chunk in chunks {
            docs.push(RetrievedDocument {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                distance: 0.0,
                metadata: Some(chunk.metadata.clone()),
            });
        }
        Ok(chunks.len())
    }

    async fn remove_source(&self, source: &str) -> LumenResult<usize> {
        let mut docs = self.lock()?;
        let before = docs.len();
        docs.retain(|d| d.metadata.as_ref().map(|m| m.source.as_str()) != Some(source));
        Ok(before - docs.len())
    }

    async fn count(&self) -> LumenResult<usize> {
        Ok(self.lock()?.len())
    }
}

/// Vector store that refuses every call.
#[derive(Debug, Default)]
pub struct UnavailableVectorStore;

impl UnavailableVectorStore {
    fn error() -> LumenError {
        LumenError::Vector(VectorError::StoreUnavailable {
            reason: "vector store is offline".to_string(),
        })
    }
}

#[async_trait]
impl VectorStore for UnavailableVectorStore {
    async fn query(&self, _text: &str, _limit: usize) -> LumenResult<Vec<RetrievedDocument>> {
        Err(Self::error())
    }

    async fn insert(&self, _chunks: &[DocumentChunk]) -> LumenResult<usize> {
        Err(Self::error())
    }

    async fn remove_source(&self, _source: &str) -> LumenResult<usize> {
        Err(Self::error())
    }

    async fn count(&self) -> LumenResult<usize> {
        Err(Self::error())
    }
}

// ============================================================================
// MESSAGE SENDER
// ============================================================================

/// Message sender that records deliveries and rejects chosen recipients.
#[derive(Debug, Default)]
pub struct RecordingMessageSender {
    sent: Mutex<Vec<OutgoingMessage>>,
    rejected: HashSet<String>,
}

impl RecordingMessageSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: Mutex::new(Vec::new()),
            rejected: recipients.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageSender for RecordingMessageSender {
    async fn send(&self, message: &OutgoingMessage) -> CampaignResult<()> {
        if self.rejected.contains(&message.to) {
            return Err(CampaignError::Delivery {
                reason: format!("mailbox {} rejected the message", message.to),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Lumen types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_cell() -> impl Strategy<Value = Cell> {
        prop_oneof![
            Just(Cell::Null),
            any::<i64>().prop_map(Cell::Integer),
            (-1.0e6f64..1.0e6).prop_map(Cell::Real),
            "[A-Za-zéè' ]{0,16}".prop_map(Cell::Text),
        ]
    }

    pub fn arb_column_name() -> impl Strategy<Value = String> {
        "[A-Z][a-zé]{2,10}"
    }

    /// Dataset with 1..=4 distinct columns and up to `max_rows` rows.
    pub fn arb_dataset(max_rows: usize) -> impl Strategy<Value = Dataset> {
        prop::collection::hash_set(arb_column_name(), 1..=4).prop_flat_map(move |names| {
            let columns: Vec<String> = names.into_iter().collect();
            let width = columns.len();
            prop::collection::vec(prop::collection::vec(arb_cell(), width), 0..=max_rows)
                .prop_map(move |rows| Dataset::new(columns.clone(), rows))
        })
    }

    pub fn arb_distance() -> impl Strategy<Value = f32> {
        0.0f32..4.0
    }

    pub fn arb_retrieved_documents(max: usize) -> impl Strategy<Value = Vec<RetrievedDocument>> {
        prop::collection::vec(arb_distance(), 0..=max).prop_map(|distances| {
            distances
                .into_iter()
                .enumerate()
                .map(|(i, d)| fixtures::document(&format!("doc-{i}"), &format!("passage {i}"), d))
                .collect()
        })
    }

    /// Classifier output that is none of the recognized labels.
    pub fn arb_unrecognized_label() -> impl Strategy<Value = String> {
        "[a-z ]{0,12}".prop_filter("recognized label", |s| {
            let upper = s.trim().to_uppercase();
            upper != "SQL" && upper != "VECTOR" && upper != "BOTH"
        })
    }

    pub fn arb_retrieval_statement() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("SELECT * FROM contacts".to_string()),
            Just("SELECT Société FROM companies".to_string()),
            "[a-z]{1,8}".prop_map(|v| format!("SELECT * FROM contacts WHERE LOWER(Nom) = '{v}'")),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values for common scenarios.

    use super::*;
    use chrono::Utc;

    /// Configuration with short timeouts suited to tests.
    pub fn test_config() -> LumenConfig {
        let mut config = LumenConfig::default();
        config.timeouts.completion_ms = 1_000;
        config.timeouts.store_ms = 1_000;
        config
    }

    pub fn document(id: &str, text: &str, distance: f32) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            text: text.to_string(),
            distance,
            metadata: Some(DocumentMetadata {
                source: "notes.txt".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                ingested_at: Utc::now(),
                source_type: "txt".to_string(),
            }),
        }
    }

    pub fn chunk(id: &str, source: &str, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: DocumentMetadata {
                source: source.to_string(),
                chunk_index: 0,
                total_chunks: 1,
                ingested_at: Utc::now(),
                source_type: "txt".to_string(),
            },
        }
    }

    pub fn contact_columns() -> Vec<String> {
        lumen_sql::schema::CONTACT_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    /// Small contact list with a sector breakdown.
    pub fn contacts_dataset() -> Dataset {
        Dataset::new(
            vec![
                "Nom".to_string(),
                "Prénom".to_string(),
                "Email".to_string(),
                "Secteur d'activité".to_string(),
            ],
            vec![
                vec![
                    Cell::from("Durand"),
                    Cell::from("Alice"),
                    Cell::from("alice@acme.fr"),
                    Cell::from("Industrie"),
                ],
                vec![
                    Cell::from("Martin"),
                    Cell::from("Paul"),
                    Cell::from("paul@globex.fr"),
                    Cell::from("Finance"),
                ],
                vec![
                    Cell::from("Petit"),
                    Cell::from("Chloé"),
                    Cell::from("chloe@initech.fr"),
                    Cell::from("Industrie"),
                ],
            ],
        )
    }

    pub fn empty_contacts_dataset() -> Dataset {
        Dataset::empty(contact_columns())
    }

    /// Request whose history established a structured-data context.
    pub fn follow_up_request(text: &str) -> Request {
        Request::new(text).with_history(vec![
            ConversationTurn::user("combien de contacts par secteur dans la base ?"),
            ConversationTurn::assistant("Voici la répartition des contacts par secteur."),
        ])
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for Lumen results.

    use super::*;

    /// Assert the statement at `index` failed and its error mentions `needle`.
    #[track_caller]
    pub fn assert_statement_failed(results: &[StatementResult], index: usize, needle: &str) {
        let result = results
            .get(index)
            .unwrap_or_else(|| panic!("No statement result at index {index}"));
        assert!(!result.is_success(), "Statement {index} succeeded: {:?}", result);
        let error = result.error.as_deref().unwrap_or_default();
        assert!(
            error.contains(needle),
            "Statement {index} error {:?} does not mention {:?}",
            error,
            needle
        );
    }

    #[track_caller]
    pub fn assert_statement_succeeded(results: &[StatementResult], index: usize) {
        let result = results
            .get(index)
            .unwrap_or_else(|| panic!("No statement result at index {index}"));
        assert!(result.is_success(), "Statement {index} failed: {:?}", result.error);
    }

    #[track_caller]
    pub fn assert_valid_embedding(embedding: &EmbeddingVector) {
        assert!(
            embedding.is_valid(),
            "Invalid embedding: dimensions={}, data.len()={}",
            embedding.dimensions,
            embedding.data.len()
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_provider_replays_then_falls_back() {
        let provider = ScriptedCompletionProvider::replying(["SQL"]);
        let request = CompletionRequest::prompt("classify", 0.0);
        assert_eq!(provider.complete(&request).await.unwrap(), "SQL");
        assert_eq!(provider.complete(&request).await.unwrap(), "");
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.prompts(), vec!["classify", "classify"]);
    }

    #[tokio::test]
    async fn test_mock_embedding_is_normalized() {
        let provider = MockEmbeddingProvider::default();
        let embedding = provider.embed("bonjour").await.unwrap();
        assertions::assert_valid_embedding(&embedding);
        let norm: f32 = embedding.data.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_fixed_distance_store_orders_and_limits() {
        let store = FixedDistanceVectorStore::with_distances(&[("far", 3.0), ("near", 0.5), ("mid", 1.0)]);
        let docs = store.query("q", 2).await.unwrap();
        let texts: Vec<_> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["near", "mid"]);
        assert_eq!(store.queries(), 1);
    }

    #[tokio::test]
    async fn test_recording_sender_rejects() {
        let sender = RecordingMessageSender::rejecting(["bad@example.com"]);
        let message = OutgoingMessage {
            to: "bad@example.com".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
            sender_name: "n".to_string(),
        };
        assert!(sender.send(&message).await.is_err());
        assert!(sender.sent().is_empty());
    }
}
