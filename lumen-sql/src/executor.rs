//! Bounded, failure-isolated statement execution

use crate::batch::StatementBatch;
use crate::RelationalStore;
use lumen_core::{
    with_deadline, LumenError, LumenResult, StatementKind, StatementOutput, StatementResult,
    StorageError,
};
use std::sync::Arc;
use std::time::Duration;

/// Runs a synthesized batch statement by statement against a
/// [`RelationalStore`].
///
/// Each statement gets its own deadline. A failed statement is recorded and
/// the next one still runs; nothing is retried.
#[derive(Clone)]
pub struct StructuredQueryExecutor {
    store: Arc<dyn RelationalStore>,
    max_statements: usize,
    timeout: Duration,
}

impl StructuredQueryExecutor {
    pub fn new(store: Arc<dyn RelationalStore>, max_statements: usize, timeout: Duration) -> Self {
        Self {
            store,
            max_statements,
            timeout,
        }
    }

    /// Split `raw` and execute up to `max_statements` statements in order.
    /// Returns one result per executed statement.
    pub async fn execute(&self, raw: &str) -> Vec<StatementResult> {
        let batch = StatementBatch::parse(raw, self.max_statements);
        if !batch.discarded().is_empty() {
            tracing::warn!(
                kept = batch.len(),
                discarded = batch.discarded().len(),
                limit = self.max_statements,
                "Statement batch truncated"
            );
        }
        tracing::debug!(statements = batch.len(), "Executing statement batch");

        let mut results = Vec::with_capacity(batch.len());
        for (index, statement) in batch.statements().iter().enumerate() {
            let kind = StatementKind::classify(statement);
            let result = match self.run_one(statement, kind).await {
                Ok(output) => StatementResult::success(index, statement.clone(), kind, output),
                Err(e) => {
                    tracing::warn!(
                        index,
                        kind = ?kind,
                        error = %e,
                        "Statement failed; continuing with the rest of the batch"
                    );
                    StatementResult::failure(index, statement.clone(), kind, error_text(&e))
                }
            };
            results.push(result);
        }
        results
    }

    /// Whether the store answers a round trip within the statement deadline.
    pub async fn is_reachable(&self) -> bool {
        let ping = with_deadline(self.timeout, self.store.ping(), |timeout_ms| {
            LumenError::Storage(StorageError::Timeout {
                operation: "ping".to_string(),
                timeout_ms,
            })
        })
        .await;
        ping.is_ok()
    }

    async fn run_one(&self, statement: &str, kind: StatementKind) -> LumenResult<StatementOutput> {
        let operation = match kind {
            StatementKind::Mutation => "execute",
            StatementKind::Retrieval => "query",
        };
        let on_timeout = |timeout_ms| {
            LumenError::Storage(StorageError::Timeout {
                operation: operation.to_string(),
                timeout_ms,
            })
        };
        match kind {
            StatementKind::Mutation => {
                let ack = with_deadline(self.timeout, self.store.execute(statement), on_timeout).await?;
                Ok(StatementOutput::Mutation(ack))
            }
            StatementKind::Retrieval => {
                let rows = with_deadline(self.timeout, self.store.query(statement), on_timeout).await?;
                Ok(StatementOutput::Rows(rows))
            }
        }
    }
}

impl std::fmt::Debug for StructuredQueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredQueryExecutor")
            .field("max_statements", &self.max_statements)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Innermost message of a storage error, without the category prefix.
fn error_text(e: &LumenError) -> String {
    match e {
        LumenError::Storage(inner) => inner.to_string(),
        other => other.to_string(),
    }
}
