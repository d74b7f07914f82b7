//! LUMEN SQL - Structured Path
//!
//! The relational store seam, its SQLite adapter, natural-language to SQL
//! synthesis, and the bounded, failure-isolated statement executor.

use async_trait::async_trait;
use lumen_core::{Dataset, LumenResult, MutationAck};

pub mod batch;
pub mod executor;
pub mod schema;
pub mod sqlite;
pub mod synthesizer;

pub use batch::StatementBatch;
pub use executor::StructuredQueryExecutor;
pub use sqlite::SqliteStore;
pub use synthesizer::StructuredQuerySynthesizer;

/// A relational store that executes raw statement text.
///
/// Every `execute` is committed before it returns; there is no batch-level
/// transaction.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Run a data-mutation statement and commit it.
    async fn execute(&self, statement: &str) -> LumenResult<MutationAck>;

    /// Run a retrieval statement and materialize the full result set.
    async fn query(&self, statement: &str) -> LumenResult<Dataset>;

    /// Cheap round trip proving the store answers.
    async fn ping(&self) -> LumenResult<()>;
}
