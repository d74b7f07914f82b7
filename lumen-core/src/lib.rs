//! LUMEN Core - Shared Types
//!
//! Data structures, errors and configuration shared by every Lumen crate.
//! Collaborator traits live with the crates that implement them.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod config;
pub mod conversation;
pub mod dataset;
pub mod deadline;
pub mod embedding;
pub mod error;
pub mod outcome;
pub mod retrieval;
pub mod routing;
pub mod statement;

pub use config::*;
pub use conversation::*;
pub use dataset::*;
pub use deadline::with_deadline;
pub use embedding::*;
pub use error::*;
pub use outcome::*;
pub use retrieval::*;
pub use routing::*;
pub use statement::*;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier of an orchestration cycle. UUIDv7, so ids sort by start time.
pub type CycleId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash.
pub type ContentHash = [u8; 32];

pub fn new_cycle_id() -> CycleId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_content_hash_deterministic(content in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(compute_content_hash(&content), compute_content_hash(&content));
        }

        #[test]
        fn prop_statement_classification_ignores_case(
            verb in prop_oneof![Just("insert"), Just("update"), Just("delete")],
            upper in any::<bool>(),
            rest in "[ a-z0-9_]{0,30}",
        ) {
            let verb = if upper { verb.to_uppercase() } else { verb.to_string() };
            let statement = format!("{verb} {rest}");
            prop_assert_eq!(StatementKind::classify(&statement), StatementKind::Mutation);
        }

        #[test]
        fn prop_squared_l2_within_bounds(
            a in proptest::collection::vec(-10.0f32..10.0, 4),
            b in proptest::collection::vec(-10.0f32..10.0, 4),
        ) {
            let va = EmbeddingVector::new(a, "m".into());
            let vb = EmbeddingVector::new(b, "m".into());
            let d = va.squared_l2_distance(&vb).unwrap();
            prop_assert!(d >= -1e-4 && d <= 4.0 + 1e-4);
        }

        #[test]
        fn prop_dataset_head_never_exceeds(n in 0usize..20, rows in 0usize..20) {
            let ds = Dataset::new(
                vec!["x".into()],
                (0..rows).map(|i| vec![Cell::Integer(i as i64)]).collect(),
            );
            prop_assert_eq!(ds.head(n).len(), n.min(rows));
        }
    }
}
