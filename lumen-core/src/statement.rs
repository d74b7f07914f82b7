//! Statement batches and per-statement results

use crate::Dataset;
use serde::{Deserialize, Serialize};

/// Whether a statement changes data or reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Mutation,
    Retrieval,
}

impl StatementKind {
    /// Statements starting with insert, update or delete (any case) are
    /// mutations. Everything else is treated as a retrieval. Leading comments
    /// are ignored.
    pub fn classify(statement: &str) -> Self {
        let head: String = strip_leading_comments(statement)
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();
        match head.as_str() {
            "insert" | "update" | "delete" => StatementKind::Mutation,
            _ => StatementKind::Retrieval,
        }
    }
}

/// `statement` without the whitespace, `--` line comments and `/* */` block
/// comments in front of its first keyword. An unterminated comment swallows
/// the rest.
pub fn strip_leading_comments(statement: &str) -> &str {
    let mut rest = statement.trim_start();
    loop {
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map_or("", |(_, after)| after);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, after)| after);
        } else {
            return rest;
        }
        rest = rest.trim_start();
    }
}

/// Acknowledgement of a committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationAck {
    pub rows_affected: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatementOutput {
    Rows(Dataset),
    Mutation(MutationAck),
}

/// Outcome of one entry of a statement batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    /// Position in the batch, starting at 0.
    pub index: usize,
    pub statement: String,
    pub kind: StatementKind,
    pub output: Option<StatementOutput>,
    pub error: Option<String>,
}

impl StatementResult {
    pub fn success(index: usize, statement: String, kind: StatementKind, output: StatementOutput) -> Self {
        Self {
            index,
            statement,
            kind,
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(index: usize, statement: String, kind: StatementKind, error: String) -> Self {
        Self {
            index,
            statement,
            kind,
            output: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The result set, when this was a successful retrieval.
    pub fn dataset(&self) -> Option<&Dataset> {
        match &self.output {
            Some(StatementOutput::Rows(ds)) => Some(ds),
            _ => None,
        }
    }
}

/// Dataset of the last successful retrieval statement in a batch.
pub fn last_retrieved_dataset(results: &[StatementResult]) -> Option<&Dataset> {
    results.iter().rev().find_map(|r| r.dataset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cell;

    #[test]
    fn test_classify() {
        assert_eq!(
            StatementKind::classify("INSERT INTO companies VALUES ('x')"),
            StatementKind::Mutation
        );
        assert_eq!(
            StatementKind::classify("  update contacts SET Poste = 'CTO'"),
            StatementKind::Mutation
        );
        assert_eq!(
            StatementKind::classify("Delete FROM contacts"),
            StatementKind::Mutation
        );
        assert_eq!(
            StatementKind::classify("SELECT * FROM contacts"),
            StatementKind::Retrieval
        );
        assert_eq!(
            StatementKind::classify("inserted_rows"),
            StatementKind::Retrieval
        );
    }

    #[test]
    fn test_classify_skips_leading_comments() {
        assert_eq!(
            StatementKind::classify("-- ajout du contact\nINSERT INTO companies VALUES ('x')"),
            StatementKind::Mutation
        );
        assert_eq!(
            StatementKind::classify("/* maj */ /* poste */\n  UPDATE contacts SET Poste = 'CTO'"),
            StatementKind::Mutation
        );
        assert_eq!(
            StatementKind::classify("-- DELETE FROM contacts\nSELECT * FROM contacts"),
            StatementKind::Retrieval
        );
    }

    #[test]
    fn test_strip_leading_comments() {
        assert_eq!(strip_leading_comments("  -- a\n/* b */ SELECT 1"), "SELECT 1");
        assert_eq!(strip_leading_comments("/* open"), "");
        assert_eq!(strip_leading_comments("-- only"), "");
        assert_eq!(strip_leading_comments("SELECT 1 -- tail"), "SELECT 1 -- tail");
    }

    #[test]
    fn test_last_retrieved_dataset_skips_failures_and_mutations() {
        let first = Dataset::new(vec!["a".into()], vec![vec![Cell::Integer(1)]]);
        let results = vec![
            StatementResult::success(
                0,
                "SELECT 1 AS a".into(),
                StatementKind::Retrieval,
                StatementOutput::Rows(first.clone()),
            ),
            StatementResult::success(
                1,
                "INSERT INTO t VALUES (1)".into(),
                StatementKind::Mutation,
                StatementOutput::Mutation(MutationAck { rows_affected: 1 }),
            ),
            StatementResult::failure(
                2,
                "SELECT * FROM missing".into(),
                StatementKind::Retrieval,
                "no such table: missing".into(),
            ),
        ];
        assert_eq!(last_retrieved_dataset(&results), Some(&first));
    }
}
