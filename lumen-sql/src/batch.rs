//! Splitting synthesized text into a bounded statement batch

use lumen_core::{strip_leading_comments, StatementKind};

/// Ordered, bounded list of statements taken from one synthesized response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementBatch {
    statements: Vec<String>,
    discarded: Vec<String>,
}

impl StatementBatch {
    /// Split `raw` on `;` terminators and keep the first `max_statements`
    /// non-empty trimmed statements.
    ///
    /// Terminators inside single-quoted literals, double-quoted or
    /// backtick/bracket-quoted identifiers, and `--` / `/* */` comments do not
    /// split.
    pub fn parse(raw: &str, max_statements: usize) -> Self {
        let mut all = split_statements(raw);
        let discarded = if all.len() > max_statements {
            all.split_off(max_statements)
        } else {
            Vec::new()
        };
        Self {
            statements: all,
            discarded,
        }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Statements beyond the limit, in original order.
    pub fn discarded(&self) -> &[String] {
        &self.discarded
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn kinds(&self) -> Vec<StatementKind> {
        self.statements
            .iter()
            .map(|s| StatementKind::classify(s))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Split on top-level `;`, dropping empty statements.
pub fn split_statements(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut state = Scan::Code;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Scan::Code => match c {
                ';' => {
                    push_trimmed(&mut out, &current);
                    current.clear();
                    continue;
                }
                '\'' | '"' | '`' => state = Scan::Quoted(c),
                '[' => state = Scan::Quoted(']'),
                '-' if chars.peek() == Some(&'-') => state = Scan::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    current.push(c);
                    if let Some(star) = chars.next() {
                        current.push(star);
                    }
                    state = Scan::BlockComment;
                    continue;
                }
                _ => {}
            },
            // A doubled quote closes and immediately reopens, which keeps
            // escaped quotes inside the literal.
            Scan::Quoted(close) if c == close => state = Scan::Code,
            Scan::Quoted(_) => {}
            Scan::LineComment if c == '\n' => state = Scan::Code,
            Scan::LineComment => {}
            Scan::BlockComment if c == '*' && chars.peek() == Some(&'/') => {
                current.push(c);
                if let Some(slash) = chars.next() {
                    current.push(slash);
                }
                state = Scan::Code;
                continue;
            }
            Scan::BlockComment => {}
        }
        current.push(c);
    }
    push_trimmed(&mut out, &current);
    out
}

fn push_trimmed(out: &mut Vec<String>, statement: &str) {
    let trimmed = statement.trim();
    if !trimmed.is_empty() && !is_comment_only(trimmed) {
        out.push(trimmed.to_string());
    }
}

fn is_comment_only(statement: &str) -> bool {
    strip_leading_comments(statement).is_empty()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple() {
        let parts = split_statements("SELECT 1; SELECT 2;");
        assert_eq!(parts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_semicolon_in_literal_does_not_split() {
        let parts = split_statements(
            "UPDATE contacts SET Commentaire = 'rappel; lundi' WHERE LOWER(Nom) = 'durand'; SELECT 1",
        );
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("'durand'"));
    }

    #[test]
    fn test_doubled_apostrophe_stays_in_literal() {
        let parts = split_statements("INSERT INTO companies (Société) VALUES ('L''Oréal; SA')");
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_quoted_identifier_with_apostrophe() {
        let parts =
            split_statements("SELECT \"Secteur d'activité\", COUNT(*) FROM contacts GROUP BY 1; SELECT 2");
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("GROUP BY 1"));
    }

    #[test]
    fn test_comments() {
        let parts = split_statements("-- note; ignore\nSELECT 1; /* a;b */ SELECT 2");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], "/* a;b */ SELECT 2");
    }

    #[test]
    fn test_comment_only_tail_dropped() {
        let parts = split_statements("SELECT 1;\n-- done");
        assert_eq!(parts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_block_comment_only_fragment_dropped() {
        let parts = split_statements("SELECT 1; /* fin du lot */; -- note\n/* x */ ; SELECT 2");
        assert_eq!(parts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_block_comments_do_not_count_toward_limit() {
        let batch = StatementBatch::parse("/* a */; SELECT 1; /* b */; SELECT 2; SELECT 3", 3);
        assert_eq!(batch.len(), 3);
        assert!(batch.discarded().is_empty());
    }

    #[test]
    fn test_commented_mutation_kind() {
        let batch = StatementBatch::parse("-- ajout\nINSERT INTO companies VALUES ('a')", 3);
        assert_eq!(batch.kinds(), vec![StatementKind::Mutation]);
    }

    #[test]
    fn test_empty_statements_dropped() {
        assert!(split_statements(" ;; ; ").is_empty());
    }

    #[test]
    fn test_batch_truncates() {
        let batch = StatementBatch::parse("SELECT 1; SELECT 2; SELECT 3; SELECT 4; SELECT 5", 3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.discarded(), &["SELECT 4".to_string(), "SELECT 5".to_string()]);
    }

    #[test]
    fn test_batch_kinds() {
        let batch = StatementBatch::parse("INSERT INTO companies VALUES ('a'); SELECT * FROM companies", 3);
        assert_eq!(
            batch.kinds(),
            vec![StatementKind::Mutation, StatementKind::Retrieval]
        );
    }
}
