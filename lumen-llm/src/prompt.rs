//! Prompt assembly
//!
//! A prompt is an ordered list of titled sections joined by blank lines.
//! Synthesizers own their task templates; this module supplies the shared
//! pieces: conversation history, retrieved passages, dataset previews.

use lumen_core::{ConversationTurn, Dataset, SemanticContext};
use serde::{Deserialize, Serialize};

/// Kind of prompt section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionKind {
    /// Task description and rules
    Instructions,
    /// Schema or column description
    Schema,
    /// Prior conversation turns
    History,
    /// Retrieved passages
    Documents,
    /// Sample rows of a dataset
    Data,
    /// The user's request
    Request,
    /// Trailing output-format reminder
    Output,
}

/// One titled block of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSection {
    pub kind: SectionKind,
    pub title: Option<String>,
    pub content: String,
}

impl PromptSection {
    pub fn new(kind: SectionKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            title: None,
            content: content.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    fn render(&self) -> String {
        match &self.title {
            Some(title) => format!("{title} :\n{}", self.content),
            None => self.content.clone(),
        }
    }
}

/// Builder for prompt text.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(mut self, section: PromptSection) -> Self {
        if !section.content.trim().is_empty() {
            self.sections.push(section);
        }
        self
    }

    pub fn instructions(self, text: impl Into<String>) -> Self {
        self.section(PromptSection::new(SectionKind::Instructions, text))
    }

    pub fn schema(self, text: impl Into<String>) -> Self {
        self.section(PromptSection::new(SectionKind::Schema, text).with_title("Schéma"))
    }

    /// Append the last `limit` turns of history. Nothing is added when the
    /// history is empty.
    pub fn history(self, turns: &[ConversationTurn], limit: usize) -> Self {
        let text = format_history(turns, limit);
        self.section(
            PromptSection::new(SectionKind::History, text).with_title("Historique de la conversation"),
        )
    }

    pub fn documents(self, context: &SemanticContext) -> Self {
        let title = if context.is_low_confidence() {
            "Documents (faible pertinence, à utiliser avec prudence)"
        } else {
            "Documents"
        };
        self.section(PromptSection::new(SectionKind::Documents, context.text()).with_title(title))
    }

    pub fn data(self, dataset: &Dataset, preview_rows: usize) -> Self {
        let text = format!(
            "Colonnes : {}\nPremières lignes :\n{}",
            dataset.columns.join(", "),
            dataset.preview(preview_rows)
        );
        self.section(PromptSection::new(SectionKind::Data, text).with_title("Données (df)"))
    }

    pub fn request(self, text: impl Into<String>) -> Self {
        self.section(PromptSection::new(SectionKind::Request, text).with_title("Demande"))
    }

    pub fn output(self, text: impl Into<String>) -> Self {
        self.section(PromptSection::new(SectionKind::Output, text))
    }

    pub fn sections(&self) -> &[PromptSection] {
        &self.sections
    }

    pub fn build(&self) -> String {
        self.sections
            .iter()
            .map(PromptSection::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Render history as `role: content` lines, most recent last.
pub fn format_history(turns: &[ConversationTurn], limit: usize) -> String {
    let start = turns.len().saturating_sub(limit);
    turns[start..]
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to at most `max_chars` characters, cutting at a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{Cell, RetrievedDocument};

    #[test]
    fn test_empty_sections_skipped() {
        let prompt = PromptBuilder::new()
            .instructions("Réponds.")
            .history(&[], 6)
            .request("bonjour")
            .build();
        assert_eq!(prompt, "Réponds.\n\nDemande :\nbonjour");
    }

    #[test]
    fn test_history_window() {
        let turns: Vec<_> = (0..8)
            .map(|i| ConversationTurn::user(format!("m{i}")))
            .collect();
        let text = format_history(&turns, 2);
        assert_eq!(text, "user: m6\nuser: m7");
    }

    #[test]
    fn test_low_confidence_documents_labelled() {
        let ctx = SemanticContext::LowConfidence(RetrievedDocument {
            id: "a".into(),
            text: "passage".into(),
            distance: 2.4,
            metadata: None,
        });
        let prompt = PromptBuilder::new().documents(&ctx).build();
        assert!(prompt.contains("faible pertinence"));
        assert!(prompt.contains("passage"));
    }

    #[test]
    fn test_data_section_lists_columns() {
        let ds = Dataset::new(
            vec!["Nom".into(), "Société".into()],
            vec![vec![Cell::from("Durand"), Cell::from("Acme")]],
        );
        let prompt = PromptBuilder::new().data(&ds, 5).build();
        assert!(prompt.contains("Colonnes : Nom, Société"));
        assert!(prompt.contains("Durand | Acme"));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("société", 4), "soci");
        assert_eq!(truncate_chars("é", 5), "é");
    }
}
