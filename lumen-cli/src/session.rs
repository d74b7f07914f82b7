//! REPL commands and the bounded conversation history.

use lumen_core::{ConversationTurn, Dataset, ExecutionOutcome, Request, SemanticContext};
use std::path::PathBuf;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A request for the orchestrator.
    Ask(String),
    /// `:ingest <path>`
    Ingest(PathBuf),
    /// `:forget <source>`
    Forget(String),
    /// `:preview <body template>`: personalize the last dataset without sending.
    Preview(String),
    History,
    Clear,
    /// Toggle JSON output.
    Json,
    Help,
    Quit,
    Empty,
    /// A `:command` that needs an argument and got none.
    MissingArgument(&'static str),
    Unknown(String),
}

pub const HELP: &str = "Commandes :
  :ingest <fichier>     ajoute un document texte à la base documentaire
  :forget <source>      supprime tous les extraits d'une source
  :preview <modèle>     personnalise un email pour les premiers contacts du dernier résultat
  :history              affiche l'historique de la conversation
  :clear                efface l'historique
  :json                 bascule la sortie JSON
  :help                 affiche cette aide
  :quit                 quitte
Toute autre ligne est envoyée comme question.";

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix(':') else {
            return Command::Ask(line.to_string());
        };
        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        match name {
            "ingest" if argument.is_empty() => Command::MissingArgument("ingest"),
            "ingest" => Command::Ingest(PathBuf::from(argument)),
            "forget" if argument.is_empty() => Command::MissingArgument("forget"),
            "forget" => Command::Forget(argument.to_string()),
            "preview" if argument.is_empty() => Command::MissingArgument("preview"),
            "preview" => Command::Preview(argument.to_string()),
            "history" => Command::History,
            "clear" => Command::Clear,
            "json" => Command::Json,
            "help" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Conversation state carried between cycles.
#[derive(Debug, Clone)]
pub struct Session {
    history: Vec<ConversationTurn>,
    max_turns: usize,
    last_dataset: Option<Dataset>,
    pub json: bool,
}

impl Session {
    pub fn new(max_turns: usize, json: bool) -> Self {
        Self {
            history: Vec::new(),
            max_turns,
            last_dataset: None,
            json,
        }
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn last_dataset(&self) -> Option<&Dataset> {
        self.last_dataset.as_ref()
    }

    pub fn request(&self, text: &str) -> Request {
        Request::new(text).with_history(self.history.clone())
    }

    /// Append the exchange and drop the oldest turns beyond the limit.
    pub fn record(&mut self, outcome: &ExecutionOutcome) {
        self.history
            .push(ConversationTurn::user(outcome.request.text.clone()));
        self.history
            .push(ConversationTurn::assistant(assistant_summary(outcome)));
        let excess = self.history.len().saturating_sub(self.max_turns);
        self.history.drain(..excess);
        if let Some(dataset) = &outcome.dataset {
            self.last_dataset = Some(dataset.clone());
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.last_dataset = None;
    }
}

/// What the assistant turn records: enough for the router to recognise a
/// follow-up and for prompts to resolve references.
pub fn assistant_summary(outcome: &ExecutionOutcome) -> String {
    let mut parts = Vec::new();
    if let Some(sql) = &outcome.sql {
        parts.push(format!("Requête SQL : {}", sql.text));
    }
    if let Some(dataset) = &outcome.dataset {
        parts.push(format!(
            "Résultat : {} ligne(s), colonnes {}",
            dataset.len(),
            dataset.columns.join(", ")
        ));
    }
    if let Some(context) = &outcome.semantic_context {
        parts.push(format!("Documents : {}", context_summary(context)));
    }
    if let Some(error) = &outcome.error {
        parts.push(format!("Erreur : {error}"));
    }
    if parts.is_empty() {
        parts.push("Aucun résultat.".to_string());
    }
    parts.join("\n")
}

pub fn context_summary(context: &SemanticContext) -> String {
    match context {
        SemanticContext::Relevant(docs) => format!("{} passage(s) pertinent(s)", docs.len()),
        SemanticContext::LowConfidence(doc) => {
            format!("1 passage de faible pertinence (distance {:.3})", doc.distance)
        }
        SemanticContext::NoDocuments => "aucun document".to_string(),
        SemanticContext::Unavailable(reason) => format!("base documentaire indisponible : {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  "), Command::Empty);
        assert_eq!(
            Command::parse("combien de contacts ?"),
            Command::Ask("combien de contacts ?".to_string())
        );
        assert_eq!(
            Command::parse(":ingest  notes/rapport 2023.txt "),
            Command::Ingest(PathBuf::from("notes/rapport 2023.txt"))
        );
        assert_eq!(
            Command::parse(":forget rapport.txt"),
            Command::Forget("rapport.txt".to_string())
        );
        assert_eq!(Command::parse(":ingest"), Command::MissingArgument("ingest"));
        assert_eq!(Command::parse(":q"), Command::Quit);
        assert_eq!(Command::parse(":json"), Command::Json);
        assert_eq!(Command::parse(":nope"), Command::Unknown("nope".to_string()));
    }
}
