//! LUMEN CLI
//!
//! Interactive front end: one orchestration cycle per input line, with a
//! bounded conversation history and a handful of `:` commands for document
//! management.

pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod providers;
pub mod session;

use crate::config::OutputConfig;
use crate::error::CliResult;
use crate::session::{Command, Session, HELP};
use lumen_campaign::{CampaignTemplate, Personalizer, PreviewResult};
use lumen_core::LumenConfig;
use lumen_llm::CompletionClient;
use lumen_orchestrator::{Collaborators, Orchestrator};
use lumen_vector::DocumentIngestor;
use std::path::Path;

/// Rows personalized by `:preview`.
pub const PREVIEW_COUNT: usize = 3;

/// Result of handling one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

/// REPL state plus the wired components.
#[derive(Debug)]
pub struct App {
    orchestrator: Orchestrator,
    ingestor: DocumentIngestor,
    personalizer: Personalizer,
    output: OutputConfig,
    session: Session,
}

impl App {
    pub fn new(
        lumen: &LumenConfig,
        output: OutputConfig,
        collaborators: Collaborators,
    ) -> CliResult<Self> {
        let ingestor = DocumentIngestor::new(
            collaborators.vector.clone(),
            &lumen.retrieval,
            lumen.timeouts.store(),
        );
        let personalizer = Personalizer::new(
            CompletionClient::new(collaborators.completion.clone(), lumen.timeouts.completion()),
            lumen.llm.clone(),
        );
        let orchestrator = Orchestrator::new(lumen, collaborators)?;
        let session = Session::new(output.history_turns, output.json);
        Ok(Self {
            orchestrator,
            ingestor,
            personalizer,
            output,
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn handle_line(&mut self, line: &str) -> CliResult<Reply> {
        let text = match Command::parse(line) {
            Command::Quit => return Ok(Reply::Quit),
            Command::Empty => String::new(),
            Command::Help => HELP.to_string(),
            Command::Ask(text) => self.ask(&text).await?,
            Command::Ingest(path) => self.ingest(&path).await,
            Command::Forget(source) => match self.ingestor.remove(&source).await {
                Ok(removed) => format!("{removed} extrait(s) supprimé(s) pour {source}"),
                Err(e) => format!("Suppression impossible : {e}"),
            },
            Command::Preview(body) => self.preview(&body).await?,
            Command::History => display::format_history(self.session.history()),
            Command::Clear => {
                self.session.clear();
                "Historique effacé.".to_string()
            }
            Command::Json => {
                self.session.json = !self.session.json;
                format!(
                    "Sortie JSON {}.",
                    if self.session.json { "activée" } else { "désactivée" }
                )
            }
            Command::MissingArgument(name) => format!(":{name} attend un argument (voir :help)"),
            Command::Unknown(name) => format!("Commande inconnue :{name} (voir :help)"),
        };
        Ok(Reply::Text(text))
    }

    async fn ask(&mut self, text: &str) -> CliResult<String> {
        let request = self.session.request(text);
        let outcome = self.orchestrator.handle(request).await;
        let image_path = display::write_image(&self.output.image_dir, &outcome)?;
        self.session.record(&outcome);
        if self.session.json {
            display::format_json(&outcome)
        } else {
            Ok(display::format_outcome(
                &outcome,
                self.output.preview_rows,
                image_path.as_deref(),
            ))
        }
    }

    /// Plain UTF-8 text only; the file name is the source name.
    async fn ingest(&self, path: &Path) -> String {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => return format!("Lecture impossible de {} : {e}", path.display()),
        };
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match self.ingestor.ingest_text(&source, &text).await {
            Ok(report) => format!("{} : {} extrait(s) ajouté(s)", report.source, report.chunks),
            Err(e) => format!("Ingestion impossible : {e}"),
        }
    }

    async fn preview(&self, body: &str) -> CliResult<String> {
        let Some(contacts) = self.session.last_dataset() else {
            return Ok("Aucun résultat de contacts à personnaliser.".to_string());
        };
        let template = CampaignTemplate::new(body);
        let previews = self
            .personalizer
            .preview(contacts, &template, PREVIEW_COUNT)
            .await;
        if self.session.json {
            return Ok(serde_json::to_string_pretty(&previews)?);
        }
        let lines: Vec<String> = previews
            .iter()
            .enumerate()
            .map(|(i, preview)| match &preview.result {
                PreviewResult::Ready { message } => format!(
                    "[{}] À : {}\nObjet : {}\n{}",
                    i + 1,
                    message.to,
                    message.subject,
                    message.body
                ),
                PreviewResult::Failed { error } => format!("[{}] échec : {error}", i + 1),
            })
            .collect();
        if lines.is_empty() {
            return Ok("Le dernier résultat ne contient aucun contact.".to_string());
        }
        Ok(lines.join("\n\n"))
    }
}
