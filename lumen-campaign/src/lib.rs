//! LUMEN Campaign - Personalized Bulk Messaging
//!
//! Fills a subject and body template per contact row through the
//! text-generation service and hands each rendered message to a
//! [`MessageSender`]. Delivery channels are external; this crate only
//! defines the seam.

use async_trait::async_trait;
use lumen_core::{Cell, Dataset, LlmConfig, LumenError};
use lumen_llm::prompt::SectionKind;
use lumen_llm::{CompletionClient, CompletionRequest, PromptBuilder, PromptSection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum CampaignError {
    #[error("No email column detected in this row")]
    NoRecipient,

    #[error("Delivery failed: {reason}")]
    Delivery { reason: String },

    #[error("Personalization failed: {0}")]
    Personalization(#[from] LumenError),
}

pub type CampaignResult<T> = Result<T, CampaignError>;

// ============================================================================
// SENDER SEAM
// ============================================================================

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Display name of the sender.
    pub sender_name: String,
}

/// Delivery channel for campaign messages.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> CampaignResult<()>;
}

// ============================================================================
// TEMPLATES AND REPORTS
// ============================================================================

/// Subject and body templates. `{placeholders}` are matched to row columns
/// by the text-generation service, not literally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignTemplate {
    pub subject: String,
    pub body: String,
    pub sender_name: String,
}

impl CampaignTemplate {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            subject: "Email personnalisé IA".to_string(),
            body: body.into(),
            sender_name: "Assistant IA".to_string(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_sender_name(mut self, sender_name: impl Into<String>) -> Self {
        self.sender_name = sender_name.into();
        self
    }
}

/// Totals and per-message failures of one campaign run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub total: usize,
    pub success: usize,
    pub errors: usize,
    pub error_details: Vec<String>,
}

/// One personalized message that was not sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePreview {
    pub contact: Vec<(String, Cell)>,
    #[serde(flatten)]
    pub result: PreviewResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreviewResult {
    Ready { message: OutgoingMessage },
    Failed { error: String },
}

// ============================================================================
// RUNNER
// ============================================================================

const PERSONALIZE_INSTRUCTIONS: &str = "Tu es un assistant d'automatisation d'emails.";

const PERSONALIZE_RULES: &str = "Instructions :
- Pour chaque variable entre {} dans le template, trouve la colonne qui correspond le mieux (même si les noms ne correspondent pas parfaitement)
- Remplis chaque variable avec la valeur correspondante
- Si tu dois déduire un mapping (exemple : \"prénom\" = \"FirstName\", \"société\" = \"Company\"), fais-le de façon intelligente";

const PERSONALIZE_OUTPUT: &str = "Retourne seulement le texte final sans commentaires ni balises.";

/// Fills templates from contact rows through the text-generation service.
#[derive(Clone)]
pub struct Personalizer {
    client: CompletionClient,
    config: LlmConfig,
}

impl Personalizer {
    pub fn new(client: CompletionClient, config: LlmConfig) -> Self {
        Self { client, config }
    }

    /// Fill `template` from one contact row.
    pub async fn personalize(
        &self,
        template: &str,
        columns: &[String],
        row: &[Cell],
    ) -> CampaignResult<String> {
        let contact = columns
            .iter()
            .zip(row)
            .map(|(column, value)| format!("- {column}: {value}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = PromptBuilder::new()
            .instructions(PERSONALIZE_INSTRUCTIONS)
            .section(
                PromptSection::new(SectionKind::Data, contact)
                    .with_title("Voici les données de contact"),
            )
            .section(
                PromptSection::new(SectionKind::Instructions, template)
                    .with_title("Voici le template email à remplir"),
            )
            .instructions(PERSONALIZE_RULES)
            .output(PERSONALIZE_OUTPUT)
            .build();
        let request = CompletionRequest::prompt(prompt, self.config.personalization_temperature)
            .with_max_tokens(self.config.personalization_max_tokens);
        Ok(self.client.complete(&request).await?)
    }

    /// Recipient, body and subject for one row. The recipient is located
    /// first so rows without an address cost no completion call.
    pub async fn render(
        &self,
        columns: &[String],
        row: &[Cell],
        template: &CampaignTemplate,
    ) -> CampaignResult<OutgoingMessage> {
        let to = find_recipient(columns, row).ok_or(CampaignError::NoRecipient)?;
        let body = self.personalize(&template.body, columns, row).await?;
        let subject = self.personalize(&template.subject, columns, row).await?;
        Ok(OutgoingMessage {
            to,
            subject,
            body,
            sender_name: template.sender_name.clone(),
        })
    }

    /// Personalize the first `count` rows without sending anything.
    pub async fn preview(
        &self,
        contacts: &Dataset,
        template: &CampaignTemplate,
        count: usize,
    ) -> Vec<MessagePreview> {
        let mut previews = Vec::new();
        for row in contacts.rows.iter().take(count) {
            let contact = contacts
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            let result = match self.render(&contacts.columns, row, template).await {
                Ok(message) => PreviewResult::Ready { message },
                Err(e) => PreviewResult::Failed {
                    error: e.to_string(),
                },
            };
            previews.push(MessagePreview { contact, result });
        }
        previews
    }
}

impl std::fmt::Debug for Personalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Personalizer")
            .field("provider", &self.client.provider_id())
            .field("temperature", &self.config.personalization_temperature)
            .finish()
    }
}

/// Personalizes and sends one message per dataset row.
#[derive(Clone)]
pub struct CampaignRunner {
    personalizer: Personalizer,
    sender: Arc<dyn MessageSender>,
}

impl CampaignRunner {
    pub fn new(personalizer: Personalizer, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            personalizer,
            sender,
        }
    }

    pub fn personalizer(&self) -> &Personalizer {
        &self.personalizer
    }

    /// Personalize and send one message per row. A failing row is recorded
    /// and the run continues.
    pub async fn run(&self, contacts: &Dataset, template: &CampaignTemplate) -> CampaignReport {
        let mut report = CampaignReport {
            total: contacts.len(),
            ..CampaignReport::default()
        };
        tracing::info!(
            contacts = contacts.len(),
            columns = ?contacts.columns,
            "Starting campaign"
        );

        for row in &contacts.rows {
            let recipient = find_recipient(&contacts.columns, row);
            let outcome = match self.personalizer.render(&contacts.columns, row, template).await {
                Ok(message) => self.sender.send(&message).await.map(|()| message.to),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(to) => {
                    tracing::info!(to = %to, "Message sent");
                    report.success += 1;
                }
                Err(e) => {
                    let who = recipient.unwrap_or_else(|| "contact".to_string());
                    let detail = format!("Erreur pour {who}: {e}");
                    tracing::warn!(detail = %detail, "Campaign message failed");
                    report.errors += 1;
                    report.error_details.push(detail);
                }
            }
        }

        tracing::info!(
            success = report.success,
            errors = report.errors,
            "Campaign finished"
        );
        report
    }
}

impl std::fmt::Debug for CampaignRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignRunner")
            .field("personalizer", &self.personalizer)
            .finish()
    }
}

/// Destination address of a contact row: the first column whose name
/// contains "mail", else the first value containing `@`.
pub fn find_recipient(columns: &[String], row: &[Cell]) -> Option<String> {
    let by_column = columns
        .iter()
        .zip(row)
        .find(|(column, _)| column.to_lowercase().contains("mail"))
        .map(|(_, value)| value);
    let value = by_column.or_else(|| row.iter().find(|v| v.to_string().contains('@')))?;
    if value.is_null() {
        return None;
    }
    let address = value.to_string().trim().to_string();
    (!address.is_empty()).then_some(address)
}

// ============================================================================
// TESTS
// ============================================================================
