//! Tests for campaign personalization and sending
//!
//! **Per-message isolation**: a failing contact is reported and the run
//! continues with the next one.

use lumen_campaign::{CampaignRunner, CampaignTemplate, Personalizer, PreviewResult};
use lumen_core::{Cell, Dataset, LlmConfig};
use lumen_llm::CompletionClient;
use lumen_test_utils::fixtures::contacts_dataset;
use lumen_test_utils::{RecordingMessageSender, ScriptedCompletionProvider};
use std::sync::Arc;
use std::time::Duration;

fn personalizer(provider: Arc<ScriptedCompletionProvider>) -> Personalizer {
    Personalizer::new(
        CompletionClient::new(provider, Duration::from_secs(5)),
        LlmConfig::default(),
    )
}

#[tokio::test]
async fn every_contact_receives_a_personalized_message() {
    let provider = Arc::new(ScriptedCompletionProvider::with_fallback("Bonjour !"));
    let sender = Arc::new(RecordingMessageSender::new());
    let runner = CampaignRunner::new(personalizer(provider.clone()), sender.clone());

    let template = CampaignTemplate::new("Bonjour {prénom}")
        .with_subject("Offre pour {société}")
        .with_sender_name("Équipe commerciale");
    let report = runner.run(&contacts_dataset(), &template).await;

    assert_eq!(report.total, 3);
    assert_eq!(report.success, 3);
    assert_eq!(report.errors, 0);
    // Body and subject per contact.
    assert_eq!(provider.calls(), 6);
    assert!(provider.prompts().iter().any(|p| p.contains("Offre pour {société}")));
    let sent = sender.sent();
    assert!(sent.iter().all(|m| m.sender_name == "Équipe commerciale"));
    let recipients: Vec<_> = sent.into_iter().map(|m| m.to).collect();
    assert_eq!(recipients, vec!["alice@acme.fr", "paul@globex.fr", "chloe@initech.fr"]);
}

#[tokio::test]
async fn personalization_prompt_lists_the_contact() {
    let provider = Arc::new(ScriptedCompletionProvider::with_fallback("ok"));
    let p = personalizer(provider.clone());
    let dataset = contacts_dataset();

    p.personalize("Bonjour {prénom}", &dataset.columns, &dataset.rows[0])
        .await
        .unwrap();

    let prompt = &provider.prompts()[0];
    assert!(prompt.contains("- Prénom: Alice"));
    assert!(prompt.contains("Bonjour {prénom}"));
    let request = &provider.requests()[0];
    assert!((request.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(request.max_tokens, Some(600));
}

#[tokio::test]
async fn failures_are_reported_without_aborting() {
    let provider = Arc::new(ScriptedCompletionProvider::with_fallback("texte"));
    let sender = Arc::new(RecordingMessageSender::rejecting(["paul@globex.fr"]));
    let runner = CampaignRunner::new(personalizer(provider), sender.clone());

    let mut contacts = contacts_dataset();
    contacts.rows.push(vec![
        Cell::from("Sans"),
        Cell::from("Adresse"),
        Cell::Null,
        Cell::from("Retail"),
    ]);

    let report = runner.run(&contacts, &CampaignTemplate::new("Bonjour")).await;

    assert_eq!(report.total, 4);
    assert_eq!(report.success, 2);
    assert_eq!(report.errors, 2);
    assert!(report.error_details[0].starts_with("Erreur pour paul@globex.fr"));
    assert!(report.error_details[1].starts_with("Erreur pour contact"));
    assert_eq!(sender.sent().len(), 2);
}

#[tokio::test]
async fn preview_does_not_send() {
    let provider = Arc::new(ScriptedCompletionProvider::replying(["Corps", "Sujet"]));
    let p = personalizer(provider);

    let previews = p
        .preview(&contacts_dataset(), &CampaignTemplate::new("{prénom}"), 1)
        .await;

    assert_eq!(previews.len(), 1);
    match &previews[0].result {
        PreviewResult::Ready { message } => {
            assert_eq!(message.to, "alice@acme.fr");
            assert_eq!(message.body, "Corps");
            assert_eq!(message.subject, "Sujet");
        }
        other => panic!("expected a ready preview, got {other:?}"),
    }
}

#[tokio::test]
async fn preview_of_row_without_address_fails() {
    let provider = Arc::new(ScriptedCompletionProvider::new());
    let p = personalizer(provider.clone());
    let dataset = Dataset::new(vec!["Nom".to_string()], vec![vec![Cell::from("Durand")]]);

    let previews = p.preview(&dataset, &CampaignTemplate::new("x"), 5).await;

    assert!(matches!(previews[0].result, PreviewResult::Failed { .. }));
    assert_eq!(provider.calls(), 0);
}
