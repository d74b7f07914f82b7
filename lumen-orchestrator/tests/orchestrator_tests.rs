//! Orchestration Cycle Tests
//!
//! **Routing**: a follow-up on structured data never costs a classification
//! call; unrecognized or unavailable classification falls back to the
//! structured path.
//!
//! **Outcome**: every request yields exactly one outcome, whatever the
//! collaborators do.

use lumen_core::{
    ArtifactKind, LlmError, OutcomeError, Request, RoutingBasis, RoutingDecision,
    SandboxFailureKind, SemanticContext,
};
use lumen_orchestrator::{Collaborators, Orchestrator};
use lumen_sandbox::NO_DATA_MESSAGE;
use lumen_sql::SqliteStore;
use lumen_test_utils::fixtures::{contacts_dataset, follow_up_request, test_config};
use lumen_test_utils::generators::arb_unrecognized_label;
use lumen_test_utils::{
    FixedDistanceVectorStore, RecordingRelationalStore, ScriptedCompletionProvider,
    UnavailableCompletionProvider, UnavailableRelationalStore, UnavailableVectorStore,
};
use proptest::prelude::*;
use std::sync::Arc;

const SECTOR_SCRIPT: &str = r#"counts = df.fillna("Non renseigné").count_by("Secteur d'activité")
plt.pie(counts["count"], labels=counts["Secteur d'activité"])
plt.title("Répartition par secteur")"#;

fn orchestrator(collaborators: Collaborators) -> Orchestrator {
    Orchestrator::new(&test_config(), collaborators).expect("orchestrator")
}

fn with_contacts(provider: Arc<ScriptedCompletionProvider>) -> Orchestrator {
    orchestrator(Collaborators {
        completion: provider,
        relational: Arc::new(RecordingRelationalStore::new(contacts_dataset())),
        vector: Arc::new(FixedDistanceVectorStore::default()),
    })
}

fn svg(outcome: &lumen_core::ExecutionOutcome) -> String {
    let image = outcome.image.as_ref().expect("image");
    String::from_utf8(image.bytes.clone()).expect("utf-8 svg")
}

// ============================================================================
// ROUTING
// ============================================================================

#[tokio::test]
async fn test_follow_up_skips_classification() {
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "SELECT * FROM contacts",
        SECTOR_SCRIPT,
    ]));
    let outcome = with_contacts(provider.clone())
        .handle(follow_up_request("montre-les en camembert"))
        .await;

    assert_eq!(outcome.routing.decision, RoutingDecision::Structured);
    assert_eq!(outcome.routing.basis, RoutingBasis::ContextOverride);
    assert_eq!(provider.calls(), 2);
    assert!(provider.prompts()[0].contains("Tu es un assistant SQL"));
    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert!(svg(&outcome).contains("Industrie (66.7 %)"));
}

#[tokio::test]
async fn test_unrecognized_label_fails_closed() {
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "Je pense que les deux",
        "SELECT * FROM contacts",
        SECTOR_SCRIPT,
    ]));
    let outcome = with_contacts(provider)
        .handle(Request::new("qui travaille dans la finance ?"))
        .await;

    assert_eq!(outcome.routing.decision, RoutingDecision::Structured);
    assert_eq!(
        outcome.routing.basis,
        RoutingBasis::FailClosedUnrecognized {
            raw: "Je pense que les deux".to_string()
        }
    );
    assert_eq!(outcome.dataset, Some(contacts_dataset()));
    assert!(outcome.semantic_context.is_none());
}

// ============================================================================
// FAILURE HANDLING
// ============================================================================

#[tokio::test]
async fn test_everything_unreachable_reports_no_data_source() {
    let provider = Arc::new(UnavailableCompletionProvider::new());
    let outcome = orchestrator(Collaborators {
        completion: provider.clone(),
        relational: Arc::new(UnavailableRelationalStore),
        vector: Arc::new(UnavailableVectorStore),
    })
    .handle(Request::new("combien de contacts ?"))
    .await;

    assert!(matches!(
        outcome.routing.basis,
        RoutingBasis::FailClosedUnavailable { .. }
    ));
    assert_eq!(outcome.error, Some(OutcomeError::NoDataSource));
    assert_eq!(
        outcome.error.as_ref().map(ToString::to_string).as_deref(),
        Some("cannot determine data source")
    );
    assert_eq!(provider.calls(), 2);
    assert!(outcome.code.is_none());
}

#[tokio::test]
async fn test_reachable_vector_store_is_not_no_data_source() {
    let outcome = orchestrator(Collaborators {
        completion: Arc::new(UnavailableCompletionProvider::new()),
        relational: Arc::new(UnavailableRelationalStore),
        vector: Arc::new(FixedDistanceVectorStore::default()),
    })
    .handle(Request::new("combien de contacts ?"))
    .await;

    match outcome.error {
        Some(OutcomeError::SynthesisFailed { stage, .. }) => assert_eq!(stage, "sql"),
        other => panic!("expected sql synthesis failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reachable_relational_store_is_not_no_data_source() {
    let relational = Arc::new(RecordingRelationalStore::new(contacts_dataset()));
    let outcome = orchestrator(Collaborators {
        completion: Arc::new(UnavailableCompletionProvider::new()),
        relational: relational.clone(),
        vector: Arc::new(UnavailableVectorStore),
    })
    .handle(Request::new("combien de contacts ?"))
    .await;

    match outcome.error {
        Some(OutcomeError::SynthesisFailed { stage, .. }) => assert_eq!(stage, "sql"),
        other => panic!("expected sql synthesis failure, got {other:?}"),
    }
    assert!(relational.statements().is_empty());
}

#[tokio::test]
async fn test_transformation_synthesis_failure_is_reported() {
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "SQL",
        "SELECT * FROM contacts",
    ]));
    provider.push_error(
        LlmError::RequestFailed {
            provider: "scripted".to_string(),
            status: 503,
            message: "overloaded".to_string(),
        }
        .into(),
    );
    let outcome = with_contacts(provider.clone())
        .handle(Request::new("contacts par secteur"))
        .await;

    assert_eq!(outcome.dataset, Some(contacts_dataset()));
    match &outcome.error {
        Some(OutcomeError::SynthesisFailed { stage, message }) => {
            assert_eq!(stage, "transformation");
            assert!(message.contains("overloaded"));
        }
        other => panic!("expected transformation synthesis failure, got {other:?}"),
    }
    let code = outcome.code.as_ref().expect("commentary");
    assert!(code.text.starts_with("# Erreur lors de la génération : "));
    assert!(outcome.image.is_none());
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_sandbox_failure_is_reported() {
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "SQL",
        "SELECT * FROM contacts",
        "total = len(df)\nratio = total / 0",
    ]));
    let outcome = with_contacts(provider)
        .handle(Request::new("ratio des contacts"))
        .await;

    assert!(outcome.image.is_none());
    match outcome.error {
        Some(OutcomeError::SandboxFailed(failure)) => {
            assert_eq!(failure.kind, SandboxFailureKind::Runtime);
            assert_eq!(failure.line, Some(2));
        }
        other => panic!("expected sandbox failure, got {other:?}"),
    }
    assert_eq!(
        outcome.code.map(|c| c.kind),
        Some(ArtifactKind::Transformation)
    );
}

// ============================================================================
// SEMANTIC AND HYBRID PATHS
// ============================================================================

#[tokio::test]
async fn test_no_documents_refuses_without_synthesis_call() {
    let provider = Arc::new(ScriptedCompletionProvider::replying(["VECTOR"]));
    let outcome = with_contacts(provider.clone())
        .handle(Request::new("que dit le rapport annuel ?"))
        .await;

    assert_eq!(outcome.routing.decision, RoutingDecision::Semantic);
    assert_eq!(outcome.semantic_context, Some(SemanticContext::NoDocuments));
    let code = outcome.code.expect("refusal");
    assert_eq!(code.kind, ArtifactKind::Refusal);
    assert!(code.text.contains("'que dit le rapport annuel ?'"));
    assert_eq!(provider.calls(), 1);
    assert!(outcome.image.is_none());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_document_answer_is_not_run_as_a_script() {
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "VECTOR",
        "Cette information n'est pas disponible dans les documents.",
    ]));
    let outcome = orchestrator(Collaborators {
        completion: provider.clone(),
        relational: Arc::new(RecordingRelationalStore::new(contacts_dataset())),
        vector: Arc::new(FixedDistanceVectorStore::with_distances(&[(
            "Rapport : le chiffre d'affaires 2023 atteint 4 M€.",
            0.3,
        )])),
    })
    .handle(Request::new("quel est le budget marketing ?"))
    .await;

    assert_eq!(outcome.routing.decision, RoutingDecision::Semantic);
    assert!(matches!(
        outcome.semantic_context,
        Some(SemanticContext::Relevant(_))
    ));
    assert!(outcome.dataset.is_none());
    let code = outcome.code.as_ref().expect("answer");
    assert_eq!(code.kind, ArtifactKind::Transformation);
    assert!(code.text.contains("pas disponible"));
    assert!(outcome.image.is_none());
    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert!(outcome.is_success());
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_both_paths_render_from_dataset() {
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "BOTH",
        "SELECT * FROM contacts",
        SECTOR_SCRIPT,
    ]));
    let outcome = orchestrator(Collaborators {
        completion: provider.clone(),
        relational: Arc::new(RecordingRelationalStore::new(contacts_dataset())),
        vector: Arc::new(FixedDistanceVectorStore::with_distances(&[(
            "Rapport : l'industrie reste le premier secteur client.",
            0.4,
        )])),
    })
    .handle(Request::new("secteurs des contacts et analyse du rapport"))
    .await;

    assert_eq!(outcome.routing.decision, RoutingDecision::Both);
    assert!(matches!(
        outcome.semantic_context,
        Some(SemanticContext::Relevant(_))
    ));
    assert_eq!(outcome.dataset, Some(contacts_dataset()));
    let code = outcome.code.as_ref().expect("code");
    assert!(code.prompt.contains("premier secteur client"));
    assert!(code.prompt.contains("Secteur d'activité"));
    assert!(svg(&outcome).contains("Répartition par secteur"));
}

// ============================================================================
// END TO END
// ============================================================================

#[tokio::test]
async fn test_empty_contacts_table_renders_no_data_figure() {
    let store = SqliteStore::in_memory().expect("in-memory store");
    store.bootstrap_schema().expect("bootstrap schema");
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "SQL",
        "```sql\nSELECT \"Secteur d'activité\", COUNT(*) AS total FROM contacts GROUP BY \"Secteur d'activité\"\n```",
        SECTOR_SCRIPT,
    ]));
    let outcome = orchestrator(Collaborators {
        completion: provider,
        relational: Arc::new(store),
        vector: Arc::new(FixedDistanceVectorStore::default()),
    })
    .handle(Request::new("montre les contacts par secteur"))
    .await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.statements.len(), 1);
    let dataset = outcome.dataset.as_ref().expect("dataset");
    assert!(dataset.is_empty());
    assert_eq!(dataset.columns, vec!["Secteur d'activité", "total"]);
    assert!(svg(&outcome).contains(NO_DATA_MESSAGE));
    assert!(outcome.finished_at >= outcome.started_at);
}

#[tokio::test]
async fn test_mutation_then_select_in_one_batch() {
    let store = SqliteStore::in_memory().expect("in-memory store");
    store.bootstrap_schema().expect("bootstrap schema");
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "SQL",
        "INSERT INTO companies (\"Société\") VALUES ('Acme'); SELECT * FROM companies WHERE LOWER(\"Société\") = 'acme'",
        "plt.bar(df.count_by(\"Société\"))",
    ]));
    let outcome = orchestrator(Collaborators {
        completion: provider,
        relational: Arc::new(store),
        vector: Arc::new(FixedDistanceVectorStore::default()),
    })
    .handle(Request::new("ajoute la société Acme puis montre-la"))
    .await;

    assert_eq!(outcome.statements.len(), 2);
    assert!(outcome.statements.iter().all(|s| s.is_success()));
    assert_eq!(outcome.dataset.as_ref().map(|d| d.rows.len()), Some(1));
    assert!(outcome.image.is_some());
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever the classifier says, exactly one outcome comes back and an
    /// unrecognized answer always lands on the structured path.
    #[test]
    fn prop_any_label_yields_one_outcome(label in "[A-Za-z ]{0,12}") {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let provider = Arc::new(ScriptedCompletionProvider::replying([label.clone()]));
        let outcome = runtime.block_on(with_contacts(provider).handle(Request::new("question")));

        match RoutingDecision::from_label(&label) {
            Some(decision) => prop_assert_eq!(outcome.routing.decision, decision),
            None => {
                prop_assert_eq!(outcome.routing.decision, RoutingDecision::Structured);
                prop_assert!(outcome.routing.basis.is_fail_closed());
            }
        }
    }

    #[test]
    fn prop_unrecognized_label_fails_closed(label in arb_unrecognized_label()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let provider = Arc::new(ScriptedCompletionProvider::replying([label.clone()]));
        let outcome = runtime.block_on(with_contacts(provider).handle(Request::new("question")));

        prop_assert_eq!(outcome.routing.decision, RoutingDecision::Structured);
        let is_unrecognized = matches!(
            outcome.routing.basis,
            RoutingBasis::FailClosedUnrecognized { .. }
        );
        prop_assert!(is_unrecognized);
    }
}
