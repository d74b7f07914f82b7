//! CLI Tests
//!
//! **Config**: a TOML file with the documented sections parses, defaults the
//! core section, and rejects unusable values.
//!
//! **REPL**: every command produces a reply and the history stays bounded.

use lumen_cli::config::{CliConfig, LogFormat, OutputConfig, ProviderKind};
use lumen_cli::session::Command;
use lumen_cli::{App, Reply};
use lumen_core::LumenConfig;
use lumen_orchestrator::Collaborators;
use lumen_test_utils::fixtures::{contacts_dataset, test_config};
use lumen_test_utils::{
    FixedDistanceVectorStore, RecordingRelationalStore, ScriptedCompletionProvider,
};
use proptest::prelude::*;
use std::sync::Arc;

const CONFIG: &str = r#"
[lumen.router]
history_window = 4

[providers.completion]
kind = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"

[providers.embedding]
kind = "ollama"
model = "nomic-embed-text"
dimensions = 768

[storage]
relational_path = "data/lumen.db"
vector_path = "data/documents.db"

[output]
image_dir = "out"

[logging]
format = "json"
"#;

fn output(dir: &std::path::Path) -> OutputConfig {
    OutputConfig {
        image_dir: dir.to_path_buf(),
        preview_rows: 5,
        history_turns: 4,
        json: false,
    }
}

fn app(provider: Arc<ScriptedCompletionProvider>, dir: &std::path::Path) -> App {
    let collaborators = Collaborators {
        completion: provider,
        relational: Arc::new(RecordingRelationalStore::new(contacts_dataset())),
        vector: Arc::new(FixedDistanceVectorStore::default()),
    };
    App::new(&test_config(), output(dir), collaborators).expect("app")
}

fn text(reply: Reply) -> String {
    match reply {
        Reply::Text(text) => text,
        Reply::Quit => panic!("unexpected quit"),
    }
}

// ============================================================================
// CONFIG
// ============================================================================

#[test]
fn test_config_parses_sections() {
    let config = CliConfig::from_toml(CONFIG).expect("config");
    assert_eq!(config.lumen.router.history_window, 4);
    assert_eq!(config.lumen.retrieval, LumenConfig::default().retrieval);
    assert_eq!(config.providers.completion.kind, ProviderKind::OpenAi);
    assert_eq!(config.providers.embedding.kind, ProviderKind::Ollama);
    assert_eq!(config.providers.embedding.cache_entries, 1024);
    assert_eq!(config.output.preview_rows, 10);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_rejects_unknown_fields() {
    let broken = CONFIG.replace("[output]", "[output]\ncolour = true");
    assert!(CliConfig::from_toml(&broken).is_err());
}

#[test]
fn test_openai_requires_key_variable() {
    let broken = CONFIG.replace("api_key_env = \"OPENAI_API_KEY\"\n", "");
    let config = CliConfig::from_toml(&broken).expect("config");
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_core_value_is_rejected() {
    let broken = CONFIG.replace("history_window = 4", "history_window = 0");
    let config = CliConfig::from_toml(&broken).expect("config");
    assert!(config.validate().is_err());
}

#[test]
fn test_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("lumen.toml");
    std::fs::write(&path, CONFIG).expect("write config");
    let config = CliConfig::from_path(&path).expect("config");
    assert_eq!(config.output.image_dir, std::path::PathBuf::from("out"));
}

// ============================================================================
// REPL
// ============================================================================

#[tokio::test]
async fn test_question_writes_figure_and_records_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "SQL",
        "SELECT * FROM contacts",
        "plt.bar(df.count_by(\"Secteur d'activité\"))",
    ]));
    let mut app = app(provider, dir.path());

    let reply = text(app.handle_line("contacts par secteur").await.expect("reply"));
    assert!(reply.contains("Routage : STRUCTURED"));
    assert!(reply.contains("SELECT * FROM contacts"));
    assert!(reply.contains("Données (3 ligne(s))"));
    assert!(reply.contains("Figure : "));

    let figures: Vec<_> = std::fs::read_dir(dir.path()).expect("read dir").collect();
    assert_eq!(figures.len(), 1);
    assert_eq!(app.session().history().len(), 2);
    assert_eq!(app.session().last_dataset(), Some(&contacts_dataset()));
}

#[tokio::test]
async fn test_json_toggle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(ScriptedCompletionProvider::replying(["VECTOR"]));
    let mut app = app(provider, dir.path());

    assert!(text(app.handle_line(":json").await.expect("reply")).contains("activée"));
    let reply = text(app.handle_line("que dit le rapport ?").await.expect("reply"));
    let value: serde_json::Value = serde_json::from_str(&reply).expect("json outcome");
    assert_eq!(value["routing"]["decision"], "SEMANTIC");
    assert_eq!(value["code"]["kind"], "refusal");
}

#[tokio::test]
async fn test_ingest_then_forget() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc = dir.path().join("rapport.txt");
    std::fs::write(&doc, "Le chiffre d'affaires 2023 atteint 4 M€.").expect("write doc");
    let mut app = app(Arc::new(ScriptedCompletionProvider::new()), dir.path());

    let reply = text(
        app.handle_line(&format!(":ingest {}", doc.display()))
            .await
            .expect("reply"),
    );
    assert_eq!(reply, "rapport.txt : 1 extrait(s) ajouté(s)");

    let reply = text(app.handle_line(":forget rapport.txt").await.expect("reply"));
    assert_eq!(reply, "1 extrait(s) supprimé(s) pour rapport.txt");

    let missing = text(
        app.handle_line(":ingest /nonexistent/lumen.txt")
            .await
            .expect("reply"),
    );
    assert!(missing.starts_with("Lecture impossible"));
}

#[tokio::test]
async fn test_preview_needs_a_dataset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(ScriptedCompletionProvider::replying([
        "SQL",
        "SELECT * FROM contacts",
        "",
    ]));
    provider.push_response("Bonjour Alice");
    provider.push_response("Objet pour Alice");
    let mut app = app(provider, dir.path());

    let reply = text(app.handle_line(":preview Bonjour {prénom}").await.expect("reply"));
    assert_eq!(reply, "Aucun résultat de contacts à personnaliser.");

    app.handle_line("liste des contacts").await.expect("reply");
    let reply = text(app.handle_line(":preview Bonjour {prénom}").await.expect("reply"));
    assert!(reply.contains("À : alice@acme.fr"));
    assert!(reply.contains("Bonjour Alice"));
}

#[tokio::test]
async fn test_clear_and_quit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut app = app(Arc::new(ScriptedCompletionProvider::new()), dir.path());
    app.handle_line("bonjour").await.expect("reply");
    assert!(!app.session().history().is_empty());

    assert_eq!(
        text(app.handle_line(":clear").await.expect("reply")),
        "Historique effacé."
    );
    assert!(app.session().history().is_empty());
    assert_eq!(
        text(app.handle_line(":history").await.expect("reply")),
        "(historique vide)"
    );
    assert_eq!(app.handle_line(":quit").await.expect("reply"), Reply::Quit);
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Lines that do not start with ':' are always requests, verbatim up to
    /// surrounding whitespace.
    #[test]
    fn prop_plain_lines_are_requests(line in "[^:\\s][^\n]{0,40}") {
        prop_assert_eq!(Command::parse(&line), Command::Ask(line.trim().to_string()));
    }

    /// The history never exceeds its limit, whatever the number of cycles.
    #[test]
    fn prop_history_is_bounded(cycles in 1usize..8) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = app(Arc::new(ScriptedCompletionProvider::new()), dir.path());
        for i in 0..cycles {
            runtime.block_on(app.handle_line(&format!("question {i}"))).expect("reply");
        }
        prop_assert!(app.session().history().len() <= 4);
        prop_assert_eq!(app.session().history().len(), (cycles * 2).min(4));
    }
}
