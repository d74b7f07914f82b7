//! Plain-text and JSON rendering of outcomes.

use crate::error::CliResult;
use lumen_core::{
    ConversationTurn, ExecutionOutcome, RenderedImage, StatementOutput, StatementResult,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Human-readable report of one cycle. `image_path` is where the figure was
/// written, if anywhere.
pub fn format_outcome(
    outcome: &ExecutionOutcome,
    preview_rows: usize,
    image_path: Option<&Path>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Routage : {} ({:?})",
        outcome.routing.decision, outcome.routing.basis
    );

    if let Some(sql) = &outcome.sql {
        let _ = writeln!(out, "\nSQL :\n{}", sql.text);
    }
    for result in &outcome.statements {
        let _ = writeln!(out, "{}", format_statement(result));
    }
    if let Some(dataset) = &outcome.dataset {
        let _ = writeln!(out, "\nDonnées ({} ligne(s)) :", dataset.len());
        let _ = writeln!(out, "{}", dataset.preview(preview_rows));
    }
    if let Some(context) = &outcome.semantic_context {
        let _ = writeln!(out, "\nDocuments : {}", crate::session::context_summary(context));
    }
    if let Some(code) = &outcome.code {
        let _ = writeln!(out, "\nCode ({:?}) :\n{}", code.kind, code.text);
    }
    if let Some(path) = image_path {
        let _ = writeln!(out, "\nFigure : {}", path.display());
    }
    if let Some(error) = &outcome.error {
        let _ = writeln!(out, "\nErreur : {error}");
    }
    out
}

pub fn format_statement(result: &StatementResult) -> String {
    let status = match (&result.error, &result.output) {
        (Some(error), _) => format!("échec : {error}"),
        (None, Some(StatementOutput::Rows(dataset))) => format!("{} ligne(s)", dataset.len()),
        (None, Some(StatementOutput::Mutation(ack))) => {
            format!("{} ligne(s) modifiée(s)", ack.rows_affected)
        }
        (None, None) => "ok".to_string(),
    };
    format!("  [{}] {} -> {}", result.index + 1, result.statement, status)
}

pub fn format_history(history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return "(historique vide)".to_string();
    }
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_json(outcome: &ExecutionOutcome) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(outcome)?)
}

/// Write the figure as `<dir>/<cycle id>.svg`.
pub fn write_image(dir: &Path, outcome: &ExecutionOutcome) -> CliResult<Option<PathBuf>> {
    let Some(image) = &outcome.image else {
        return Ok(None);
    };
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", outcome.cycle_id, extension(image)));
    std::fs::write(&path, &image.bytes)?;
    tracing::debug!(path = %path.display(), bytes = image.bytes.len(), "Figure written");
    Ok(Some(path))
}

fn extension(image: &RenderedImage) -> &'static str {
    match image.mime_type.as_str() {
        "image/svg+xml" => "svg",
        "image/png" => "png",
        _ => "bin",
    }
}
