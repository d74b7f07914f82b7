//! Natural-language request to SQL statement text

use crate::schema;
use lumen_core::{ArtifactKind, GeneratedArtifact, LlmConfig, LumenResult, Request};
use lumen_llm::{CompletionClient, CompletionRequest, PromptBuilder};

const SQL_INSTRUCTIONS: &str = "Tu es un assistant SQL pour une base SQLite contenant deux tables :";

const SQL_RULES: &str = "COMPORTEMENTS ATTENDUS :

1. Si l'utilisateur veut ajouter un contact ou une société, utilise `INSERT INTO`.
2. Si l'utilisateur donne une nouvelle info sur un contact existant, utilise `UPDATE contacts SET ... WHERE ...`.
   - Identifie le contact avec `Prénom`, `Nom` et `Société` via `LOWER(...)`.
   - Mets à jour uniquement la colonne concernée (ex : `Téléphone`).
3. Si c'est une recherche ou un affichage, utilise `SELECT`.
4. Au maximum 3 requêtes, séparées par `;`.
5. Mets entre guillemets doubles les noms de colonnes contenant un espace ou une apostrophe (ex : \"Secteur d'activité\").
6. Double les apostrophes dans les valeurs texte (ex : l'air devient 'l''air').
7. Compare les textes sans tenir compte de la casse avec `LOWER(...)`.";

const SQL_OUTPUT: &str = "Ne retourne que la requête SQL. Pas d'explication.";

/// Turns a request (and recent history) into raw statement text.
///
/// The output is not validated; the executor reports whatever the store
/// rejects.
#[derive(Debug, Clone)]
pub struct StructuredQuerySynthesizer {
    client: CompletionClient,
    config: LlmConfig,
}

impl StructuredQuerySynthesizer {
    pub fn new(client: CompletionClient, config: LlmConfig) -> Self {
        Self { client, config }
    }

    pub fn build_prompt(&self, request: &Request) -> String {
        PromptBuilder::new()
            .instructions(format!("{SQL_INSTRUCTIONS}\n\n{}", schema::describe()))
            .instructions(SQL_RULES)
            .history(&request.history, self.config.history_turns_in_prompt)
            .request(format!("\"\"\"{}\"\"\"", request.text))
            .output(SQL_OUTPUT)
            .build()
    }

    /// One completion call at the configured SQL temperature.
    pub async fn synthesize(&self, request: &Request) -> LumenResult<GeneratedArtifact> {
        let prompt = self.build_prompt(request);
        let completion = CompletionRequest::prompt(prompt.clone(), self.config.sql_temperature)
            .with_max_tokens(self.config.sql_max_tokens);
        let raw = self.client.complete(&completion).await?;
        let sql = strip_sql_prefix(&raw);
        tracing::debug!(sql = %sql, "Synthesized statements");
        Ok(GeneratedArtifact::new(ArtifactKind::Sql, sql, prompt))
    }
}

/// Drop a leading bare `sql` token some models emit before the statement.
pub fn strip_sql_prefix(text: &str) -> String {
    let trimmed = text.trim();
    match (trimmed.get(..3), trimmed.get(3..)) {
        (Some(head), Some(rest))
            if head.eq_ignore_ascii_case("sql") && rest.starts_with(char::is_whitespace) =>
        {
            rest.trim().to_string()
        }
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sql_prefix() {
        assert_eq!(strip_sql_prefix("sql SELECT 1"), "SELECT 1");
        assert_eq!(strip_sql_prefix("SQL\nSELECT 1"), "SELECT 1");
        assert_eq!(strip_sql_prefix("SELECT 1"), "SELECT 1");
        assert_eq!(strip_sql_prefix("sqlite_master"), "sqlite_master");
        assert_eq!(strip_sql_prefix("sq"), "sq");
    }
}
