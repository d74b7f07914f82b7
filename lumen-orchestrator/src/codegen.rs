//! Transformation and visualization script synthesis
//!
//! Asks the completion service for a script in the sandbox language. With a
//! dataset the script works on `df`; with documents only, the answer is
//! confined to the retrieved text and written as `#` commentary.

use lumen_core::{ArtifactKind, Dataset, GeneratedArtifact, LlmConfig, Request, SemanticContext};
use lumen_llm::{CompletionClient, CompletionRequest, PromptBuilder};

/// Phrase the model must use when the documents do not hold the answer.
pub const NOT_IN_DOCUMENTS: &str = "Cette information n'est pas disponible dans les documents";

const LANGUAGE_GUIDE: &str = "LANGAGE DU SCRIPT (pas de Python, pas d'import) :
- Commentaires `#`, affectations `nom = expr`, `if cond { ... } else { ... }`, `for x in liste { ... }`.
- Opérateurs `+ - * / %`, comparaisons, `and`, `or`, `not`, listes `[a, b]`, indexation `valeur[i]` et `table[\"colonne\"]`.
- `df` est la table de données (lecture seule). Opérations de table :
  fillna(valeur, column=), dropna(column=), count_by(col), sum_by(col, valeurs), mean_by(col, valeurs),
  sort_by(col, ascending=), head(n), select(cols), filter_eq(col, valeur), column(col), columns, is_empty(), len().
- `plt` est la figure. Opérations : figure(width=, height=), bar(x, y) ou bar(table), barh, line, scatter,
  pie(valeurs, labels=), title, xlabel, ylabel, text(message) ou text(x, y, message), legend().
- Fonctions : len, sum, mean, min, max, round, str, range.

Exemple :
counts = df.fillna(\"Non renseigné\").count_by(\"Secteur d'activité\")
plt.figure(width=12, height=6)
plt.bar(counts[\"Secteur d'activité\"], counts[\"count\"])
plt.title(\"Nombre de contacts par secteur\")";

const DATASET_RULES: &str = "CONSIGNES :
- Gère les valeurs manquantes avec fillna ou dropna.
- Vérifie que les données ne sont pas vides avec df.is_empty() et affiche un message avec plt.text sinon.
- Utilise une couleur différente par catégorie.
- Ajoute un titre, des libellés d'axes et une légende si utile.
- Choisis le type de graphique le plus adapté à la demande.";

const DATASET_OUTPUT: &str = "Ne retourne que le script, sans explication ni balises.";

const DOCUMENT_SYSTEM: &str = "Tu es un assistant RAG. Tu réponds UNIQUEMENT à partir des documents fournis, sans utiliser de connaissances externes.";

const DOCUMENT_RULES: &str = "CONSIGNES STRICTES :
- Réponds UNIQUEMENT avec les informations présentes dans les documents ci-dessus.
- Si la réponse n'y figure pas, écris exactement : \"Cette information n'est pas disponible dans les documents\".
- Écris la réponse sous forme de lignes de commentaire `#`, en commençant par `# === RÉPONSE BASÉE SUR LES DOCUMENTS ===`.";

const DOCUMENT_OUTPUT: &str = "Ne retourne que les lignes de commentaire, sans balises.";

/// Canned answer used when retrieval produced nothing to ground on.
pub fn refusal_text(request_text: &str) -> String {
    format!(
        "# Je n'ai pas trouvé d'informations sur '{request_text}' dans les documents uploadés.\n\
         # Veuillez vérifier que les documents pertinents ont été ajoutés à la base documentaire."
    )
}

/// Commentary carrying a completion failure.
pub fn error_commentary(message: &str) -> String {
    format!("# Erreur lors de la génération : {message}")
}

/// Output of one synthesis attempt. `failure` is set when the completion
/// call failed; the artifact then holds the error as commentary.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeSynthesis {
    pub artifact: GeneratedArtifact,
    pub failure: Option<String>,
}

impl CodeSynthesis {
    fn ok(artifact: GeneratedArtifact) -> Self {
        Self {
            artifact,
            failure: None,
        }
    }

    /// True when the artifact is a script worth running.
    pub fn is_runnable(&self) -> bool {
        self.failure.is_none() && self.artifact.kind == ArtifactKind::Transformation
    }
}

/// Which prompt a synthesis call uses.
#[derive(Debug, Clone, Copy)]
enum Mode<'a> {
    Dataset(&'a Dataset, Option<&'a SemanticContext>),
    Documents(&'a SemanticContext),
}

fn select_mode<'a>(
    dataset: Option<&'a Dataset>,
    context: Option<&'a SemanticContext>,
) -> Option<Mode<'a>> {
    match (dataset, context) {
        (Some(ds), ctx) if !ds.is_empty() => Some(Mode::Dataset(ds, ctx)),
        (_, Some(ctx)) => Some(Mode::Documents(ctx)),
        (Some(ds), None) => Some(Mode::Dataset(ds, None)),
        (None, None) => None,
    }
}

/// Builds transformation scripts from a dataset and/or semantic context.
#[derive(Debug, Clone)]
pub struct TransformationSynthesizer {
    client: CompletionClient,
    config: LlmConfig,
}

impl TransformationSynthesizer {
    pub fn new(client: CompletionClient, config: LlmConfig) -> Self {
        Self { client, config }
    }

    pub fn dataset_prompt(
        &self,
        request: &Request,
        dataset: &Dataset,
        context: Option<&SemanticContext>,
    ) -> String {
        let mut builder = PromptBuilder::new()
            .instructions("Tu es un expert en visualisation de données. Écris un script qui répond à la demande à partir de la table `df`.")
            .instructions(LANGUAGE_GUIDE)
            .data(dataset, self.config.preview_rows);
        if let Some(context) = context.filter(|c| !c.is_sentinel()) {
            builder = builder.documents(context);
        }
        builder
            .instructions(DATASET_RULES)
            .request(request.text.clone())
            .output(DATASET_OUTPUT)
            .build()
    }

    pub fn document_prompt(&self, request: &Request, context: &SemanticContext) -> String {
        PromptBuilder::new()
            .instructions(LANGUAGE_GUIDE)
            .documents(context)
            .request(request.text.clone())
            .instructions(DOCUMENT_RULES)
            .output(DOCUMENT_OUTPUT)
            .build()
    }

    /// `None` when there is neither a dataset nor a semantic context.
    ///
    /// A non-empty dataset takes priority over documents. A `NoDocuments` or
    /// `Unavailable` context alone yields a refusal without any completion
    /// call.
    pub async fn synthesize(
        &self,
        request: &Request,
        dataset: Option<&Dataset>,
        context: Option<&SemanticContext>,
    ) -> Option<CodeSynthesis> {
        let (prompt, system) = match select_mode(dataset, context)? {
            Mode::Dataset(ds, ctx) => (self.dataset_prompt(request, ds, ctx), None),
            Mode::Documents(ctx) if ctx.is_sentinel() => {
                tracing::info!("No usable documents, answering with a refusal");
                return Some(CodeSynthesis::ok(GeneratedArtifact::refusal(refusal_text(
                    &request.text,
                ))));
            }
            Mode::Documents(ctx) => (self.document_prompt(request, ctx), Some(DOCUMENT_SYSTEM)),
        };

        let mut completion = CompletionRequest::prompt(prompt.clone(), self.config.codegen_temperature)
            .with_max_tokens(self.config.codegen_max_tokens);
        if let Some(system) = system {
            completion = completion.with_system(system);
        }

        Some(match self.client.complete(&completion).await {
            Ok(code) => CodeSynthesis::ok(GeneratedArtifact::new(
                ArtifactKind::Transformation,
                code,
                prompt,
            )),
            Err(e) => {
                tracing::warn!(error = %e, "Script synthesis failed");
                let message = e.to_string();
                CodeSynthesis {
                    artifact: GeneratedArtifact::new(
                        ArtifactKind::Transformation,
                        error_commentary(&message),
                        prompt,
                    ),
                    failure: Some(message),
                }
            }
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
