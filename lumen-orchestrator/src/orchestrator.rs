//! The orchestration cycle
//!
//! Router, then the structured and/or semantic path, then script synthesis,
//! then the sandbox. Every stage reports failure as data; `handle` always
//! returns an [`ExecutionOutcome`].

use crate::codegen::{CodeSynthesis, TransformationSynthesizer};
use crate::router::Router;
use chrono::Utc;
use lumen_core::{
    last_retrieved_dataset, new_cycle_id, CycleId, Dataset, ExecutionOutcome, GeneratedArtifact,
    LumenConfig, LumenError, LumenResult, OutcomeError, RenderedImage, Request, Routing,
    RoutingBasis, SandboxFailure, SandboxFailureKind, StatementResult,
};
use lumen_llm::{CompletionClient, CompletionProvider};
use lumen_sandbox::Sandbox;
use lumen_sql::{RelationalStore, StructuredQueryExecutor, StructuredQuerySynthesizer};
use lumen_vector::{SemanticRetriever, VectorStore};
use std::sync::Arc;
use tracing::Instrument;

/// Collaborator handles injected into an [`Orchestrator`].
#[derive(Clone)]
pub struct Collaborators {
    pub completion: Arc<dyn CompletionProvider>,
    pub relational: Arc<dyn RelationalStore>,
    pub vector: Arc<dyn VectorStore>,
}

/// What the structured path produced.
#[derive(Debug, Default)]
struct StructuredPath {
    sql: Option<GeneratedArtifact>,
    statements: Vec<StatementResult>,
    failure: Option<LumenError>,
}

/// Runs one request end to end.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    router: Router,
    sql: StructuredQuerySynthesizer,
    executor: StructuredQueryExecutor,
    retriever: SemanticRetriever,
    codegen: TransformationSynthesizer,
    sandbox: Sandbox,
}

impl Orchestrator {
    pub fn new(config: &LumenConfig, collaborators: Collaborators) -> LumenResult<Self> {
        config.validate()?;
        let client = CompletionClient::new(collaborators.completion, config.timeouts.completion());
        Ok(Self {
            router: Router::new(client.clone(), &config.router, &config.llm)?,
            sql: StructuredQuerySynthesizer::new(client.clone(), config.llm.clone()),
            executor: StructuredQueryExecutor::new(
                collaborators.relational,
                config.statements.max_statements,
                config.timeouts.store(),
            ),
            retriever: SemanticRetriever::new(
                collaborators.vector,
                &config.retrieval,
                config.timeouts.store(),
            ),
            codegen: TransformationSynthesizer::new(client, config.llm.clone()),
            sandbox: Sandbox::new(config.sandbox.clone()),
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Exactly one outcome per request; never panics on collaborator failure.
    pub async fn handle(&self, request: Request) -> ExecutionOutcome {
        let cycle_id = new_cycle_id();
        let span = tracing::info_span!("cycle", cycle_id = %cycle_id);
        self.run_cycle(cycle_id, request).instrument(span).await
    }

    async fn run_cycle(&self, cycle_id: CycleId, request: Request) -> ExecutionOutcome {
        let started_at = Utc::now();
        let routing = self.router.route(&request).await;
        tracing::info!(
            decision = %routing.decision,
            basis = ?routing.basis,
            "Request routed"
        );

        let structured = async {
            if routing.decision.uses_structured() {
                self.structured_path(&request).await
            } else {
                StructuredPath::default()
            }
        };
        let semantic = async {
            if routing.decision.uses_semantic() {
                Some(self.retriever.retrieve(&request.text).await)
            } else {
                None
            }
        };
        let (structured, semantic_context) = tokio::join!(structured, semantic);

        let mut outcome = ExecutionOutcome {
            cycle_id,
            request,
            routing,
            sql: structured.sql,
            statements: structured.statements,
            dataset: None,
            semantic_context,
            code: None,
            image: None,
            error: None,
            started_at,
            finished_at: started_at,
        };

        if let Some(failure) = structured.failure {
            if self.no_data_source(&outcome.routing, &failure).await {
                tracing::error!(
                    error = %failure,
                    "Completion service, relational store and vector store are all unreachable"
                );
                outcome.error = Some(OutcomeError::NoDataSource);
                return finish(outcome);
            }
            outcome.error = Some(OutcomeError::SynthesisFailed {
                stage: "sql".to_string(),
                message: failure.to_string(),
            });
        }

        outcome.dataset = last_retrieved_dataset(&outcome.statements).cloned();
        let synthesis = self
            .codegen
            .synthesize(
                &outcome.request,
                outcome.dataset.as_ref(),
                outcome.semantic_context.as_ref(),
            )
            .await;

        if let Some(synthesis) = synthesis {
            let (image, error) = self.render(&synthesis, outcome.dataset.as_ref()).await;
            outcome.image = image;
            if outcome.error.is_none() {
                outcome.error = error;
            }
            outcome.code = Some(synthesis.artifact);
        }

        finish(outcome)
    }

    /// Synthesize the statement batch and run it.
    async fn structured_path(&self, request: &Request) -> StructuredPath {
        match self.sql.synthesize(request).await {
            Ok(sql) => {
                let statements = self.executor.execute(&sql.text).await;
                StructuredPath {
                    sql: Some(sql),
                    statements,
                    failure: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Statement synthesis failed");
                StructuredPath {
                    failure: Some(e),
                    ..StructuredPath::default()
                }
            }
        }
    }

    /// True when the classifier and statement synthesis could not reach the
    /// completion service and neither store answers.
    async fn no_data_source(&self, routing: &Routing, failure: &LumenError) -> bool {
        if !matches!(routing.basis, RoutingBasis::FailClosedUnavailable { .. })
            || !failure.is_unavailable()
        {
            return false;
        }
        let (relational, vector) =
            tokio::join!(self.executor.is_reachable(), self.retriever.is_reachable());
        !relational && !vector
    }

    /// An empty dataset gets the canned figure and a non-empty one runs the
    /// script. Without a dataset nothing reaches the sandbox.
    async fn render(
        &self,
        synthesis: &CodeSynthesis,
        dataset: Option<&Dataset>,
    ) -> (Option<RenderedImage>, Option<OutcomeError>) {
        if let Some(message) = &synthesis.failure {
            let error = OutcomeError::SynthesisFailed {
                stage: "transformation".to_string(),
                message: message.clone(),
            };
            let image = dataset
                .filter(|ds| ds.is_empty())
                .map(|_| self.sandbox.no_data_figure());
            return (image, Some(error));
        }

        match dataset {
            Some(ds) if ds.is_empty() => (Some(self.sandbox.no_data_figure()), None),
            Some(ds) if synthesis.is_runnable() => {
                self.run_sandboxed(&synthesis.artifact.text, ds.clone()).await
            }
            _ => (None, None),
        }
    }

    async fn run_sandboxed(
        &self,
        code: &str,
        dataset: Dataset,
    ) -> (Option<RenderedImage>, Option<OutcomeError>) {
        let sandbox = self.sandbox.clone();
        let code = code.to_string();
        let span = tracing::Span::current();
        let joined =
            tokio::task::spawn_blocking(move || span.in_scope(|| sandbox.run(&code, &dataset)))
                .await;
        match joined {
            Ok(run) => {
                for line in &run.output {
                    tracing::debug!(output = %line, "Script output");
                }
                let (image, failure) = run.into_parts();
                (image, failure.map(OutcomeError::SandboxFailed))
            }
            Err(e) => {
                tracing::error!(error = %e, "Sandbox task did not complete");
                let failure = SandboxFailure {
                    kind: SandboxFailureKind::Runtime,
                    message: format!("sandbox task failed: {e}"),
                    line: None,
                };
                (None, Some(OutcomeError::SandboxFailed(failure)))
            }
        }
    }
}

fn finish(mut outcome: ExecutionOutcome) -> ExecutionOutcome {
    outcome.finished_at = Utc::now();
    let elapsed_ms = (outcome.finished_at - outcome.started_at).num_milliseconds();
    tracing::info!(
        elapsed_ms,
        statements = outcome.statements.len(),
        failed_statements = outcome.failed_statements().count(),
        has_dataset = outcome.dataset.is_some(),
        has_image = outcome.image.is_some(),
        success = outcome.is_success(),
        "Cycle finished"
    );
    outcome
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("completion", &self.completion.provider_id())
            .finish_non_exhaustive()
    }
}
