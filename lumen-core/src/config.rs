//! Configuration types

use crate::{ConfigError, LumenError, LumenResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// ROUTER
// =============================================================================

/// Heuristics used by the router before it falls back to a classification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Number of most recent turns scanned for a prior structured-data context.
    pub history_window: usize,
    /// Words that mark a turn as being about the relational data.
    pub context_keywords: Vec<String>,
    /// Words that refer back to something said earlier.
    pub anaphora: Vec<String>,
    /// Words that explicitly ask for a chart.
    pub visualization_terms: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            context_keywords: to_strings(&[
                "contacts",
                "contact",
                "entreprise",
                "entreprises",
                "société",
                "sociétés",
                "clients",
                "base",
                "sql",
                "données",
                "nombre_de_contacts",
                "graphique",
                "barres",
                "secteur",
                "activité",
                "repartition",
                "répartition",
                "companies",
                "company",
                "customers",
                "database",
                "data",
                "sector",
                "industry",
                "bar",
                "breakdown",
            ]),
            anaphora: to_strings(&[
                "les", "ça", "ceux", "celles", "cette", "ces", "it", "those", "them", "these",
                "that",
            ]),
            visualization_terms: to_strings(&[
                "camembert",
                "pie",
                "graphique",
                "visuel",
                "visualisation",
                "diagramme",
                "chart",
                "plot",
                "graph",
                "visualize",
            ]),
        }
    }
}

// =============================================================================
// RETRIEVAL / STATEMENTS / SANDBOX
// =============================================================================

/// Semantic retrieval parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Candidates requested from the vector store per query.
    pub candidate_count: usize,
    /// Candidates at or above this distance are not considered relevant.
    pub relevance_threshold: f32,
    /// Chunk window used by the document ingestor, in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_count: 10,
            relevance_threshold: 2.0,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatementConfig {
    /// Maximum statements executed from a single synthesized batch.
    pub max_statements: usize,
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self { max_statements: 3 }
    }
}

/// Limits and canvas size for the script sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxConfig {
    /// Maximum evaluation steps before a script is aborted.
    pub max_steps: u64,
    /// Wall-clock budget for one script run.
    pub max_duration_ms: u64,
    /// Maximum number of elements a single list or table may hold.
    pub max_collection_len: usize,
    /// Default canvas width in pixels.
    pub figure_width: u32,
    /// Default canvas height in pixels.
    pub figure_height: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_steps: 200_000,
            max_duration_ms: 2_000,
            max_collection_len: 100_000,
            figure_width: 960,
            figure_height: 540,
        }
    }
}

impl SandboxConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

// =============================================================================
// LLM / TIMEOUTS
// =============================================================================

/// Sampling parameters for each kind of completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub sql_temperature: f32,
    pub sql_max_tokens: u32,
    pub classification_temperature: f32,
    pub classification_max_tokens: u32,
    pub codegen_temperature: f32,
    pub codegen_max_tokens: u32,
    pub personalization_temperature: f32,
    pub personalization_max_tokens: u32,
    /// History turns included verbatim in synthesis prompts.
    pub history_turns_in_prompt: usize,
    /// Dataset rows shown to the code synthesizer.
    pub preview_rows: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            sql_temperature: 0.0,
            sql_max_tokens: 500,
            classification_temperature: 0.0,
            classification_max_tokens: 10,
            codegen_temperature: 0.1,
            codegen_max_tokens: 800,
            personalization_temperature: 0.2,
            personalization_max_tokens: 600,
            history_turns_in_prompt: 6,
            preview_rows: 5,
        }
    }
}

/// Per-call deadlines for collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    pub completion_ms: u64,
    pub store_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            completion_ms: 60_000,
            store_ms: 30_000,
        }
    }
}

impl TimeoutConfig {
    pub fn completion(&self) -> Duration {
        Duration::from_millis(self.completion_ms)
    }

    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }
}

// =============================================================================
// MASTER CONFIG
// =============================================================================

/// Master configuration for an orchestration pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LumenConfig {
    pub router: RouterConfig,
    pub retrieval: RetrievalConfig,
    pub statements: StatementConfig,
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    pub timeouts: TimeoutConfig,
}

impl LumenConfig {
    /// Validate the configuration.
    ///
    /// Validates:
    /// - history_window, candidate_count, max_statements > 0
    /// - relevance_threshold is finite and positive
    /// - chunk_overlap < chunk_size
    /// - sandbox budgets and all timeouts are positive
    /// - temperatures in [0.0, 2.0]
    pub fn validate(&self) -> LumenResult<()> {
        positive("router.history_window", self.router.history_window as u64)?;
        positive(
            "retrieval.candidate_count",
            self.retrieval.candidate_count as u64,
        )?;
        positive(
            "statements.max_statements",
            self.statements.max_statements as u64,
        )?;
        positive("retrieval.chunk_size", self.retrieval.chunk_size as u64)?;
        positive("sandbox.max_steps", self.sandbox.max_steps)?;
        positive("sandbox.max_duration_ms", self.sandbox.max_duration_ms)?;
        positive(
            "sandbox.max_collection_len",
            self.sandbox.max_collection_len as u64,
        )?;
        positive("sandbox.figure_width", self.sandbox.figure_width as u64)?;
        positive("sandbox.figure_height", self.sandbox.figure_height as u64)?;
        positive("timeouts.completion_ms", self.timeouts.completion_ms)?;
        positive("timeouts.store_ms", self.timeouts.store_ms)?;

        let threshold = self.retrieval.relevance_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(invalid(
                "retrieval.relevance_threshold",
                threshold.to_string(),
                "relevance_threshold must be a positive finite number",
            ));
        }

        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(invalid(
                "retrieval.chunk_overlap",
                self.retrieval.chunk_overlap.to_string(),
                "chunk_overlap must be smaller than chunk_size",
            ));
        }

        for (field, value) in [
            ("llm.sql_temperature", self.llm.sql_temperature),
            (
                "llm.classification_temperature",
                self.llm.classification_temperature,
            ),
            ("llm.codegen_temperature", self.llm.codegen_temperature),
            (
                "llm.personalization_temperature",
                self.llm.personalization_temperature,
            ),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(invalid(
                    field,
                    value.to_string(),
                    "temperature must be between 0.0 and 2.0",
                ));
            }
        }

        Ok(())
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `LUMEN_HISTORY_WINDOW` (default: 6)
    /// - `LUMEN_RETRIEVAL_CANDIDATES` (default: 10)
    /// - `LUMEN_RELEVANCE_THRESHOLD` (default: 2.0)
    /// - `LUMEN_MAX_STATEMENTS` (default: 3)
    /// - `LUMEN_SANDBOX_MAX_STEPS` (default: 200000)
    /// - `LUMEN_SANDBOX_MAX_DURATION_MS` (default: 2000)
    /// - `LUMEN_COMPLETION_TIMEOUT_MS` (default: 60000)
    /// - `LUMEN_STORE_TIMEOUT_MS` (default: 30000)
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Overlay `LUMEN_*` environment variables onto an existing configuration.
    pub fn with_env_overrides(mut self) -> Self {
        override_from_env("LUMEN_HISTORY_WINDOW", &mut self.router.history_window);
        override_from_env(
            "LUMEN_RETRIEVAL_CANDIDATES",
            &mut self.retrieval.candidate_count,
        );
        override_from_env(
            "LUMEN_RELEVANCE_THRESHOLD",
            &mut self.retrieval.relevance_threshold,
        );
        override_from_env("LUMEN_MAX_STATEMENTS", &mut self.statements.max_statements);
        override_from_env("LUMEN_SANDBOX_MAX_STEPS", &mut self.sandbox.max_steps);
        override_from_env(
            "LUMEN_SANDBOX_MAX_DURATION_MS",
            &mut self.sandbox.max_duration_ms,
        );
        override_from_env(
            "LUMEN_COMPLETION_TIMEOUT_MS",
            &mut self.timeouts.completion_ms,
        );
        override_from_env("LUMEN_STORE_TIMEOUT_MS", &mut self.timeouts.store_ms);
        self
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Some(value) = std::env::var(key).ok().and_then(|s| s.parse().ok()) {
        *slot = value;
    }
}

fn positive(field: &str, value: u64) -> LumenResult<()> {
    if value == 0 {
        return Err(invalid(
            field,
            value.to_string(),
            "value must be greater than 0",
        ));
    }
    Ok(())
}

fn invalid(field: &str, value: String, reason: &str) -> LumenError {
    LumenError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LumenConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.router.history_window, 6);
        assert_eq!(config.retrieval.candidate_count, 10);
        assert_eq!(config.retrieval.relevance_threshold, 2.0);
        assert_eq!(config.statements.max_statements, 3);
        assert_eq!(config.timeouts.completion(), Duration::from_secs(60));
        assert_eq!(config.timeouts.store(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_statements() {
        let mut config = LumenConfig::default();
        config.statements.max_statements = 0;
        let err = config.validate().unwrap_err();
        match err {
            LumenError::Config(ConfigError::InvalidValue { field, .. }) => {
                assert_eq!(field, "statements.max_statements");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = LumenConfig::default();
        config.retrieval.relevance_threshold = f32::NAN;
        assert!(config.validate().is_err());
        config.retrieval.relevance_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_chunk() {
        let mut config = LumenConfig::default();
        config.retrieval.chunk_overlap = config.retrieval.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = LumenConfig::default();
        config.timeouts.completion_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"statements": {"max_statements": 5}}"#;
        let config: LumenConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.statements.max_statements, 5);
        assert_eq!(config.router, RouterConfig::default());
    }

    #[test]
    fn test_from_env_overlays_defaults() {
        std::env::set_var("LUMEN_SANDBOX_MAX_STEPS", "1234");
        let config = LumenConfig::from_env();
        std::env::remove_var("LUMEN_SANDBOX_MAX_STEPS");
        assert_eq!(config.sandbox.max_steps, 1234);
        assert_eq!(config.router, RouterConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{"statements": {"max_statement": 5}}"#;
        assert!(serde_json::from_str::<LumenConfig>(json).is_err());
    }
}
