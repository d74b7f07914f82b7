//! Artifacts and the per-request execution outcome

use crate::{Dataset, Request, Routing, SemanticContext, StatementResult, Timestamp};
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// ARTIFACTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Statement text for the relational store.
    Sql,
    /// A sandbox program.
    Transformation,
    /// A canned answer produced without a completion call.
    Refusal,
}

/// Generated query or program text together with the prompt that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub kind: ArtifactKind,
    pub text: String,
    /// Empty for refusals.
    pub prompt: String,
}

impl GeneratedArtifact {
    pub fn new(kind: ArtifactKind, text: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            prompt: prompt.into(),
        }
    }

    pub fn refusal(text: impl Into<String>) -> Self {
        Self::new(ArtifactKind::Refusal, text, String::new())
    }
}

pub const SVG_MIME_TYPE: &str = "image/svg+xml";

/// Encoded image produced by the sandbox renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedImage {
    pub mime_type: String,
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    pub bytes: Vec<u8>,
}

impl RenderedImage {
    pub fn svg(bytes: Vec<u8>) -> Self {
        Self {
            mime_type: SVG_MIME_TYPE.to_string(),
            bytes,
        }
    }
}

fn encode_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(s.as_bytes())
        .map_err(serde::de::Error::custom)
}

// =============================================================================
// FAILURES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxFailureKind {
    Syntax,
    Runtime,
    BudgetExceeded,
}

/// Structured error returned when a sandbox program cannot run to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxFailure {
    pub kind: SandboxFailureKind,
    pub message: String,
    /// 1-based source line, when known.
    pub line: Option<usize>,
}

impl fmt::Display for SandboxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{:?} error at line {}: {}", self.kind, line, self.message),
            None => write!(f, "{:?} error: {}", self.kind, self.message),
        }
    }
}

pub const NO_DATA_SOURCE_MESSAGE: &str = "cannot determine data source";

/// Cycle-level error surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeError {
    /// Classifier, relational store and vector store were all unreachable.
    NoDataSource,
    /// A synthesis step could not produce an artifact.
    SynthesisFailed { stage: String, message: String },
    /// The generated program failed inside the sandbox.
    SandboxFailed(SandboxFailure),
}

impl fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeError::NoDataSource => f.write_str(NO_DATA_SOURCE_MESSAGE),
            OutcomeError::SynthesisFailed { stage, message } => {
                write!(f, "{stage} synthesis failed: {message}")
            }
            OutcomeError::SandboxFailed(failure) => write!(f, "{failure}"),
        }
    }
}

// =============================================================================
// EXECUTION OUTCOME
// =============================================================================

/// Everything produced by one orchestration cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub cycle_id: Uuid,
    pub request: Request,
    pub routing: Routing,
    pub sql: Option<GeneratedArtifact>,
    pub statements: Vec<StatementResult>,
    pub dataset: Option<Dataset>,
    pub semantic_context: Option<SemanticContext>,
    pub code: Option<GeneratedArtifact>,
    pub image: Option<RenderedImage>,
    pub error: Option<OutcomeError>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn failed_statements(&self) -> impl Iterator<Item = &StatementResult> {
        self.statements.iter().filter(|s| !s.is_success())
    }
}
