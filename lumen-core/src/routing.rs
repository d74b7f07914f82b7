//! Routing decisions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which source(s) a request is answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingDecision {
    /// Relational store via synthesized statements.
    Structured,
    /// Document store via nearest-neighbour search.
    Semantic,
    /// Both paths, independently.
    Both,
}

impl RoutingDecision {
    /// Parse a classifier label (SQL, VECTOR, BOTH). Surrounding whitespace,
    /// punctuation and case are ignored.
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned: String = label
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_uppercase();
        match cleaned.as_str() {
            "SQL" => Some(RoutingDecision::Structured),
            "VECTOR" => Some(RoutingDecision::Semantic),
            "BOTH" => Some(RoutingDecision::Both),
            _ => None,
        }
    }

    pub fn uses_structured(&self) -> bool {
        matches!(self, RoutingDecision::Structured | RoutingDecision::Both)
    }

    pub fn uses_semantic(&self) -> bool {
        matches!(self, RoutingDecision::Semantic | RoutingDecision::Both)
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoutingDecision::Structured => "STRUCTURED",
            RoutingDecision::Semantic => "SEMANTIC",
            RoutingDecision::Both => "BOTH",
        };
        f.write_str(s)
    }
}

/// Why a routing decision was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum RoutingBasis {
    /// Prior structured context plus an anaphoric or visualization cue.
    ContextOverride,
    /// The classifier returned a recognized label.
    Classified,
    /// The classifier answered with something outside the label set.
    FailClosedUnrecognized { raw: String },
    /// The classifier could not be reached.
    FailClosedUnavailable { reason: String },
}

impl RoutingBasis {
    pub fn is_fail_closed(&self) -> bool {
        matches!(
            self,
            RoutingBasis::FailClosedUnrecognized { .. } | RoutingBasis::FailClosedUnavailable { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routing {
    pub decision: RoutingDecision,
    pub basis: RoutingBasis,
}

impl Routing {
    pub fn new(decision: RoutingDecision, basis: RoutingBasis) -> Self {
        Self { decision, basis }
    }
}
