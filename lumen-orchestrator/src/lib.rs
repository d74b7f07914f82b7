//! LUMEN Orchestrator
//!
//! Composes the per-request cycle:
//!
//! ```text
//! Router ──► structured path (synthesize + execute statements)
//!        └─► semantic path (relevance-filtered retrieval)
//!                 │
//!                 ▼
//!        transformation synthesis ──► sandbox ──► ExecutionOutcome
//! ```
//!
//! When both paths run they are joined, and each fails independently.

pub mod codegen;
pub mod orchestrator;
pub mod router;

pub use codegen::{CodeSynthesis, TransformationSynthesizer, NOT_IN_DOCUMENTS};
pub use orchestrator::{Collaborators, Orchestrator};
pub use router::Router;
