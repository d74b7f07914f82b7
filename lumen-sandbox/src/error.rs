//! Script errors and their conversion to outcome failures

use crate::parser::ParseError;
use lumen_core::{SandboxFailure, SandboxFailureKind};
use thiserror::Error;

/// Anything that stops a script. Never escapes the sandbox as a panic;
/// converted to [`SandboxFailure`] at the boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("{message} (line {line}, column {column})")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("{message}")]
    Runtime { message: String, line: Option<usize> },

    #[error("{message}")]
    BudgetExceeded { message: String, line: Option<usize> },
}

impl ScriptError {
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            message: message.into(),
            line: None,
        }
    }

    pub fn budget(message: impl Into<String>) -> Self {
        ScriptError::BudgetExceeded {
            message: message.into(),
            line: None,
        }
    }

    /// Attach `line` unless a more precise line is already known.
    pub fn at_line(self, at: usize) -> Self {
        match self {
            ScriptError::Runtime { message, line } => ScriptError::Runtime {
                message,
                line: line.or(Some(at)),
            },
            ScriptError::BudgetExceeded { message, line } => ScriptError::BudgetExceeded {
                message,
                line: line.or(Some(at)),
            },
            syntax => syntax,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Syntax { line, .. } => Some(*line),
            ScriptError::Runtime { line, .. } | ScriptError::BudgetExceeded { line, .. } => *line,
        }
    }
}

impl From<ParseError> for ScriptError {
    fn from(e: ParseError) -> Self {
        ScriptError::Syntax {
            message: e.message,
            line: e.line,
            column: e.column,
        }
    }
}

impl From<ScriptError> for SandboxFailure {
    fn from(e: ScriptError) -> Self {
        let kind = match &e {
            ScriptError::Syntax { .. } => SandboxFailureKind::Syntax,
            ScriptError::Runtime { .. } => SandboxFailureKind::Runtime,
            ScriptError::BudgetExceeded { .. } => SandboxFailureKind::BudgetExceeded,
        };
        let message = match &e {
            ScriptError::Syntax { message, .. }
            | ScriptError::Runtime { message, .. }
            | ScriptError::BudgetExceeded { message, .. } => message.clone(),
        };
        SandboxFailure {
            kind,
            message,
            line: e.line(),
        }
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_line_keeps_inner_line() {
        let err = ScriptError::Runtime {
            message: "boom".into(),
            line: Some(3),
        };
        assert_eq!(err.at_line(1).line(), Some(3));
        assert_eq!(ScriptError::runtime("boom").at_line(7).line(), Some(7));
    }

    #[test]
    fn test_conversion_to_failure() {
        let failure: SandboxFailure = ScriptError::budget("step budget exhausted").at_line(4).into();
        assert_eq!(failure.kind, SandboxFailureKind::BudgetExceeded);
        assert_eq!(failure.line, Some(4));
        assert_eq!(failure.message, "step budget exhausted");
    }
}
