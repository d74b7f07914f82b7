//! Evaluated call arguments

use super::value::Value;
use crate::error::{ScriptError, ScriptResult};

/// Arguments of one call, already evaluated.
///
/// Parameters are looked up by position or by name, so `head(3)` and
/// `head(n=3)` are equivalent.
#[derive(Debug, Clone, Default)]
pub struct Args {
    callee: String,
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl Args {
    pub fn new(callee: impl Into<String>, positional: Vec<Value>, named: Vec<(String, Value)>) -> Self {
        Self {
            callee: callee.into(),
            positional,
            named,
        }
    }

    /// No arguments, used for attribute access such as `df.columns`.
    pub fn none(callee: impl Into<String>) -> Self {
        Self::new(callee, Vec::new(), Vec::new())
    }

    pub fn callee(&self) -> &str {
        &self.callee
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn named(&self, name: &str) -> Option<&Value> {
        self.named.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Parameter at `index`, or passed as `name=`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.named(name).or_else(|| self.positional.get(index))
    }

    pub fn required(&self, index: usize, name: &str) -> ScriptResult<&Value> {
        self.get(index, name).ok_or_else(|| {
            ScriptError::runtime(format!("{}() missing argument '{}'", self.callee, name))
        })
    }

    /// Reject surplus positional arguments and unknown names.
    pub fn check(&self, max_positional: usize, names: &[&str]) -> ScriptResult<()> {
        if self.positional.len() > max_positional {
            return Err(ScriptError::runtime(format!(
                "{}() takes at most {} positional argument(s), got {}",
                self.callee,
                max_positional,
                self.positional.len()
            )));
        }
        if let Some((name, _)) = self.named.iter().find(|(n, _)| !names.contains(&n.as_str())) {
            return Err(ScriptError::runtime(format!(
                "{}() got an unexpected argument '{}'",
                self.callee, name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_overrides_position() {
        let args = Args::new("head", vec![], vec![("n".into(), Value::Int(3))]);
        assert!(matches!(args.get(0, "n"), Some(Value::Int(3))));
    }

    #[test]
    fn test_check_rejects_unknown_name() {
        let args = Args::new("head", vec![], vec![("rows".into(), Value::Int(3))]);
        let err = args.check(1, &["n"]).unwrap_err();
        assert!(err.to_string().contains("unexpected argument 'rows'"));
    }

    #[test]
    fn test_missing_required() {
        let err = Args::none("count_by").required(0, "column").unwrap_err();
        assert_eq!(err.to_string(), "count_by() missing argument 'column'");
    }
}
