//! Runtime values

use crate::error::{ScriptError, ScriptResult};
use lumen_core::{Cell, Dataset};
use std::fmt;
use std::rc::Rc;

/// A script value. Lists and tables are shared, never mutated in place.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Rc<Vec<Value>>),
    Table(Rc<Dataset>),
    /// The plotting surface bound to `plt`.
    Plot,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn table(dataset: Dataset) -> Self {
        Value::Table(Rc::new(dataset))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Table(_) => "table",
            Value::Plot => "plot",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Table(t) => !t.is_empty(),
            Value::Plot => true,
        }
    }

    /// Numeric view of ints, floats and bools.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn expect_number(&self, what: &str) -> ScriptResult<f64> {
        self.as_number().ok_or_else(|| {
            ScriptError::runtime(format!("{what} must be a number, got {}", self.type_name()))
        })
    }

    pub fn expect_int(&self, what: &str) -> ScriptResult<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Bool(b) => Ok(i64::from(*b)),
            other => Err(ScriptError::runtime(format!(
                "{what} must be an integer, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn expect_str(&self, what: &str) -> ScriptResult<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ScriptError::runtime(format!(
                "{what} must be a string, got {}",
                other.type_name()
            ))),
        }
    }

    /// Elements of a list, or the rows of a table as lists.
    pub fn expect_items(&self, what: &str) -> ScriptResult<Rc<Vec<Value>>> {
        match self {
            Value::List(items) => Ok(Rc::clone(items)),
            Value::Table(t) => Ok(Rc::new(
                t.rows
                    .iter()
                    .map(|row| Value::list(row.iter().map(Value::from_cell).collect()))
                    .collect(),
            )),
            other => Err(ScriptError::runtime(format!(
                "{what} must be a list, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn from_cell(cell: &Cell) -> Value {
        match cell {
            Cell::Null => Value::None,
            Cell::Integer(n) => Value::Int(*n),
            Cell::Real(f) => Value::Float(*f),
            Cell::Text(s) => Value::Str(s.clone()),
            Cell::Blob(b) => Value::Str(format!("<{} bytes>", b.len())),
        }
    }

    pub fn to_cell(&self) -> ScriptResult<Cell> {
        match self {
            Value::None => Ok(Cell::Null),
            Value::Bool(b) => Ok(Cell::Integer(i64::from(*b))),
            Value::Int(n) => Ok(Cell::Integer(*n)),
            Value::Float(f) => Ok(Cell::Real(*f)),
            Value::Str(s) => Ok(Cell::Text(s.clone())),
            other => Err(ScriptError::runtime(format!(
                "cannot store a {} in a table cell",
                other.type_name()
            ))),
        }
    }

    /// Equality across numeric types; other values compare structurally.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Plot, Value::Plot) => true,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match item {
                        Value::Str(s) => write!(f, "'{s}'")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("]")
            }
            Value::Table(t) => f.write_str(&t.preview(5)),
            Value::Plot => f.write_str("<plot>"),
        }
    }
}
