//! Tree-walking interpreter with step, time and size budgets
//!
//! The global scope starts with exactly two bindings, `df` and `plt`.
//! Nothing in the language reaches files, the network, processes or the
//! environment.

pub mod args;
pub mod builtins;
pub mod table;
pub mod value;

pub use args::Args;
pub use value::Value;

use crate::error::{ScriptError, ScriptResult};
use crate::figure::Figure;
use crate::parser::{Argument, BinaryOp, Expr, Literal, LogicalOp, Program, Stmt, UnaryOp};
use lumen_core::{Dataset, SandboxConfig};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Names that scripts may read but never rebind.
pub const RESERVED: &[&str] = &["df", "plt"];

/// Elapsed time is sampled every this many steps.
const CLOCK_INTERVAL: u64 = 64;

/// Deepest expression evaluation allowed.
const MAX_EVAL_DEPTH: usize = 128;

// ============================================================================
// BUDGET
// ============================================================================

#[derive(Debug)]
struct Budget {
    steps: u64,
    max_steps: u64,
    started: Instant,
    max_duration: Duration,
}

impl Budget {
    fn new(config: &SandboxConfig) -> Self {
        Self {
            steps: 0,
            max_steps: config.max_steps,
            started: Instant::now(),
            max_duration: config.max_duration(),
        }
    }

    fn tick(&mut self) -> ScriptResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(ScriptError::budget(format!(
                "step budget of {} exhausted",
                self.max_steps
            )));
        }
        if self.steps % CLOCK_INTERVAL == 0 && self.started.elapsed() > self.max_duration {
            return Err(ScriptError::budget(format!(
                "time budget of {} ms exhausted",
                self.max_duration.as_millis()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// INTERPRETER
// ============================================================================

/// Executes one program against one dataset.
#[derive(Debug)]
pub struct Interpreter {
    globals: HashMap<String, Value>,
    figure: Figure,
    output: Vec<String>,
    budget: Budget,
    max_collection_len: usize,
    depth: usize,
}

impl Interpreter {
    pub fn new(dataset: Dataset, config: &SandboxConfig) -> Self {
        let mut globals = HashMap::new();
        globals.insert("df".to_string(), Value::Table(Rc::new(dataset)));
        globals.insert("plt".to_string(), Value::Plot);
        Self {
            globals,
            figure: Figure::new(config.figure_width, config.figure_height),
            output: Vec::new(),
            budget: Budget::new(config),
            max_collection_len: config.max_collection_len,
            depth: 0,
        }
    }

    pub fn run(&mut self, program: &Program) -> ScriptResult<()> {
        self.exec_block(&program.statements)
    }

    pub fn figure(&self) -> &Figure {
        &self.figure
    }

    /// Lines written by `print`.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn steps(&self) -> u64 {
        self.budget.steps
    }

    pub fn into_parts(self) -> (Figure, Vec<String>) {
        (self.figure, self.output)
    }

    fn exec_block(&mut self, statements: &[Stmt]) -> ScriptResult<()> {
        for stmt in statements {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> ScriptResult<()> {
        let line = stmt.line();
        self.budget.tick().map_err(|e| e.at_line(line))?;

        match stmt {
            Stmt::Assign { target, value, .. } => {
                check_rebind(target).map_err(|e| e.at_line(line))?;
                let value = self.eval(value).map_err(|e| e.at_line(line))?;
                self.globals.insert(target.clone(), value);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let condition = self.eval(condition).map_err(|e| e.at_line(line))?;
                if condition.is_truthy() {
                    self.exec_block(then_branch)?;
                } else {
                    self.exec_block(else_branch)?;
                }
            }
            Stmt::For {
                variable,
                iterable,
                body,
                ..
            } => {
                check_rebind(variable).map_err(|e| e.at_line(line))?;
                let items = self
                    .eval(iterable)
                    .and_then(|v| v.expect_items("for loop target"))
                    .map_err(|e| e.at_line(line))?;
                for item in items.iter() {
                    self.globals.insert(variable.clone(), item.clone());
                    self.exec_block(body)?;
                }
            }
            Stmt::Expr { expr, .. } => {
                self.eval(expr).map_err(|e| e.at_line(line))?;
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(ScriptError::budget(format!(
                "expression nesting deeper than {MAX_EVAL_DEPTH}"
            )));
        }
        self.depth += 1;
        let value = self.eval_node(expr);
        self.depth -= 1;
        value
    }

    fn eval_node(&mut self, expr: &Expr) -> ScriptResult<Value> {
        self.budget.tick()?;

        let value = match expr {
            Expr::Literal(literal) => match literal {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(n) => Value::Int(*n),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(s.clone()),
            },
            Expr::Variable(name) => self
                .globals
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::runtime(format!("name '{name}' is not defined")))?,
            Expr::List(items) => Value::list(
                items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<ScriptResult<Vec<_>>>()?,
            ),
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                unary(*op, operand)?
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right)?
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                match (op, left.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => left,
                    _ => self.eval(right)?,
                }
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(&target, &index)?
            }
            Expr::Attribute { target, name } => {
                let target = self.eval(target)?;
                self.call_method(target, name, &Args::none(name.as_str()))?
            }
            Expr::Call { callee, args } => {
                let (positional, named) = self.eval_arguments(args)?;
                match callee.as_ref() {
                    Expr::Variable(name) => {
                        let args = Args::new(name.as_str(), positional, named);
                        self.call_function(name, &args)?
                    }
                    Expr::Attribute { target, name } => {
                        let target = self.eval(target)?;
                        let args = Args::new(name.as_str(), positional, named);
                        self.call_method(target, name, &args)?
                    }
                    _ => {
                        return Err(ScriptError::runtime(
                            "only functions and methods can be called",
                        ))
                    }
                }
            }
        };

        self.check_size(&value)?;
        Ok(value)
    }

    fn eval_arguments(
        &mut self,
        args: &[Argument],
    ) -> ScriptResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::new();
        let mut named = Vec::new();
        for arg in args {
            let value = self.eval(&arg.value)?;
            match &arg.name {
                Some(name) => named.push((name.clone(), value)),
                None => positional.push(value),
            }
        }
        Ok((positional, named))
    }

    fn call_function(&mut self, name: &str, args: &Args) -> ScriptResult<Value> {
        if name == "print" {
            let line = args
                .positional()
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            if self.output.len() < self.max_collection_len {
                self.output.push(line);
            }
            return Ok(Value::None);
        }
        if let Some(value) = self.globals.get(name) {
            return Err(ScriptError::runtime(format!(
                "'{name}' is a {} and cannot be called",
                value.type_name()
            )));
        }
        builtins::call(name, args, self.max_collection_len)
    }

    fn call_method(&mut self, target: Value, name: &str, args: &Args) -> ScriptResult<Value> {
        match target {
            Value::Plot => {
                self.figure.apply(name, args)?;
                Ok(Value::None)
            }
            Value::Table(t) => table::call_method(&t, name, args),
            other => Err(ScriptError::runtime(format!(
                "{} has no method '{name}'",
                other.type_name()
            ))),
        }
    }

    fn check_size(&self, value: &Value) -> ScriptResult<()> {
        let len = match value {
            Value::List(items) => items.len(),
            Value::Str(s) => s.len(),
            _ => return Ok(()),
        };
        if len > self.max_collection_len {
            return Err(ScriptError::budget(format!(
                "a {} of {len} elements exceeds the limit of {}",
                value.type_name(),
                self.max_collection_len
            )));
        }
        Ok(())
    }
}

fn check_rebind(name: &str) -> ScriptResult<()> {
    if RESERVED.contains(&name) {
        return Err(ScriptError::runtime(format!("cannot assign to '{name}'")));
    }
    Ok(())
}

// ============================================================================
// OPERATORS
// ============================================================================

fn unary(op: UnaryOp, operand: Value) -> ScriptResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ScriptError::runtime("integer overflow")),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(ScriptError::runtime(format!(
            "cannot negate a {}",
            other.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> ScriptResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.loose_eq(&right))),
        BinaryOp::Ne => Ok(Value::Bool(!left.loose_eq(&right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = builtins::order(&left, &right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::In => contains(&right, &left).map(Value::Bool),
        BinaryOp::Add => match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::list(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => arithmetic(op, &left, &right),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, &left, &right)
        }
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    let mismatch = || {
        ScriptError::runtime(format!(
            "unsupported operand types for {}: {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    };

    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(ScriptError::runtime("division by zero"));
                }
                return Ok(Value::Float(a as f64 / b as f64));
            }
            BinaryOp::Rem => {
                if b == 0 {
                    return Err(ScriptError::runtime("modulo by zero"));
                }
                a.checked_rem(b).map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
            }
            _ => return Err(mismatch()),
        };
        return result
            .map(Value::Int)
            .ok_or_else(|| ScriptError::runtime("integer overflow"));
    }

    let (a, b) = match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(mismatch()),
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(ScriptError::runtime("division by zero"));
            }
            a / b
        }
        BinaryOp::Rem => {
            if b == 0.0 {
                return Err(ScriptError::runtime("modulo by zero"));
            }
            a - b * (a / b).floor()
        }
        _ => return Err(mismatch()),
    };
    Ok(Value::Float(result))
}

fn contains(container: &Value, needle: &Value) -> ScriptResult<bool> {
    match container {
        Value::List(items) => Ok(items.iter().any(|item| item.loose_eq(needle))),
        Value::Str(s) => Ok(s.contains(needle.expect_str("left operand of 'in'")?)),
        Value::Table(t) => {
            let column = needle.expect_str("column name")?;
            Ok(t.columns.iter().any(|c| c == column))
        }
        other => Err(ScriptError::runtime(format!(
            "'in' is not supported on a {}",
            other.type_name()
        ))),
    }
}

fn index_value(target: &Value, index: &Value) -> ScriptResult<Value> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => position(items.len(), *i)
            .map(|p| items[p].clone())
            .ok_or_else(|| ScriptError::runtime(format!("list index {i} out of range"))),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            position(chars.len(), *i)
                .map(|p| Value::Str(chars[p].to_string()))
                .ok_or_else(|| ScriptError::runtime(format!("string index {i} out of range")))
        }
        (Value::Table(t), Value::Str(column)) => {
            let idx = table::column_index(t, column)?;
            Ok(table::column_values(t, idx))
        }
        (Value::Table(t), Value::Int(i)) => position(t.len(), *i)
            .map(|p| Value::list(t.rows[p].iter().map(Value::from_cell).collect()))
            .ok_or_else(|| ScriptError::runtime(format!("row index {i} out of range"))),
        (Value::Table(t), Value::List(_)) => {
            let args = Args::new("select", vec![index.clone()], Vec::new());
            table::call_method(t, "select", &args)
        }
        (target, index) => Err(ScriptError::runtime(format!(
            "cannot index a {} with a {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

/// Resolve a possibly negative index against `len`.
fn position(len: usize, index: i64) -> Option<usize> {
    let resolved = if index < 0 {
        len as i64 + index
    } else {
        index
    };
    (resolved >= 0 && (resolved as usize) < len).then_some(resolved as usize)
}
