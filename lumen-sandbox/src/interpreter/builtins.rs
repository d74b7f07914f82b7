//! Pure built-in functions

use super::args::Args;
use super::value::Value;
use crate::error::{ScriptError, ScriptResult};
use std::cmp::Ordering;

/// Names callable without a receiver. `print` is handled by the
/// interpreter since it writes to the captured output.
pub const BUILTINS: &[&str] = &[
    "len", "sum", "mean", "min", "max", "round", "str", "range", "print",
];

pub fn call(name: &str, args: &Args, max_collection_len: usize) -> ScriptResult<Value> {
    match name {
        "len" => {
            args.check(1, &[])?;
            len(args.required(0, "value")?)
        }
        "sum" => {
            args.check(1, &[])?;
            sum(&numbers(args.required(0, "values")?, "sum()")?)
        }
        "mean" => {
            args.check(1, &[])?;
            let values = numbers(args.required(0, "values")?, "mean()")?;
            if values.is_empty() {
                return Err(ScriptError::runtime("mean() of an empty list"));
            }
            let total: f64 = values.iter().map(|v| v.as_number().unwrap_or(0.0)).sum();
            Ok(Value::Float(total / values.len() as f64))
        }
        "min" | "max" => {
            args.check(usize::MAX, &[])?;
            let candidates = match args.positional() {
                [single] => single.expect_items(&format!("{name}() argument"))?.to_vec(),
                many => many.to_vec(),
            };
            extreme(name, candidates)
        }
        "round" => {
            args.check(2, &["ndigits"])?;
            let x = args.required(0, "number")?.expect_number("round() argument")?;
            match args.get(1, "ndigits") {
                None | Some(Value::None) => Ok(Value::Int(x.round() as i64)),
                Some(digits) => {
                    let digits = digits.expect_int("round() ndigits")?.clamp(-15, 15);
                    let factor = 10f64.powi(digits as i32);
                    Ok(Value::Float((x * factor).round() / factor))
                }
            }
        }
        "str" => {
            args.check(1, &[])?;
            Ok(Value::Str(
                args.get(0, "value").map(Value::to_string).unwrap_or_default(),
            ))
        }
        "range" => {
            args.check(3, &[])?;
            range(args, max_collection_len)
        }
        other => Err(ScriptError::runtime(format!("name '{other}' is not defined"))),
    }
}

fn len(value: &Value) -> ScriptResult<Value> {
    let n = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Table(t) => t.len(),
        other => {
            return Err(ScriptError::runtime(format!(
                "len() of a {} is undefined",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

/// Numeric elements of a list; `None` entries are skipped.
fn numbers(value: &Value, what: &str) -> ScriptResult<Vec<Value>> {
    value
        .expect_items(&format!("{what} argument"))?
        .iter()
        .filter(|v| !matches!(v, Value::None))
        .map(|v| match v.as_number() {
            Some(_) => Ok(v.clone()),
            None => Err(ScriptError::runtime(format!(
                "{what} expects numbers, got {}",
                v.type_name()
            ))),
        })
        .collect()
}

fn sum(values: &[Value]) -> ScriptResult<Value> {
    if values.iter().all(|v| matches!(v, Value::Int(_) | Value::Bool(_))) {
        let mut total: i64 = 0;
        for v in values {
            let n = v.expect_int("sum() element")?;
            total = total
                .checked_add(n)
                .ok_or_else(|| ScriptError::runtime("integer overflow in sum()"))?;
        }
        Ok(Value::Int(total))
    } else {
        Ok(Value::Float(
            values.iter().map(|v| v.as_number().unwrap_or(0.0)).sum(),
        ))
    }
}

fn extreme(name: &str, candidates: Vec<Value>) -> ScriptResult<Value> {
    let mut iter = candidates.into_iter().filter(|v| !matches!(v, Value::None));
    let mut best = iter
        .next()
        .ok_or_else(|| ScriptError::runtime(format!("{name}() of an empty list")))?;
    for candidate in iter {
        let ordering = order(&candidate, &best)?;
        let better = if name == "min" {
            ordering == Ordering::Less
        } else {
            ordering == Ordering::Greater
        };
        if better {
            best = candidate;
        }
    }
    Ok(best)
}

/// Ordering between two numbers or two strings.
pub fn order(a: &Value, b: &Value) -> ScriptResult<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
            _ => Err(ScriptError::runtime(format!(
                "cannot compare {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn range(args: &Args, max_collection_len: usize) -> ScriptResult<Value> {
    let bounds = args
        .positional()
        .iter()
        .map(|v| v.expect_int("range() argument"))
        .collect::<ScriptResult<Vec<_>>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(ScriptError::runtime("range() expects 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(ScriptError::runtime("range() step must not be zero"));
    }

    let span = if step > 0 {
        (stop as i128 - start as i128).max(0)
    } else {
        (start as i128 - stop as i128).max(0)
    };
    let step_abs = (step as i128).abs();
    let count = (span + step_abs - 1) / step_abs;
    if count > max_collection_len as i128 {
        return Err(ScriptError::budget(format!(
            "range() of {count} elements exceeds the limit of {max_collection_len}"
        )));
    }

    Ok(Value::list(
        (0..count as i64)
            .map(|i| Value::Int(start + i * step))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|&n| Value::Int(n)).collect())
    }

    fn call1(name: &str, arg: Value) -> ScriptResult<Value> {
        call(name, &Args::new(name, vec![arg], vec![]), 1_000)
    }

    #[test]
    fn test_sum_keeps_integers() {
        assert!(matches!(call1("sum", ints(&[1, 2, 3])).unwrap(), Value::Int(6)));
        let mixed = Value::list(vec![Value::Int(1), Value::Float(0.5), Value::None]);
        assert!(matches!(call1("sum", mixed).unwrap(), Value::Float(f) if f == 1.5));
    }

    #[test]
    fn test_mean_of_empty_list_fails() {
        assert!(call1("mean", ints(&[])).is_err());
        assert!(matches!(call1("mean", ints(&[1, 2])).unwrap(), Value::Float(f) if f == 1.5));
    }

    #[test]
    fn test_min_max() {
        assert!(matches!(call1("max", ints(&[3, 9, 2])).unwrap(), Value::Int(9)));
        let args = Args::new("min", vec![Value::Int(4), Value::Float(1.5)], vec![]);
        assert!(matches!(call("min", &args, 10).unwrap(), Value::Float(f) if f == 1.5));
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(call1("range", Value::Int(3)).unwrap().to_string(), "[0, 1, 2]");
        let args = Args::new("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)], vec![]);
        assert_eq!(call("range", &args, 10).unwrap().to_string(), "[5, 3, 1]");
    }

    #[test]
    fn test_range_respects_collection_limit() {
        let err = call("range", &Args::new("range", vec![Value::Int(50)], vec![]), 10).unwrap_err();
        assert!(matches!(err, ScriptError::BudgetExceeded { .. }));
    }

    #[test]
    fn test_round() {
        assert!(matches!(call1("round", Value::Float(2.6)).unwrap(), Value::Int(3)));
        let args = Args::new("round", vec![Value::Float(2.345), Value::Int(1)], vec![]);
        assert!(matches!(call("round", &args, 10).unwrap(), Value::Float(f) if (f - 2.3).abs() < 1e-9));
    }
}
