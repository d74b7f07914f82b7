//! Table operations available on `df` and derived tables
//!
//! Every operation returns a new table; the bound dataset is never mutated.

use super::args::Args;
use super::value::Value;
use crate::error::{ScriptError, ScriptResult};
use lumen_core::{Cell, Dataset};
use std::cmp::Ordering;
use std::rc::Rc;

/// Dispatch `table.name(args)`.
pub fn call_method(table: &Rc<Dataset>, name: &str, args: &Args) -> ScriptResult<Value> {
    match name {
        "fillna" => {
            args.check(1, &["value", "column"])?;
            let value = args.required(0, "value")?.to_cell()?;
            let column = optional_column(table, args.named("column"))?;
            Ok(Value::table(fillna(table, &value, column)))
        }
        "dropna" => {
            args.check(1, &["column"])?;
            let column = optional_column(table, args.get(0, "column"))?;
            Ok(Value::table(dropna(table, column)))
        }
        "count_by" => {
            args.check(1, &["column"])?;
            let idx = column_arg(table, args, 0, "column")?;
            Ok(Value::table(count_by(table, idx)))
        }
        "sum_by" | "mean_by" => {
            args.check(2, &["column", "value"])?;
            let group = column_arg(table, args, 0, "column")?;
            let value = column_arg(table, args, 1, "value")?;
            let aggregate = if name == "sum_by" {
                Aggregate::Sum
            } else {
                Aggregate::Mean
            };
            Ok(Value::table(aggregate_by(table, group, value, aggregate)?))
        }
        "sort_by" => {
            args.check(2, &["column", "ascending"])?;
            let idx = column_arg(table, args, 0, "column")?;
            let ascending = args
                .get(1, "ascending")
                .map(Value::is_truthy)
                .unwrap_or(true);
            Ok(Value::table(sort_by(table, idx, ascending)))
        }
        "head" => {
            args.check(1, &["n"])?;
            let n = match args.get(0, "n") {
                Some(v) => v.expect_int("head() row count")?,
                None => 5,
            };
            Ok(Value::table(table.head(n.max(0) as usize)))
        }
        "select" => {
            let names: Vec<String> = match args.positional() {
                [Value::List(items)] => items
                    .iter()
                    .map(|v| v.expect_str("column name").map(str::to_string))
                    .collect::<ScriptResult<_>>()?,
                values => values
                    .iter()
                    .map(|v| v.expect_str("column name").map(str::to_string))
                    .collect::<ScriptResult<_>>()?,
            };
            args.check(usize::MAX, &[])?;
            Ok(Value::table(select(table, &names)?))
        }
        "filter_eq" => {
            args.check(2, &["column", "value"])?;
            let idx = column_arg(table, args, 0, "column")?;
            let value = args.required(1, "value")?;
            Ok(Value::table(filter_eq(table, idx, value)))
        }
        "column" => {
            args.check(1, &["name"])?;
            let idx = column_arg(table, args, 0, "name")?;
            Ok(column_values(table, idx))
        }
        "columns" => {
            args.check(0, &[])?;
            Ok(Value::list(
                table.columns.iter().cloned().map(Value::Str).collect(),
            ))
        }
        "is_empty" => {
            args.check(0, &[])?;
            Ok(Value::Bool(table.is_empty()))
        }
        "len" => {
            args.check(0, &[])?;
            Ok(Value::Int(table.len() as i64))
        }
        other => Err(ScriptError::runtime(format!("table has no method '{other}'"))),
    }
}

/// Resolve a column name or fail with `unknown column`.
pub fn column_index(table: &Dataset, name: &str) -> ScriptResult<usize> {
    table
        .column_index(name)
        .ok_or_else(|| ScriptError::runtime(format!("unknown column '{name}'")))
}

/// Values of one column as a list.
pub fn column_values(table: &Dataset, idx: usize) -> Value {
    Value::list(
        table
            .rows
            .iter()
            .map(|row| row.get(idx).map(Value::from_cell).unwrap_or(Value::None))
            .collect(),
    )
}

fn column_arg(table: &Dataset, args: &Args, index: usize, name: &str) -> ScriptResult<usize> {
    let column = args.required(index, name)?.expect_str("column name")?;
    column_index(table, column)
}

fn optional_column(table: &Dataset, value: Option<&Value>) -> ScriptResult<Option<usize>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => column_index(table, v.expect_str("column name")?).map(Some),
    }
}

fn cell_at(row: &[Cell], idx: usize) -> &Cell {
    row.get(idx).unwrap_or(&Cell::Null)
}

// ============================================================================
// OPERATIONS
// ============================================================================

fn fillna(table: &Dataset, value: &Cell, column: Option<usize>) -> Dataset {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    let targeted = column.map_or(true, |c| c == i);
                    if targeted && cell.is_null() {
                        value.clone()
                    } else {
                        cell.clone()
                    }
                })
                .collect()
        })
        .collect();
    Dataset::new(table.columns.clone(), rows)
}

fn dropna(table: &Dataset, column: Option<usize>) -> Dataset {
    let rows = table
        .rows
        .iter()
        .filter(|row| match column {
            Some(c) => !cell_at(row, c).is_null(),
            None => !row.iter().any(Cell::is_null),
        })
        .cloned()
        .collect();
    Dataset::new(table.columns.clone(), rows)
}

/// Occurrences of each non-null value, most frequent first. Ties keep
/// first-appearance order.
fn count_by(table: &Dataset, idx: usize) -> Dataset {
    let mut groups: Vec<(Cell, i64)> = Vec::new();
    for row in &table.rows {
        let cell = cell_at(row, idx);
        if cell.is_null() {
            continue;
        }
        match groups.iter_mut().find(|(key, _)| key == cell) {
            Some((_, n)) => *n += 1,
            None => groups.push((cell.clone(), 1)),
        }
    }
    groups.sort_by(|a, b| b.1.cmp(&a.1));

    Dataset::new(
        vec![table.columns[idx].clone(), "count".to_string()],
        groups
            .into_iter()
            .map(|(key, n)| vec![key, Cell::Integer(n)])
            .collect(),
    )
}

#[derive(Debug, Clone, Copy)]
enum Aggregate {
    Sum,
    Mean,
}

/// Group by a column and aggregate a numeric column. Groups are ordered by
/// key; null keys and null values are skipped.
fn aggregate_by(
    table: &Dataset,
    group: usize,
    value: usize,
    aggregate: Aggregate,
) -> ScriptResult<Dataset> {
    let mut groups: Vec<(Cell, f64, usize)> = Vec::new();
    for row in &table.rows {
        let key = cell_at(row, group);
        let cell = cell_at(row, value);
        if key.is_null() || cell.is_null() {
            continue;
        }
        let number = numeric_cell(cell).ok_or_else(|| {
            ScriptError::runtime(format!(
                "column '{}' contains a non-numeric value '{}'",
                table.columns[value], cell
            ))
        })?;
        match groups.iter_mut().find(|(k, _, _)| k == key) {
            Some((_, total, n)) => {
                *total += number;
                *n += 1;
            }
            None => groups.push((key.clone(), number, 1)),
        }
    }
    groups.sort_by(|a, b| compare_cells(&a.0, &b.0));

    let rows = groups
        .into_iter()
        .map(|(key, total, n)| {
            let result = match aggregate {
                Aggregate::Sum => total,
                Aggregate::Mean => total / n as f64,
            };
            vec![key, Cell::Real(result)]
        })
        .collect();
    Ok(Dataset::new(
        vec![table.columns[group].clone(), table.columns[value].clone()],
        rows,
    ))
}

/// Stable sort; nulls always go last.
fn sort_by(table: &Dataset, idx: usize, ascending: bool) -> Dataset {
    let mut rows = table.rows.clone();
    rows.sort_by(|a, b| {
        let (x, y) = (cell_at(a, idx), cell_at(b, idx));
        match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if ascending => compare_cells(x, y),
            (false, false) => compare_cells(y, x),
        }
    });
    Dataset::new(table.columns.clone(), rows)
}

fn select(table: &Dataset, names: &[String]) -> ScriptResult<Dataset> {
    let indices = names
        .iter()
        .map(|n| column_index(table, n))
        .collect::<ScriptResult<Vec<_>>>()?;
    let rows = table
        .rows
        .iter()
        .map(|row| indices.iter().map(|&i| cell_at(row, i).clone()).collect())
        .collect();
    Ok(Dataset::new(names.to_vec(), rows))
}

fn filter_eq(table: &Dataset, idx: usize, value: &Value) -> Dataset {
    let rows = table
        .rows
        .iter()
        .filter(|row| Value::from_cell(cell_at(row, idx)).loose_eq(value))
        .cloned()
        .collect();
    Dataset::new(table.columns.clone(), rows)
}

fn numeric_cell(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Integer(n) => Some(*n as f64),
        Cell::Real(f) => Some(*f),
        Cell::Text(s) => s.trim().parse().ok(),
        Cell::Null | Cell::Blob(_) => None,
    }
}

/// Numbers before text, numbers numerically, text lexically.
fn compare_cells(a: &Cell, b: &Cell) -> Ordering {
    let number = |c: &Cell| match c {
        Cell::Integer(n) => Some(*n as f64),
        Cell::Real(f) => Some(*f),
        _ => None,
    };
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.to_string().cmp(&b.to_string()),
    }
}
