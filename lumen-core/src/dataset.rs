//! Tabular result sets

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single value in a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Numeric view of the cell. Text that parses as a number counts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(i) => Some(*i as f64),
            Cell::Real(r) => Some(*r),
            Cell::Text(s) => s.trim().parse().ok(),
            Cell::Null | Cell::Blob(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "NULL"),
            Cell::Integer(i) => write!(f, "{i}"),
            Cell::Real(r) => write!(f, "{r}"),
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Integer(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Real(value)
    }
}

/// Ordered rows with named columns. Zero rows is a valid, empty dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    /// Dataset with columns but no rows.
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<Cell>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).cloned().unwrap_or(Cell::Null))
                .collect(),
        )
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Render the first `n` rows as a pipe-separated text table.
    pub fn preview(&self, n: usize) -> String {
        let mut out = self.columns.join(" | ");
        for row in self.rows.iter().take(n) {
            out.push('\n');
            let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            out.push_str(&cells.join(" | "));
        }
        if self.rows.len() > n {
            out.push_str(&format!("\n... ({} rows total)", self.rows.len()));
        }
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::new(
            vec!["Société".to_string(), "Secteur d'activité".to_string()],
            vec![
                vec![Cell::from("Acme"), Cell::from("Industrie")],
                vec![Cell::from("Globex"), Cell::Null],
                vec![Cell::from("Initech"), Cell::from("Logiciel")],
            ],
        )
    }

    #[test]
    fn test_head_keeps_columns() {
        let ds = sample().head(2);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.columns.len(), 2);
    }

    #[test]
    fn test_column_lookup() {
        let ds = sample();
        assert_eq!(ds.column_index("Secteur d'activité"), Some(1));
        assert!(ds.column("missing").is_none());
        let col = ds.column("Société").unwrap();
        assert_eq!(col[2], Cell::from("Initech"));
    }

    #[test]
    fn test_empty_dataset_is_valid() {
        let ds = Dataset::empty(vec!["Nom".to_string()]);
        assert!(ds.is_empty());
        assert_eq!(ds.preview(5), "Nom");
    }

    #[test]
    fn test_preview_marks_truncation() {
        let preview = sample().preview(1);
        assert!(preview.contains("Acme"));
        assert!(!preview.contains("Globex"));
        assert!(preview.contains("3 rows total"));
    }

    #[test]
    fn test_cell_numeric_view() {
        assert_eq!(Cell::Integer(4).as_f64(), Some(4.0));
        assert_eq!(Cell::from(" 2.5 ").as_f64(), Some(2.5));
        assert_eq!(Cell::Null.as_f64(), None);
    }

    #[test]
    fn test_cell_serializes_untagged() {
        let row = vec![Cell::Null, Cell::Integer(1), Cell::from("x")];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[null,1,"x"]"#);
    }
}
