//! Figure model behind `plt`
//!
//! Plot calls only record series and labels here; drawing happens in
//! [`crate::render`].

use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::{Args, Value};
use lumen_core::Dataset;
use std::rc::Rc;

/// Categorical palette; series and bar categories cycle through it.
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Pixels per inch for `plt.figure(width=, height=)`.
pub const PX_PER_INCH: f64 = 80.0;
pub const MIN_SIDE_PX: u32 = 160;
pub const MAX_SIDE_PX: u32 = 4000;

#[derive(Debug, Clone, PartialEq)]
pub struct Bars {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub colors: Vec<String>,
    pub horizontal: bool,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Points {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Tick labels when x was given as text.
    pub categories: Option<Vec<String>>,
    pub color: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slices {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Series {
    Bars(Bars),
    Line(Points),
    Scatter(Points),
    Pie(Slices),
}

/// Free text. Positioned in data coordinates when `at` is set, otherwise
/// stacked in the middle of the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub text: String,
    pub at: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub width: u32,
    pub height: u32,
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub legend: bool,
    pub series: Vec<Series>,
    pub annotations: Vec<Annotation>,
}

impl Figure {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.clamp(MIN_SIDE_PX, MAX_SIDE_PX),
            height: height.clamp(MIN_SIDE_PX, MAX_SIDE_PX),
            title: None,
            xlabel: None,
            ylabel: None,
            legend: false,
            series: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// A figure holding a single centered message.
    pub fn message(width: u32, height: u32, text: &str) -> Self {
        let mut figure = Self::new(width, height);
        figure.annotations.push(Annotation {
            text: text.to_string(),
            at: None,
        });
        figure
    }

    /// True once anything drawable has been recorded.
    pub fn has_content(&self) -> bool {
        !self.series.is_empty()
            || self.title.is_some()
            || self.xlabel.is_some()
            || self.ylabel.is_some()
            || !self.annotations.is_empty()
    }

    /// Apply one `plt.<method>(...)` call.
    pub fn apply(&mut self, method: &str, args: &Args) -> ScriptResult<()> {
        match method {
            "figure" => {
                args.check(2, &["width", "height", "figsize"])?;
                let (width, height) = match args.named("figsize") {
                    Some(size) => {
                        let items = size.expect_items("figsize")?;
                        match items.as_slice() {
                            [w, h] => (Some(w.clone()), Some(h.clone())),
                            _ => return Err(ScriptError::runtime("figsize must be [width, height]")),
                        }
                    }
                    None => (args.get(0, "width").cloned(), args.get(1, "height").cloned()),
                };
                let width = inches_to_px(width.as_ref(), self.width)?;
                let height = inches_to_px(height.as_ref(), self.height)?;
                *self = Figure::new(width, height);
            }
            "bar" | "barh" => {
                args.check(2, &["x", "height", "width", "y", "color", "label"])?;
                let (labels, values) = label_value_pairs(args, method)?;
                let colors = match args.named("color") {
                    Some(c) => colors_arg(c, labels.len())?,
                    None if self.bar_series_count() == 0 => (0..labels.len())
                        .map(|i| PALETTE[i % PALETTE.len()].to_string())
                        .collect(),
                    None => vec![self.next_color(); labels.len()],
                };
                self.series.push(Series::Bars(Bars {
                    labels,
                    values,
                    colors,
                    horizontal: method == "barh",
                    label: optional_text(args.named("label")),
                }));
            }
            "line" | "plot" | "scatter" => {
                args.check(2, &["x", "y", "color", "label"])?;
                let points = self.points(args)?;
                self.series.push(if method == "scatter" {
                    Series::Scatter(points)
                } else {
                    Series::Line(points)
                });
            }
            "pie" => {
                args.check(2, &["values", "labels", "colors"])?;
                let (labels, values) = match (args.positional(), args.named("labels")) {
                    ([Value::Table(t)], None) => table_pairs(t, "pie")?,
                    _ => {
                        let values = numbers(args.required(0, "values")?, "pie values")?;
                        let labels = match args.get(1, "labels") {
                            Some(l) => texts(l)?,
                            None => (1..=values.len()).map(|i| i.to_string()).collect(),
                        };
                        (labels, values)
                    }
                };
                same_length(method, labels.len(), values.len())?;
                if values.iter().any(|v| *v < 0.0) {
                    return Err(ScriptError::runtime("pie() values must not be negative"));
                }
                let colors = match args.named("colors") {
                    Some(c) => colors_arg(c, values.len())?,
                    None => (0..values.len())
                        .map(|i| PALETTE[i % PALETTE.len()].to_string())
                        .collect(),
                };
                self.series.push(Series::Pie(Slices {
                    labels,
                    values,
                    colors,
                }));
            }
            "title" | "xlabel" | "ylabel" => {
                args.check(1, &[])?;
                let text = args.required(0, "text")?.to_string();
                match method {
                    "title" => self.title = Some(text),
                    "xlabel" => self.xlabel = Some(text),
                    _ => self.ylabel = Some(text),
                }
            }
            "text" => {
                args.check(3, &[])?;
                let annotation = match args.positional() {
                    [text] => Annotation {
                        text: text.to_string(),
                        at: None,
                    },
                    [x, y, text] => Annotation {
                        text: text.to_string(),
                        at: Some((x.expect_number("text() x")?, y.expect_number("text() y")?)),
                    },
                    _ => return Err(ScriptError::runtime("text() expects (text) or (x, y, text)")),
                };
                self.annotations.push(annotation);
            }
            "legend" => {
                args.check(0, &[])?;
                self.legend = true;
            }
            "show" | "tight_layout" => {}
            other => return Err(ScriptError::runtime(format!("plot has no method '{other}'"))),
        }
        Ok(())
    }

    fn bar_series_count(&self) -> usize {
        self.series
            .iter()
            .filter(|s| matches!(s, Series::Bars(_)))
            .count()
    }

    fn next_color(&self) -> String {
        PALETTE[self.series.len() % PALETTE.len()].to_string()
    }

    fn points(&self, args: &Args) -> ScriptResult<Points> {
        let (x, y) = match (args.get(0, "x"), args.get(1, "y")) {
            (Some(x), Some(y)) => (Some(x), y),
            (Some(y), None) if args.named("x").is_none() => (None, y),
            _ => return Err(ScriptError::runtime(format!("{}() missing argument 'y'", args.callee()))),
        };
        let y = numbers(y, "y values")?;
        let (x, categories) = match x {
            None => ((0..y.len()).map(|i| i as f64).collect(), None),
            Some(x) => {
                let items = x.expect_items("x values")?;
                if items.iter().all(|v| v.as_number().is_some()) {
                    (numbers(x, "x values")?, None)
                } else {
                    (
                        (0..items.len()).map(|i| i as f64).collect(),
                        Some(items.iter().map(Value::to_string).collect()),
                    )
                }
            }
        };
        same_length(args.callee(), x.len(), y.len())?;
        let color = match args.named("color") {
            Some(c) => parse_color(c.expect_str("color")?)?,
            None => self.next_color(),
        };
        Ok(Points {
            x,
            y,
            categories,
            color,
            label: optional_text(args.named("label")),
        })
    }
}

fn inches_to_px(value: Option<&Value>, current: u32) -> ScriptResult<u32> {
    match value {
        None | Some(Value::None) => Ok(current),
        Some(v) => {
            let inches = v.expect_number("figure size")?;
            if !inches.is_finite() || inches <= 0.0 {
                return Err(ScriptError::runtime("figure size must be positive"));
            }
            let px = (inches * PX_PER_INCH).round();
            Ok(px.clamp(MIN_SIDE_PX as f64, MAX_SIDE_PX as f64) as u32)
        }
    }
}

fn label_value_pairs(args: &Args, method: &str) -> ScriptResult<(Vec<String>, Vec<f64>)> {
    if let [Value::Table(t)] = args.positional() {
        return table_pairs(t, method);
    }
    let labels = args
        .get(0, "x")
        .or_else(|| args.named("y"))
        .ok_or_else(|| ScriptError::runtime(format!("{method}() missing argument 'x'")))?;
    let values = args
        .positional()
        .get(1)
        .or_else(|| args.named("height"))
        .or_else(|| args.named("width"))
        .ok_or_else(|| ScriptError::runtime(format!("{method}() missing argument 'height'")))?;
    let labels = texts(labels)?;
    let values = numbers(values, &format!("{method}() values"))?;
    same_length(method, labels.len(), values.len())?;
    Ok((labels, values))
}

/// First column as labels, second as values.
fn table_pairs(table: &Rc<Dataset>, method: &str) -> ScriptResult<(Vec<String>, Vec<f64>)> {
    if table.columns.len() < 2 {
        return Err(ScriptError::runtime(format!(
            "{method}() needs a table with a label column and a value column"
        )));
    }
    let mut labels = Vec::with_capacity(table.len());
    let mut values = Vec::with_capacity(table.len());
    for row in &table.rows {
        let label = row.first().map(Value::from_cell).unwrap_or(Value::None);
        let value = row.get(1).map(Value::from_cell).unwrap_or(Value::None);
        labels.push(label.to_string());
        values.push(value.expect_number(&format!("{method}() value"))?);
    }
    Ok((labels, values))
}

fn numbers(value: &Value, what: &str) -> ScriptResult<Vec<f64>> {
    value
        .expect_items(what)?
        .iter()
        .map(|v| match v {
            Value::None => Err(ScriptError::runtime(format!("{what} contain a missing value"))),
            other => other.expect_number(what),
        })
        .collect()
}

fn texts(value: &Value) -> ScriptResult<Vec<String>> {
    Ok(value
        .expect_items("labels")?
        .iter()
        .map(Value::to_string)
        .collect())
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::None) => None,
        Some(v) => Some(v.to_string()),
    }
}

fn same_length(method: &str, labels: usize, values: usize) -> ScriptResult<()> {
    if labels != values {
        return Err(ScriptError::runtime(format!(
            "{method}() got {labels} labels but {values} values"
        )));
    }
    Ok(())
}

fn colors_arg(value: &Value, count: usize) -> ScriptResult<Vec<String>> {
    match value {
        Value::Str(s) => Ok(vec![parse_color(s)?; count]),
        other => {
            let items = other.expect_items("color")?;
            if items.is_empty() {
                return Err(ScriptError::runtime("color list must not be empty"));
            }
            let parsed = items
                .iter()
                .map(|c| parse_color(c.expect_str("color")?))
                .collect::<ScriptResult<Vec<_>>>()?;
            Ok((0..count).map(|i| parsed[i % parsed.len()].clone()).collect())
        }
    }
}

/// Accept `#rgb`, `#rrggbb` or a plain color name.
pub fn parse_color(raw: &str) -> ScriptResult<String> {
    let color = raw.trim();
    let valid = match color.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => !color.is_empty() && color.len() <= 20 && color.chars().all(|c| c.is_ascii_alphabetic()),
    };
    if valid {
        Ok(color.to_ascii_lowercase())
    } else {
        Err(ScriptError::runtime(format!("invalid color '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(values: &[&str]) -> Value {
        Value::list(values.iter().map(|s| Value::Str(s.to_string())).collect())
    }

    fn nums(values: &[f64]) -> Value {
        Value::list(values.iter().map(|&f| Value::Float(f)).collect())
    }

    #[test]
    fn test_bar_gets_distinct_colors_per_category() {
        let mut fig = Figure::new(960, 540);
        let args = Args::new("bar", vec![strs(&["A", "B", "C"]), nums(&[1.0, 2.0, 3.0])], vec![]);
        fig.apply("bar", &args).unwrap();

        let Series::Bars(bars) = &fig.series[0] else {
            panic!("expected bars");
        };
        assert_eq!(bars.colors, vec![PALETTE[0], PALETTE[1], PALETTE[2]]);
    }

    #[test]
    fn test_bar_length_mismatch() {
        let mut fig = Figure::new(960, 540);
        let args = Args::new("bar", vec![strs(&["A", "B"]), nums(&[1.0])], vec![]);
        let err = fig.apply("bar", &args).unwrap_err();
        assert_eq!(err.to_string(), "bar() got 2 labels but 1 values");
    }

    #[test]
    fn test_figure_size_in_inches() {
        let mut fig = Figure::new(960, 540);
        let args = Args::new(
            "figure",
            vec![],
            vec![("width".into(), Value::Int(12)), ("height".into(), Value::Int(6))],
        );
        fig.apply("figure", &args).unwrap();
        assert_eq!((fig.width, fig.height), (960, 480));
        assert!(!fig.has_content());
    }

    #[test]
    fn test_line_with_text_x_uses_categories() {
        let mut fig = Figure::new(960, 540);
        let args = Args::new("line", vec![strs(&["jan", "fev"]), nums(&[3.0, 4.0])], vec![]);
        fig.apply("line", &args).unwrap();
        let Series::Line(points) = &fig.series[0] else {
            panic!("expected line");
        };
        assert_eq!(points.x, vec![0.0, 1.0]);
        assert_eq!(points.categories.as_deref(), Some(&["jan".to_string(), "fev".to_string()][..]));
    }

    #[test]
    fn test_missing_value_rejected() {
        let mut fig = Figure::new(960, 540);
        let values = Value::list(vec![Value::Int(1), Value::None]);
        let args = Args::new("bar", vec![strs(&["A", "B"]), values], vec![]);
        assert!(fig.apply("bar", &args).is_err());
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#FF0000").unwrap(), "#ff0000");
        assert_eq!(parse_color("steelblue").unwrap(), "steelblue");
        assert!(parse_color("red\"/><script").is_err());
    }

    #[test]
    fn test_unknown_plot_method() {
        let mut fig = Figure::new(960, 540);
        assert!(fig.apply("savefig", &Args::none("savefig")).is_err());
    }
}
