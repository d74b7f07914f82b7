//! SVG rendering of a [`Figure`]

use crate::figure::{Annotation, Bars, Figure, Points, Series, Slices};

const MARGIN_LEFT: f64 = 72.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 20.0;
const TITLE_HEIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 72.0;
const LEGEND_WIDTH: f64 = 160.0;
const AXIS_COLOR: &str = "#333333";
const GRID_COLOR: &str = "#e5e5e5";
const MAX_LABEL_CHARS: usize = 24;

/// Render a figure as a standalone SVG document.
pub fn render_svg(figure: &Figure) -> String {
    let width = f64::from(figure.width);
    let height = f64::from(figure.height);
    let mut svg = Svg::new(figure.width, figure.height);

    let legend = legend_entries(figure);
    let legend_width = if figure.legend && !legend.is_empty() && width > 2.5 * LEGEND_WIDTH {
        LEGEND_WIDTH
    } else {
        0.0
    };
    let top = MARGIN_TOP + if figure.title.is_some() { TITLE_HEIGHT } else { 0.0 };
    let left = MARGIN_LEFT.min(width / 4.0);
    let area = Area {
        left,
        top,
        right: (width - MARGIN_RIGHT - legend_width).max(left + 10.0),
        bottom: (height - MARGIN_BOTTOM).max(top + 10.0),
    };

    if let Some(title) = &figure.title {
        svg.text(width / 2.0, MARGIN_TOP + 20.0, title, "middle", 18.0, "font-weight=\"bold\"");
    }

    let pie = figure.series.iter().find_map(|s| match s {
        Series::Pie(slices) => Some(slices),
        _ => None,
    });
    let scale = match pie {
        Some(slices) => {
            draw_pie(&mut svg, slices, &area);
            None
        }
        None if figure.series.is_empty() => None,
        None => Some(draw_cartesian(&mut svg, figure, &area)),
    };

    if let Some(xlabel) = &figure.xlabel {
        svg.text(
            (area.left + area.right) / 2.0,
            height - 14.0,
            xlabel,
            "middle",
            13.0,
            "",
        );
    }
    if let Some(ylabel) = &figure.ylabel {
        let cy = (area.top + area.bottom) / 2.0;
        svg.text(
            16.0,
            cy,
            ylabel,
            "middle",
            13.0,
            &format!("transform=\"rotate(-90 16 {cy:.1})\""),
        );
    }

    draw_annotations(&mut svg, &figure.annotations, scale.as_ref(), &area);

    if legend_width > 0.0 {
        draw_legend(&mut svg, &legend, area.right + 16.0, area.top);
    }

    svg.finish()
}

// ============================================================================
// LAYOUT
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Area {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl Area {
    fn width(&self) -> f64 {
        self.right - self.left
    }

    fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Maps (category coordinate, value) to pixels. The category axis is
/// horizontal unless the figure holds horizontal bars.
#[derive(Debug, Clone)]
struct Scale {
    area: Area,
    horizontal: bool,
    bands: Option<usize>,
    category_domain: (f64, f64),
    value_domain: (f64, f64),
}

impl Scale {
    fn category_px(&self, c: f64) -> f64 {
        let (start, len) = if self.horizontal {
            (self.area.top, self.area.height())
        } else {
            (self.area.left, self.area.width())
        };
        match self.bands {
            Some(n) => start + (c + 0.5) * len / n.max(1) as f64,
            None => start + fraction(c, self.category_domain) * len,
        }
    }

    fn value_px(&self, v: f64) -> f64 {
        let t = fraction(v, self.value_domain);
        if self.horizontal {
            self.area.left + t * self.area.width()
        } else {
            self.area.bottom - t * self.area.height()
        }
    }

    fn point(&self, c: f64, v: f64) -> (f64, f64) {
        if self.horizontal {
            (self.value_px(v), self.category_px(c))
        } else {
            (self.category_px(c), self.value_px(v))
        }
    }

    fn band_width(&self) -> f64 {
        let len = if self.horizontal {
            self.area.height()
        } else {
            self.area.width()
        };
        len / self.bands.unwrap_or(1).max(1) as f64
    }
}

fn fraction(v: f64, (min, max): (f64, f64)) -> f64 {
    if max > min {
        (v - min) / (max - min)
    } else {
        0.5
    }
}

// ============================================================================
// CARTESIAN PLOTS
// ============================================================================

fn draw_cartesian(svg: &mut Svg, figure: &Figure, area: &Area) -> Scale {
    let bars: Vec<&Bars> = figure
        .series
        .iter()
        .filter_map(|s| match s {
            Series::Bars(b) => Some(b),
            _ => None,
        })
        .collect();
    let points: Vec<&Points> = figure
        .series
        .iter()
        .filter_map(|s| match s {
            Series::Line(p) | Series::Scatter(p) => Some(p),
            _ => None,
        })
        .collect();

    let horizontal = bars.first().is_some_and(|b| b.horizontal);

    let mut categories: Vec<String> = Vec::new();
    for b in &bars {
        for label in &b.labels {
            if !categories.contains(label) {
                categories.push(label.clone());
            }
        }
    }
    if categories.is_empty() {
        if let Some(cats) = points.iter().find_map(|p| p.categories.as_ref()) {
            categories = cats.clone();
        }
    }
    let bands = (!categories.is_empty()).then_some(categories.len());

    let mut values: Vec<f64> = Vec::new();
    if !bars.is_empty() {
        values.push(0.0);
    }
    values.extend(bars.iter().flat_map(|b| b.values.iter().copied()));
    values.extend(points.iter().flat_map(|p| p.y.iter().copied()));
    let value_ticks = nice_ticks(&values);
    let value_domain = domain(&value_ticks);

    let xs: Vec<f64> = points.iter().flat_map(|p| p.x.iter().copied()).collect();
    let category_ticks = if bands.is_none() {
        nice_ticks(&xs)
    } else {
        Vec::new()
    };
    let category_domain = domain(&category_ticks);

    let scale = Scale {
        area: *area,
        horizontal,
        bands,
        category_domain,
        value_domain,
    };

    draw_value_axis(svg, &scale, &value_ticks);
    match bands {
        Some(_) => draw_band_axis(svg, &scale, &categories),
        None => draw_numeric_category_axis(svg, &scale, &category_ticks),
    }

    let bar_count = bars.len().max(1) as f64;
    let inner = scale.band_width() * 0.8;
    let thickness = inner / bar_count;
    for (k, b) in bars.iter().enumerate() {
        for (i, (label, value)) in b.labels.iter().zip(&b.values).enumerate() {
            if !value.is_finite() {
                continue;
            }
            let c = categories.iter().position(|x| x == label).unwrap_or(i) as f64;
            let offset = scale.category_px(c) - inner / 2.0 + k as f64 * thickness;
            let base = scale.value_px(0.0);
            let tip = scale.value_px(*value);
            let color = b.colors.get(i).map(String::as_str).unwrap_or(AXIS_COLOR);
            if horizontal {
                svg.rect(base.min(tip), offset, (tip - base).abs(), thickness, color);
            } else {
                svg.rect(offset, base.min(tip), thickness, (tip - base).abs(), color);
            }
        }
    }

    for series in &figure.series {
        match series {
            Series::Line(p) => {
                let coords: Vec<String> = p
                    .x
                    .iter()
                    .zip(&p.y)
                    .filter(|(x, y)| x.is_finite() && y.is_finite())
                    .map(|(x, y)| {
                        let (px, py) = scale.point(*x, *y);
                        format!("{px:.1},{py:.1}")
                    })
                    .collect();
                svg.push(format!(
                    "<polyline points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\"/>",
                    coords.join(" "),
                    p.color
                ));
            }
            Series::Scatter(p) => {
                for (x, y) in p.x.iter().zip(&p.y) {
                    if !(x.is_finite() && y.is_finite()) {
                        continue;
                    }
                    let (px, py) = scale.point(*x, *y);
                    svg.push(format!(
                        "<circle cx=\"{px:.1}\" cy=\"{py:.1}\" r=\"3.5\" fill=\"{}\"/>",
                        p.color
                    ));
                }
            }
            _ => {}
        }
    }

    scale
}

fn draw_value_axis(svg: &mut Svg, scale: &Scale, ticks: &[f64]) {
    let area = scale.area;
    let step = tick_step(ticks);
    for &t in ticks {
        let p = scale.value_px(t);
        let label = format_tick(t, step);
        if scale.horizontal {
            svg.line(p, area.top, p, area.bottom, GRID_COLOR);
            svg.text(p, area.bottom + 18.0, &label, "middle", 11.0, "");
        } else {
            svg.line(area.left, p, area.right, p, GRID_COLOR);
            svg.text(area.left - 8.0, p + 4.0, &label, "end", 11.0, "");
        }
    }
    svg.line(area.left, area.bottom, area.right, area.bottom, AXIS_COLOR);
    svg.line(area.left, area.top, area.left, area.bottom, AXIS_COLOR);
}

fn draw_band_axis(svg: &mut Svg, scale: &Scale, categories: &[String]) {
    let area = scale.area;
    let rotate = !scale.horizontal
        && (categories.len() > 6 || categories.iter().any(|c| c.chars().count() > 10));
    for (i, category) in categories.iter().enumerate() {
        let p = scale.category_px(i as f64);
        let label = truncate(category);
        if scale.horizontal {
            svg.text(area.left - 8.0, p + 4.0, &label, "end", 11.0, "");
        } else if rotate {
            let y = area.bottom + 16.0;
            svg.text(
                p,
                y,
                &label,
                "end",
                11.0,
                &format!("transform=\"rotate(-35 {p:.1} {y:.1})\""),
            );
        } else {
            svg.text(p, area.bottom + 18.0, &label, "middle", 11.0, "");
        }
    }
}

fn draw_numeric_category_axis(svg: &mut Svg, scale: &Scale, ticks: &[f64]) {
    let area = scale.area;
    let step = tick_step(ticks);
    for &t in ticks {
        let p = scale.category_px(t);
        svg.line(p, area.bottom, p, area.bottom + 4.0, AXIS_COLOR);
        svg.text(p, area.bottom + 18.0, &format_tick(t, step), "middle", 11.0, "");
    }
}

// ============================================================================
// PIE
// ============================================================================

fn draw_pie(svg: &mut Svg, slices: &Slices, area: &Area) {
    let total: f64 = slices.values.iter().filter(|v| v.is_finite()).sum();
    if total <= 0.0 {
        return;
    }
    let cx = (area.left + area.right) / 2.0;
    let cy = (area.top + area.bottom) / 2.0;
    let r = area.width().min(area.height()) / 2.0 * 0.75;

    let mut angle = -std::f64::consts::FRAC_PI_2;
    for (i, value) in slices.values.iter().enumerate() {
        if !value.is_finite() || *value <= 0.0 {
            continue;
        }
        let share = value / total;
        let sweep = share * std::f64::consts::TAU;
        let color = slices.colors.get(i).map(String::as_str).unwrap_or(AXIS_COLOR);

        if share >= 0.9999 {
            svg.push(format!(
                "<circle cx=\"{cx:.1}\" cy=\"{cy:.1}\" r=\"{r:.1}\" fill=\"{color}\" stroke=\"white\"/>"
            ));
        } else {
            let (x1, y1) = (cx + r * angle.cos(), cy + r * angle.sin());
            let end = angle + sweep;
            let (x2, y2) = (cx + r * end.cos(), cy + r * end.sin());
            let large = if sweep > std::f64::consts::PI { 1 } else { 0 };
            svg.push(format!(
                "<path d=\"M {cx:.1} {cy:.1} L {x1:.1} {y1:.1} A {r:.1} {r:.1} 0 {large} 1 {x2:.1} {y2:.1} Z\" fill=\"{color}\" stroke=\"white\"/>"
            ));
        }

        let mid = angle + sweep / 2.0;
        let (lx, ly) = (cx + r * 1.12 * mid.cos(), cy + r * 1.12 * mid.sin());
        let anchor = if mid.cos() >= 0.0 { "start" } else { "end" };
        let label = slices.labels.get(i).map(|l| truncate(l)).unwrap_or_default();
        svg.text(
            lx,
            ly + 4.0,
            &format!("{label} ({:.1} %)", share * 100.0),
            anchor,
            11.0,
            "",
        );
        angle += sweep;
    }
}

// ============================================================================
// ANNOTATIONS AND LEGEND
// ============================================================================

fn draw_annotations(svg: &mut Svg, annotations: &[Annotation], scale: Option<&Scale>, area: &Area) {
    let (positioned, floating): (Vec<&Annotation>, Vec<&Annotation>) = annotations
        .iter()
        .partition(|a| a.at.is_some() && scale.is_some());

    if let Some(scale) = scale {
        for annotation in positioned {
            if let Some((x, y)) = annotation.at {
                let (px, py) = scale.point(x, y);
                svg.text(px, py, &annotation.text, "middle", 12.0, "");
            }
        }
    }

    let cx = (area.left + area.right) / 2.0;
    let cy = (area.top + area.bottom) / 2.0;
    let n = floating.len() as f64;
    for (i, annotation) in floating.iter().enumerate() {
        let y = cy + (i as f64 - (n - 1.0) / 2.0) * 24.0;
        svg.text(cx, y, &annotation.text, "middle", 16.0, "");
    }
}

fn legend_entries(figure: &Figure) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for series in &figure.series {
        match series {
            Series::Bars(b) => {
                if let (Some(label), Some(color)) = (&b.label, b.colors.first()) {
                    entries.push((label.clone(), color.clone()));
                }
            }
            Series::Line(p) | Series::Scatter(p) => {
                if let Some(label) = &p.label {
                    entries.push((label.clone(), p.color.clone()));
                }
            }
            Series::Pie(s) => {
                entries.extend(s.labels.iter().cloned().zip(s.colors.iter().cloned()));
            }
        }
    }
    entries
}

fn draw_legend(svg: &mut Svg, entries: &[(String, String)], x: f64, y: f64) {
    for (i, (label, color)) in entries.iter().enumerate() {
        let row = y + i as f64 * 20.0;
        svg.rect(x, row, 12.0, 12.0, color);
        svg.text(x + 18.0, row + 10.0, &truncate(label), "start", 11.0, "");
    }
}

// ============================================================================
// TICKS
// ============================================================================

/// Evenly spaced round tick values covering `values`.
fn nice_ticks(values: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (mut min, mut max) = match (
        finite.iter().copied().reduce(f64::min),
        finite.iter().copied().reduce(f64::max),
    ) {
        (Some(min), Some(max)) => (min, max),
        _ => (0.0, 1.0),
    };
    if max - min < f64::EPSILON {
        let pad = if min == 0.0 { 1.0 } else { min.abs() * 0.5 };
        min -= pad;
        max += pad;
    }

    let step = nice_step((max - min) / 5.0);
    let start = (min / step).floor() * step;
    let end = (max / step).ceil() * step;
    let count = ((end - start) / step).round().clamp(1.0, 20.0) as usize;
    (0..=count).map(|i| start + i as f64 * step).collect()
}

fn nice_step(raw: f64) -> f64 {
    let exponent = raw.log10().floor();
    let base = 10f64.powf(exponent);
    let nice = match raw / base {
        f if f <= 1.0 => 1.0,
        f if f <= 2.0 => 2.0,
        f if f <= 5.0 => 5.0,
        _ => 10.0,
    };
    nice * base
}

fn domain(ticks: &[f64]) -> (f64, f64) {
    match (ticks.first(), ticks.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => (0.0, 1.0),
    }
}

fn tick_step(ticks: &[f64]) -> f64 {
    match ticks {
        [a, b, ..] => b - a,
        _ => 1.0,
    }
}

fn format_tick(value: f64, step: f64) -> String {
    let value = if value.abs() < step * 1e-9 { 0.0 } else { value };
    if step >= 1.0 && value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        let decimals = (-step.log10().floor()).clamp(0.0, 6.0) as usize;
        format!("{value:.decimals$}")
    }
}

fn truncate(label: &str) -> String {
    if label.chars().count() > MAX_LABEL_CHARS {
        let mut cut: String = label.chars().take(MAX_LABEL_CHARS - 1).collect();
        cut.push('…');
        cut
    } else {
        label.to_string()
    }
}

// ============================================================================
// SVG WRITER
// ============================================================================

struct Svg {
    out: String,
}

impl Svg {
    fn new(width: u32, height: u32) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\" font-family=\"DejaVu Sans, Arial, sans-serif\">\n"
        ));
        out.push_str("<rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
        Self { out }
    }

    fn push(&mut self, element: String) {
        self.out.push_str(&element);
        self.out.push('\n');
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: &str) {
        self.push(format!(
            "<line x1=\"{x1:.1}\" y1=\"{y1:.1}\" x2=\"{x2:.1}\" y2=\"{y2:.1}\" stroke=\"{color}\"/>"
        ));
    }

    fn rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: &str) {
        self.push(format!(
            "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{width:.1}\" height=\"{height:.1}\" fill=\"{color}\"/>"
        ));
    }

    fn text(&mut self, x: f64, y: f64, content: &str, anchor: &str, size: f64, extra: &str) {
        let extra = if extra.is_empty() {
            String::new()
        } else {
            format!(" {extra}")
        };
        self.push(format!(
            "<text x=\"{x:.1}\" y=\"{y:.1}\" text-anchor=\"{anchor}\" font-size=\"{size}\"{extra}>{}</text>",
            escape(content)
        ));
    }

    fn finish(mut self) -> String {
        self.out.push_str("</svg>\n");
        self.out
    }
}

/// Escape text for XML character data and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() && c != '\n' && c != '\t' => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::figure::PALETTE;

    fn bar_figure() -> Figure {
        let mut figure = Figure::new(960, 540);
        figure.title = Some("Contacts par secteur".into());
        figure.series.push(Series::Bars(Bars {
            labels: vec!["Industrie".into(), "Finance".into()],
            values: vec![2.0, 1.0],
            colors: vec![PALETTE[0].into(), PALETTE[1].into()],
            horizontal: false,
            label: None,
        }));
        figure
    }

    #[test]
    fn test_bar_chart_markup() {
        let svg = render_svg(&bar_figure());
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("Contacts par secteur"));
        assert!(svg.contains(PALETTE[0]) && svg.contains(PALETTE[1]));
        assert!(svg.contains(">Industrie</text>"));
    }

    #[test]
    fn test_text_is_escaped() {
        let figure = Figure::message(400, 300, "a < b & \"c\"");
        let svg = render_svg(&figure);
        assert!(svg.contains("a &lt; b &amp; &quot;c&quot;"));
    }

    #[test]
    fn test_pie_single_slice_is_circle() {
        let mut figure = Figure::new(400, 400);
        figure.series.push(Series::Pie(Slices {
            labels: vec!["Tout".into()],
            values: vec![3.0],
            colors: vec![PALETTE[0].into()],
        }));
        let svg = render_svg(&figure);
        assert!(svg.contains("<circle"));
        assert!(svg.contains("Tout (100.0 %)"));
    }

    #[test]
    fn test_nice_ticks_cover_range() {
        let ticks = nice_ticks(&[0.0, 7.3]);
        assert_eq!(ticks.first().copied(), Some(0.0));
        assert!(ticks.last().copied().unwrap_or_default() >= 7.3);
        assert!(!nice_ticks(&[]).is_empty());
    }

    #[test]
    fn test_format_tick() {
        assert_eq!(format_tick(2.0, 1.0), "2");
        assert_eq!(format_tick(0.5, 0.5), "0.5");
        assert_eq!(format_tick(-0.0000000001, 0.2), "0.0");
    }
}
