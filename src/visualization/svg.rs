use std::fmt::Write;

use super::ChartType;

const WIDTH: f64 = 1000.0;
const HEIGHT: f64 = 600.0;
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 160.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 110.0;
const Y_TICKS: usize = 5;
const MAX_X_TICKS: usize = 20;
const FONT: &str = "font-family=\"sans-serif\"";

/// A named series of `(x, y)` points.
#[derive(Debug, Clone)]
pub(crate) struct Series {
    pub label: String,
    pub color: &'static str,
    pub points: Vec<(f64, f64)>,
    /// Horizontal shift applied to every point, in x units.
    pub offset: f64,
}

impl Series {
    /// Points with a NaN or infinite y are not drawn.
    fn finite_points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().copied().filter(|(_, y)| y.is_finite())
    }
}

/// A 2D chart rendered to a standalone SVG document.
#[derive(Debug, Clone)]
pub(crate) struct SvgChart {
    pub title: Option<String>,
    pub x_label: String,
    pub y_label: String,
    /// Labelled positions along the x axis.
    pub x_ticks: Vec<(f64, String)>,
    pub rotate_x_ticks: bool,
    pub style: ChartType,
    /// Width of each bar in x units, only used by bar charts.
    pub bar_width: f64,
    pub series: Vec<Series>,
}

struct Frame {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Frame {
    fn px(&self, x: f64) -> f64 {
        let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        MARGIN_LEFT + (x - self.x_min) / (self.x_max - self.x_min) * plot_w
    }

    fn py(&self, y: f64) -> f64 {
        let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        MARGIN_TOP + (self.y_max - y) / (self.y_max - self.y_min) * plot_h
    }
}

impl SvgChart {
    pub(crate) fn render(&self) -> String {
        let frame = self.frame();
        let mut svg = String::new();

        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
        );
        let _ = write!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);

        self.render_grid(&mut svg, &frame);
        self.render_series(&mut svg, &frame);
        self.render_axes(&mut svg, &frame);
        self.render_legend(&mut svg);

        svg.push_str("</svg>\n");
        svg
    }

    fn frame(&self) -> Frame {
        let xs = self
            .x_ticks
            .iter()
            .map(|(x, _)| *x)
            .chain(self.series.iter().flat_map(|s| s.points.iter().map(move |(x, _)| x + s.offset)));
        let (x_min, x_max) = bounds(xs).unwrap_or((0.0, 1.0));

        let ys = self.series.iter().flat_map(|s| s.points.iter().map(|(_, y)| *y));
        let (mut y_min, mut y_max) = bounds(ys).unwrap_or((0.0, 1.0));
        if self.style == ChartType::Bar {
            y_min = y_min.min(0.0);
            y_max = y_max.max(0.0);
        }

        if y_max - y_min <= f64::EPSILON {
            y_min -= 1.0;
            y_max += 1.0;
        }

        let y_pad = (y_max - y_min) * 0.05;
        Frame {
            x_min: x_min - 0.5,
            x_max: x_max + 0.5,
            y_min: y_min - y_pad,
            y_max: y_max + y_pad,
        }
    }

    fn render_grid(&self, svg: &mut String, frame: &Frame) {
        let (left, right) = (MARGIN_LEFT, WIDTH - MARGIN_RIGHT);

        for i in 0..=Y_TICKS {
            let y = frame.y_min + (frame.y_max - frame.y_min) * i as f64 / Y_TICKS as f64;
            let py = frame.py(y);
            let _ = write!(
                svg,
                r##"<line x1="{left:.1}" y1="{py:.1}" x2="{right:.1}" y2="{py:.1}" stroke="#bbb" stroke-dasharray="4 4" stroke-opacity="0.6"/>"##
            );
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end" {FONT}>{}</text>"#,
                left - 6.0,
                py + 4.0,
                format_tick(y)
            );
        }
    }

    fn render_axes(&self, svg: &mut String, frame: &Frame) {
        let (left, right) = (MARGIN_LEFT, WIDTH - MARGIN_RIGHT);
        let (top, bottom) = (MARGIN_TOP, HEIGHT - MARGIN_BOTTOM);

        let _ = write!(
            svg,
            r#"<rect x="{left:.1}" y="{top:.1}" width="{:.1}" height="{:.1}" fill="none" stroke="black"/>"#,
            right - left,
            bottom - top
        );

        let step = self.x_ticks.len().div_ceil(MAX_X_TICKS).max(1);
        for (x, label) in self.x_ticks.iter().step_by(step) {
            let px = frame.px(*x);
            let _ = write!(
                svg,
                r#"<line x1="{px:.1}" y1="{bottom:.1}" x2="{px:.1}" y2="{:.1}" stroke="black"/>"#,
                bottom + 5.0
            );

            let ty = bottom + 18.0;
            if self.rotate_x_ticks {
                let _ = write!(
                    svg,
                    r#"<text x="{px:.1}" y="{ty:.1}" font-size="11" text-anchor="end" transform="rotate(-45 {px:.1} {ty:.1})" {FONT}>{}</text>"#,
                    escape(label)
                );
            } else {
                let _ = write!(
                    svg,
                    r#"<text x="{px:.1}" y="{ty:.1}" font-size="11" text-anchor="middle" {FONT}>{}</text>"#,
                    escape(label)
                );
            }
        }

        if let Some(title) = &self.title {
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" font-size="18" text-anchor="middle" {FONT}>{}</text>"#,
                (left + right) / 2.0,
                top - 18.0,
                escape(title)
            );
        }

        let _ = write!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" font-size="14" text-anchor="middle" {FONT}>{}</text>"#,
            (left + right) / 2.0,
            HEIGHT - 12.0,
            escape(&self.x_label)
        );

        let (lx, ly) = (22.0, (top + bottom) / 2.0);
        let _ = write!(
            svg,
            r#"<text x="{lx:.1}" y="{ly:.1}" font-size="14" text-anchor="middle" transform="rotate(-90 {lx:.1} {ly:.1})" {FONT}>{}</text>"#,
            escape(&self.y_label)
        );
    }

    fn render_series(&self, svg: &mut String, frame: &Frame) {
        for series in &self.series {
            match self.style {
                ChartType::Line => render_line(svg, frame, series),
                ChartType::Bar => render_bars(svg, frame, series, self.bar_width),
            }
        }
    }

    fn render_legend(&self, svg: &mut String) {
        let x = WIDTH - MARGIN_RIGHT + 15.0;
        for (i, series) in self.series.iter().enumerate() {
            let y = MARGIN_TOP + 10.0 + i as f64 * 20.0;
            let _ = write!(
                svg,
                r#"<rect x="{x:.1}" y="{:.1}" width="12" height="12" fill="{}"/>"#,
                y - 10.0,
                series.color
            );
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{y:.1}" font-size="12" {FONT}>{}</text>"#,
                x + 18.0,
                escape(&series.label)
            );
        }
    }
}

fn render_line(svg: &mut String, frame: &Frame, series: &Series) {
    let points: Vec<(f64, f64)> = series.finite_points().collect();
    if points.is_empty() {
        return;
    }

    let polyline = points
        .iter()
        .map(|(x, y)| format!("{:.1},{:.1}", frame.px(x + series.offset), frame.py(*y)))
        .collect::<Vec<_>>()
        .join(" ");

    let _ = write!(
        svg,
        r#"<polyline points="{polyline}" fill="none" stroke="{}" stroke-width="2"/>"#,
        series.color
    );

    for (x, y) in &points {
        let _ = write!(
            svg,
            r#"<circle cx="{:.1}" cy="{:.1}" r="3.5" fill="{}"/>"#,
            frame.px(x + series.offset),
            frame.py(*y),
            series.color
        );
    }
}

fn render_bars(svg: &mut String, frame: &Frame, series: &Series, bar_width: f64) {
    let base = frame.py(0.0_f64.clamp(frame.y_min, frame.y_max));
    for (x, y) in series.finite_points() {
        let center = x + series.offset;
        let left = frame.px(center - bar_width / 2.0);
        let right = frame.px(center + bar_width / 2.0);
        let top = frame.py(y);

        let _ = write!(
            svg,
            r#"<rect x="{left:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
            top.min(base),
            right - left,
            (base - top).abs(),
            series.color
        );
    }
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

fn format_tick(value: f64) -> String {
    let abs = value.abs();
    if abs != 0.0 && !(1e-3..1e4).contains(&abs) {
        format!("{value:.2e}")
    } else {
        let s = format!("{value:.4}");
        let s = s.trim_end_matches('0').trim_end_matches('.');
        if s == "-0" {
            "0".to_string()
        } else {
            s.to_string()
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
