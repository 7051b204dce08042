//! Server-rendered line chart of per-frame parameters.
//!
//! The SVG carries its plot geometry in `data-*` attributes so the page
//! script can move the current-frame marker and map clicks back to frames.

use std::fmt::Write;

use crate::models::VideoParams;
use crate::web::templates::escape;

pub const PALETTE: [&str; 5] = [
    "rgb(75, 192, 192)",
    "rgb(255, 99, 132)",
    "rgb(54, 162, 235)",
    "rgb(255, 206, 86)",
    "rgb(153, 102, 255)",
];

pub const EMPTY_SELECTION: &str = "Select parameters to view graph.";

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 340.0;
const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 16.0;
const MARGIN_BOTTOM: f64 = 84.0;
const Y_TICKS: usize = 5;

/// `ro` and `lo` when the video has them, otherwise its first column.
pub fn default_selection(columns: &[String]) -> Vec<String> {
    let preferred: Vec<String> = ["ro", "lo"]
        .iter()
        .filter(|name| columns.iter().any(|c| c == *name))
        .map(|name| name.to_string())
        .collect();
    if !preferred.is_empty() {
        return preferred;
    }
    columns.first().cloned().into_iter().collect()
}

/// Parse a comma-separated `params` query value. Absent means the default
/// selection; unknown names and duplicates are dropped.
pub fn parse_selection(raw: Option<&str>, columns: &[String]) -> Vec<String> {
    let Some(raw) = raw else {
        return default_selection(columns);
    };
    let mut selected: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if columns.iter().any(|c| c == name) && !selected.iter().any(|s| s == name) {
            selected.push(name.to_string());
        }
    }
    selected
}

/// Tick spacing on the frame axis.
pub fn tick_step(total_frames: usize) -> usize {
    total_frames.div_ceil(10).max(1)
}

struct Plot {
    frames: usize,
    y_min: f64,
    y_max: f64,
}

impl Plot {
    fn width() -> f64 {
        WIDTH - MARGIN_LEFT - MARGIN_RIGHT
    }

    fn height() -> f64 {
        HEIGHT - MARGIN_TOP - MARGIN_BOTTOM
    }

    fn x(&self, frame: usize) -> f64 {
        if self.frames <= 1 {
            return MARGIN_LEFT;
        }
        MARGIN_LEFT + frame as f64 / (self.frames - 1) as f64 * Self::width()
    }

    fn y(&self, value: f64) -> f64 {
        MARGIN_TOP + (self.y_max - value) / (self.y_max - self.y_min) * Self::height()
    }
}

fn value_range<'a>(series: impl Iterator<Item = &'a [f64]>) -> (f64, f64) {
    let (min, max) = series
        .flat_map(|s| s.iter().copied())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    (min, max)
}

/// Render the chart for `selected` series. `current` marks the frame on screen.
pub fn render_chart(
    params: &VideoParams,
    selected: &[String],
    total_frames: usize,
    current: usize,
) -> String {
    if selected.is_empty() {
        return format!(r#"<p class="chart-empty">{}</p>"#, EMPTY_SELECTION);
    }

    let frames = if total_frames > 0 {
        total_frames
    } else {
        selected
            .iter()
            .map(|name| params.series(name).len())
            .max()
            .unwrap_or(0)
    };
    let (y_min, y_max) = value_range(
        selected
            .iter()
            .map(|name| &params.series(name)[..params.series(name).len().min(frames)]),
    );
    let plot = Plot { frames, y_min, y_max };
    let bottom = MARGIN_TOP + Plot::height();
    let right = MARGIN_LEFT + Plot::width();

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg class="param-chart" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg" data-plot-left="{l}" data-plot-width="{pw}" data-frames="{f}">"#,
        w = WIDTH,
        h = HEIGHT,
        l = MARGIN_LEFT,
        pw = Plot::width(),
        f = frames,
    );

    // axes
    let _ = write!(
        svg,
        r##"<g stroke="#9ca3af" stroke-width="1"><line x1="{l}" y1="{b}" x2="{r}" y2="{b}"/><line x1="{l}" y1="{t}" x2="{l}" y2="{b}"/></g>"##,
        l = MARGIN_LEFT,
        r = right,
        t = MARGIN_TOP,
        b = bottom,
    );

    svg.push_str(r##"<g font-size="11" fill="#4b5563">"##);
    let step = tick_step(frames);
    for frame in (0..frames).step_by(step) {
        let x = plot.x(frame);
        let _ = write!(
            svg,
            r#"<text x="{x:.1}" y="{y:.1}" text-anchor="middle">{frame}</text>"#,
            y = bottom + 14.0,
        );
    }
    for i in 0..Y_TICKS {
        let value = y_min + (y_max - y_min) * i as f64 / (Y_TICKS - 1) as f64;
        let _ = write!(
            svg,
            r#"<text x="{x:.1}" y="{y:.1}" text-anchor="end" dominant-baseline="middle">{value:.2}</text>"#,
            x = MARGIN_LEFT - 6.0,
            y = plot.y(value),
        );
    }
    svg.push_str("</g>");

    let _ = write!(
        svg,
        r##"<text x="{x:.1}" y="{y:.1}" text-anchor="middle" font-size="12" fill="#111827">Frame Number</text>"##,
        x = MARGIN_LEFT + Plot::width() / 2.0,
        y = bottom + 32.0,
    );
    let _ = write!(
        svg,
        r##"<text transform="translate(14 {y:.1}) rotate(-90)" text-anchor="middle" font-size="12" fill="#111827">Value</text>"##,
        y = MARGIN_TOP + Plot::height() / 2.0,
    );

    for (index, name) in selected.iter().enumerate() {
        let colour = PALETTE[index % PALETTE.len()];
        let mut points = String::new();
        for (frame, value) in params.series(name).iter().take(frames).enumerate() {
            if value.is_finite() {
                let _ = write!(points, "{:.1},{:.1} ", plot.x(frame), plot.y(*value));
            }
        }
        let _ = write!(
            svg,
            r#"<polyline fill="none" stroke="{colour}" stroke-width="2" points="{}"/>"#,
            points.trim_end(),
        );
    }

    // legend
    let mut x = MARGIN_LEFT;
    let y = HEIGHT - 18.0;
    for (index, name) in selected.iter().enumerate() {
        let colour = PALETTE[index % PALETTE.len()];
        let _ = write!(
            svg,
            r##"<rect x="{x:.1}" y="{ry:.1}" width="24" height="8" fill="{colour}"/><text x="{tx:.1}" y="{y:.1}" font-size="12" fill="#374151" dominant-baseline="middle">{label}</text>"##,
            ry = y - 4.0,
            tx = x + 30.0,
            label = escape(name),
        );
        x += 42.0 + name.chars().count() as f64 * 7.0;
    }

    if current < frames {
        let cx = plot.x(current);
        let _ = write!(
            svg,
            r#"<line id="current-frame-line" x1="{cx:.1}" y1="{t}" x2="{cx:.1}" y2="{b}" stroke="rgba(255, 0, 0, 0.7)" stroke-width="2" stroke-dasharray="6 6"/>"#,
            t = MARGIN_TOP,
            b = bottom,
        );
    }

    svg.push_str("</svg>");
    svg
}
