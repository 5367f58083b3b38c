//! SVG learning curves
//!
//! One chart per tracked metric, written to the run's `training/` directory.
//! Both training phases are drawn on a shared epoch axis, with a dashed
//! vertical line where fine-tuning starts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::training::history::{History, Split};
use crate::utils::error::Result;
use crate::utils::metrics::Metric;

/// Chart styling constants
const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

const COLOR_TRAIN: &str = "#3498db";
const COLOR_VALIDATION: &str = "#e67e22";
const COLOR_MARKER: &str = "#7f8c8d";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

const GRID_LINES: usize = 5;

/// A data point for a line chart
#[derive(Debug, Clone, Copy)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

/// A data series for charts
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color: String,
}

/// Labelled vertical line across the plot area
#[derive(Debug, Clone)]
pub struct VerticalMarker {
    pub x: f64,
    pub label: String,
}

/// Write one `<metric>.svg` per tracked metric into `save_path`.
///
/// `history_ft` continues the epoch numbering of `history`; when it holds any
/// epochs, its first epoch is marked on every chart.
pub fn plot_learning_curves(
    history: &History,
    history_ft: &History,
    save_path: &Path,
) -> Result<Vec<PathBuf>> {
    let combined = history.concat(history_ft);
    let marker = history_ft.first_epoch().map(|epoch| VerticalMarker {
        x: (epoch + 1) as f64,
        label: "Start fine-tuning".to_string(),
    });

    let mut written = Vec::with_capacity(Metric::ALL.len());
    for metric in Metric::ALL {
        let series = vec![
            to_series(&combined, metric, Split::Train, "Training", COLOR_TRAIN),
            to_series(&combined, metric, Split::Validation, "Validation", COLOR_VALIDATION),
        ];

        let y_range = if metric.is_ratio() {
            (0.0, 1.0)
        } else {
            let (_, _, _, y_max) = find_ranges(&series);
            (0.0, if y_max.is_finite() && y_max > 0.0 { y_max * 1.1 } else { 1.0 })
        };

        let path = save_path.join(format!("{}.svg", metric.name()));
        generate_line_chart(
            &format!("Training and validation {}", metric.name()),
            "Epoch",
            metric.name(),
            &series,
            y_range,
            marker.as_ref(),
            &path,
        )?;
        tracing::debug!("Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}

fn to_series(history: &History, metric: Metric, split: Split, name: &str, color: &str) -> DataSeries {
    DataSeries {
        name: name.to_string(),
        points: history
            .series(metric, split)
            .into_iter()
            .map(|(epoch, y)| DataPoint {
                x: (epoch + 1) as f64,
                y,
            })
            .collect(),
        color: color.to_string(),
    }
}

/// Generate a line chart SVG
pub fn generate_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    (y_min, y_max): (f64, f64),
    marker: Option<&VerticalMarker>,
    output_path: &Path,
) -> std::io::Result<()> {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let (mut x_min, mut x_max, _, _) = find_ranges(series);
    if let Some(m) = marker {
        x_min = x_min.min(m.x);
        x_max = x_max.max(m.x);
    }
    if !x_min.is_finite() || !x_max.is_finite() {
        x_min = 0.0;
        x_max = 1.0;
    }
    // a single epoch still needs a non-empty axis
    if x_max - x_min < f64::EPSILON {
        x_min -= 0.5;
        x_max += 0.5;
    }
    let y_span = if y_max - y_min < f64::EPSILON { 1.0 } else { y_max - y_min };

    let to_x = |x: f64| MARGIN_LEFT + ((x - x_min) / (x_max - x_min)) * plot_width;
    let to_y = |y: f64| MARGIN_TOP + plot_height - ((y - y_min) / y_span) * plot_height;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    // Grid lines
    for i in 0..=GRID_LINES {
        let fraction = i as f64 / GRID_LINES as f64;
        let y = MARGIN_TOP + plot_height - fraction * plot_height;
        let value = y_min + fraction * y_span;

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.2}</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, value
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, MARGIN_TOP + plot_height, COLOR_AXIS
    ));

    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 20.0, COLOR_TEXT, escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0, escape_xml(y_label)
    ));

    if let Some(m) = marker {
        let x = to_x(m.x);
        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2" stroke-dasharray="6 4"/>"#,
            x, MARGIN_TOP, x, MARGIN_TOP + plot_height, COLOR_MARKER
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="11" fill="{}">{}</text>"#,
            x + 6.0, MARGIN_TOP + 14.0, COLOR_MARKER, escape_xml(&m.label)
        ));
    }

    for series_data in series {
        if series_data.points.is_empty() {
            continue;
        }

        let path = series_data
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} {} {}", if i == 0 { "M" } else { "L" }, to_x(p.x), to_y(p.y)))
            .collect::<Vec<_>>()
            .join(" ");

        svg.push_str(&format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="3"/>"#,
            path, series_data.color
        ));

        for point in &series_data.points {
            svg.push_str(&format!(
                r#"<circle cx="{}" cy="{}" r="4" fill="{}" stroke="white" stroke-width="2"/>"#,
                to_x(point.x),
                to_y(point.y),
                series_data.color
            ));
        }
    }

    // X-axis tick labels, taken from the first non-empty series
    if let Some(first) = series.iter().find(|s| !s.points.is_empty()) {
        for point in &first.points {
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.0}</text>"#,
                to_x(point.x), MARGIN_TOP + plot_height + 20.0, COLOR_TEXT, point.x
            ));
        }
    }

    // Legend
    let mut legend_y = MARGIN_TOP + 10.0;
    for series_data in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 110.0, legend_y, series_data.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 90.0, legend_y + 12.0, COLOR_TEXT, escape_xml(&series_data.name)
        ));
        legend_y += 25.0;
    }

    svg.push_str("</svg>");

    fs::write(output_path, svg)
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for s in series {
        for p in &s.points {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }
    }

    (x_min, x_max, y_min, y_max)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
