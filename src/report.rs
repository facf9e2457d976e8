//! Evaluation summary and precision-recall charts

use crate::error::Result;
use crate::metrics::{ClassificationReport, PrecisionRecallCurve};
use crate::models::ModelKind;
use crate::storage::{remove_if_exists, write_atomic};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A metric value, or the reason it could not be computed
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Value(f64),
    Skipped(String),
}

impl MetricValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(*v),
            MetricValue::Skipped(_) => None,
        }
    }
}

impl<E: fmt::Display> From<std::result::Result<f64, E>> for MetricValue {
    fn from(result: std::result::Result<f64, E>) -> Self {
        match result {
            Ok(v) => MetricValue::Value(v),
            Err(e) => MetricValue::Skipped(e.to_string()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Value(v) => write!(f, "{v}"),
            MetricValue::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

/// Test-set results for one model
#[derive(Debug, Clone)]
pub struct ModelEvaluation {
    pub kind: ModelKind,
    pub roc_auc: MetricValue,
    pub pr_auc: MetricValue,
    /// Absent when the test partition has no positives
    pub pr_curve: Option<PrecisionRecallCurve>,
}

/// Artifacts written by one reporting run
#[derive(Debug, Clone)]
pub struct ReportArtifacts {
    pub summary: PathBuf,
    pub charts: Vec<PathBuf>,
}

/// Writes `model_report.txt` and one `pr_<model>.svg` per model
#[derive(Debug, Clone)]
pub struct EvaluationReporter {
    reports_dir: PathBuf,
    images_dir: PathBuf,
}

impl EvaluationReporter {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(reports_dir: P, images_dir: Q) -> Self {
        Self {
            reports_dir: reports_dir.as_ref().to_path_buf(),
            images_dir: images_dir.as_ref().to_path_buf(),
        }
    }

    pub fn summary_path(&self) -> PathBuf {
        self.reports_dir.join("model_report.txt")
    }

    pub fn chart_path(&self, kind: ModelKind) -> PathBuf {
        self.images_dir.join(format!("pr_{}.svg", kind.tag()))
    }

    /// Write the text summary and the charts, each replacing any previous file.
    /// A model without a curve has its old chart removed.
    pub fn write(
        &self,
        evaluations: &[ModelEvaluation],
        report: &ThresholdReport<'_>,
    ) -> Result<ReportArtifacts> {
        let summary = self.summary_path();
        write_atomic(&summary, render_summary(evaluations, report).as_bytes())?;
        info!(path = %summary.display(), "Evaluation summary written");

        let mut charts = Vec::new();
        for evaluation in evaluations {
            let path = self.chart_path(evaluation.kind);
            let Some(curve) = &evaluation.pr_curve else {
                // a chart from an earlier run must not outlive its summary
                let removed = remove_if_exists(&path)?;
                warn!(
                    model = %evaluation.kind,
                    stale_chart_removed = removed,
                    "No precision-recall curve to plot"
                );
                continue;
            };
            let title = format!("Precision-Recall ({})", evaluation.kind);
            write_atomic(&path, render_pr_chart(&title, curve, &evaluation.pr_auc).as_bytes())?;
            info!(model = %evaluation.kind, path = %path.display(), "Precision-recall chart written");
            charts.push(path);
        }

        Ok(ReportArtifacts { summary, charts })
    }
}

/// Thresholded classification report for the model it describes
#[derive(Debug, Clone, Copy)]
pub struct ThresholdReport<'a> {
    pub kind: ModelKind,
    pub threshold: f64,
    pub report: std::result::Result<&'a ClassificationReport, &'a str>,
}

/// Summary text: ROC AUC per model, PR AUC per model, then the classification report
pub fn render_summary(evaluations: &[ModelEvaluation], report: &ThresholdReport<'_>) -> String {
    let mut out = String::new();
    for evaluation in evaluations {
        let _ = writeln!(out, "{} AUC: {}", evaluation.kind, evaluation.roc_auc);
    }
    for evaluation in evaluations {
        let _ = writeln!(out, "{} PR AUC: {}", evaluation.kind, evaluation.pr_auc);
    }
    let _ = writeln!(
        out,
        "\n=== Classification Report ({}, {} threshold) ===",
        report.kind, report.threshold
    );
    match report.report {
        Ok(table) => {
            let _ = write!(out, "{table}");
        }
        Err(reason) => {
            let _ = writeln!(out, "skipped ({reason})");
        }
    }
    out
}

const CHART_WIDTH: f64 = 640.0;
const CHART_HEIGHT: f64 = 480.0;
const MARGIN: f64 = 60.0;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Line chart of precision against recall on unit axes
pub fn render_pr_chart(title: &str, curve: &PrecisionRecallCurve, pr_auc: &MetricValue) -> String {
    let plot_w = CHART_WIDTH - 2.0 * MARGIN;
    let plot_h = CHART_HEIGHT - 2.0 * MARGIN;
    let sx = |r: f64| MARGIN + r.clamp(0.0, 1.0) * plot_w;
    let sy = |p: f64| CHART_HEIGHT - MARGIN - p.clamp(0.0, 1.0) * plot_h;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{CHART_WIDTH}" height="{CHART_HEIGHT}" viewBox="0 0 {CHART_WIDTH} {CHART_HEIGHT}" font-family="sans-serif" font-size="12">"#
    );
    let _ = writeln!(
        svg,
        r#"<rect width="{CHART_WIDTH}" height="{CHART_HEIGHT}" fill="white"/>"#
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle" font-size="14">{}</text>"#,
        CHART_WIDTH / 2.0,
        MARGIN / 2.0,
        escape(title)
    );

    for tick in 0..=5 {
        let v = tick as f64 / 5.0;
        let _ = writeln!(
            svg,
            r##"<line x1="{x}" y1="{top}" x2="{x}" y2="{bottom}" stroke="#e0e0e0"/><text x="{x}" y="{label}" text-anchor="middle">{v:.1}</text>"##,
            x = sx(v),
            top = sy(1.0),
            bottom = sy(0.0),
            label = sy(0.0) + 18.0,
        );
        let _ = writeln!(
            svg,
            r##"<line x1="{left}" y1="{y}" x2="{right}" y2="{y}" stroke="#e0e0e0"/><text x="{label}" y="{y}" text-anchor="end" dominant-baseline="middle">{v:.1}</text>"##,
            y = sy(v),
            left = sx(0.0),
            right = sx(1.0),
            label = sx(0.0) - 8.0,
        );
    }
    let _ = writeln!(
        svg,
        r#"<rect x="{}" y="{}" width="{plot_w}" height="{plot_h}" fill="none" stroke="black"/>"#,
        sx(0.0),
        sy(1.0)
    );
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle">Recall</text>"#,
        CHART_WIDTH / 2.0,
        CHART_HEIGHT - 15.0
    );
    let _ = writeln!(
        svg,
        r#"<text x="15" y="{y}" text-anchor="middle" transform="rotate(-90 15 {y})">Precision</text>"#,
        y = CHART_HEIGHT / 2.0
    );

    let points: Vec<String> = curve
        .recall
        .iter()
        .zip(&curve.precision)
        .map(|(&r, &p)| format!("{:.2},{:.2}", sx(r), sy(p)))
        .collect();
    let _ = writeln!(
        svg,
        r##"<polyline points="{}" fill="none" stroke="#1f77b4" stroke-width="2"/>"##,
        points.join(" ")
    );

    let legend = match pr_auc.value() {
        Some(v) => format!("PR AUC={v:.3}"),
        None => "PR AUC unavailable".to_string(),
    };
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="end">{}</text>"#,
        sx(1.0) - 10.0,
        sy(1.0) + 20.0,
        escape(&legend)
    );
    svg.push_str("</svg>\n");
    svg
}
