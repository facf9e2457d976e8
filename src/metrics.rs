//! Evaluation metrics for binary scores
//!
//! Labels are 0.0 / 1.0 and scores are probabilities of the positive class.
//! Metrics that have no defined value for the given labels return
//! [`PipelineError::MetricUndefined`] rather than a placeholder number.

use crate::error::{PipelineError, Result};
use ndarray::Array1;
use serde::Serialize;
use std::fmt;

fn check_inputs(metric: &'static str, y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<()> {
    if y_true.len() != scores.len() {
        return Err(PipelineError::DataIntegrity(format!(
            "{metric}: {} labels but {} scores",
            y_true.len(),
            scores.len()
        )));
    }
    if y_true.iter().any(|&y| y != 0.0 && y != 1.0) {
        return Err(PipelineError::DataIntegrity(format!(
            "{metric}: labels must be 0 or 1"
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(PipelineError::MetricUndefined {
            metric,
            reason: "scores contain non-finite values".to_string(),
        });
    }
    Ok(())
}

fn class_counts(y_true: &Array1<f64>) -> (usize, usize) {
    let positives = y_true.iter().filter(|&&y| y == 1.0).count();
    (positives, y_true.len() - positives)
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged
pub fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<f64> {
    check_inputs("roc_auc", y_true, scores)?;
    let (positives, negatives) = class_counts(y_true);
    if positives == 0 || negatives == 0 {
        let missing = if positives == 0 { "positive" } else { "negative" };
        return Err(PipelineError::MetricUndefined {
            metric: "roc_auc",
            reason: format!("no {missing} samples in y_true"),
        });
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based; tied scores share the mean rank
        let rank = (start + end + 1) as f64 / 2.0;
        let tied_positives = order[start..end]
            .iter()
            .filter(|&&i| y_true[i] == 1.0)
            .count();
        positive_rank_sum += rank * tied_positives as f64;
        start = end;
    }

    let (p, n) = (positives as f64, negatives as f64);
    Ok((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Precision and recall at every distinct score threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecisionRecallCurve {
    /// Ordered by increasing threshold, ending with the point (recall 0, precision 1)
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    /// One per point except the final anchor
    pub thresholds: Vec<f64>,
}

impl PrecisionRecallCurve {
    /// Trapezoidal area with recall on the x axis
    pub fn area(&self) -> Result<f64> {
        auc(&self.recall, &self.precision)
    }

    pub fn len(&self) -> usize {
        self.recall.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recall.is_empty()
    }
}

/// Precision-recall pairs for `score >= threshold`
///
/// Thresholds below the one that first reaches full recall are dropped.
pub fn precision_recall_curve(
    y_true: &Array1<f64>,
    scores: &Array1<f64>,
) -> Result<PrecisionRecallCurve> {
    check_inputs("precision_recall_curve", y_true, scores)?;
    let (positives, _) = class_counts(y_true);
    if positives == 0 {
        return Err(PipelineError::MetricUndefined {
            metric: "precision_recall_curve",
            reason: "no positive samples in y_true, recall is undefined".to_string(),
        });
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    // one point per distinct score, walking from the highest threshold down
    let mut precision = Vec::new();
    let mut recall = Vec::new();
    let mut thresholds = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);
    for (pos, &i) in order.iter().enumerate() {
        if y_true[i] == 1.0 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if !last_of_tie {
            continue;
        }
        precision.push(tp as f64 / (tp + fp) as f64);
        recall.push(tp as f64 / positives as f64);
        thresholds.push(scores[i]);
        if tp == positives {
            break;
        }
    }

    precision.reverse();
    recall.reverse();
    thresholds.reverse();
    precision.push(1.0);
    recall.push(0.0);

    Ok(PrecisionRecallCurve {
        precision,
        recall,
        thresholds,
    })
}

/// Trapezoidal area under `y(x)` for monotonic `x`
pub fn auc(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return Err(PipelineError::MetricUndefined {
            metric: "auc",
            reason: format!("need at least 2 matching points, got {} and {}", x.len(), y.len()),
        });
    }
    let increasing = x.windows(2).all(|w| w[0] <= w[1]);
    let decreasing = x.windows(2).all(|w| w[0] >= w[1]);
    if !increasing && !decreasing {
        return Err(PipelineError::MetricUndefined {
            metric: "auc",
            reason: "x is neither increasing nor decreasing".to_string(),
        });
    }

    let area: f64 = x
        .windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum();
    Ok(if decreasing && !increasing { -area } else { area })
}

/// Precision, recall, F1 and support for one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1_score,
            support: tp + fn_,
        }
    }
}

/// Per-class report for thresholded predictions
///
/// Undefined ratios (no predicted or no actual members of a class) count as 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    /// Index 0 is the normal class, index 1 the anomalous class
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    /// `[[tn, fp], [fn, tp]]`
    pub confusion: [[usize; 2]; 2],
    pub threshold: f64,
}

impl ClassificationReport {
    /// Predict the positive class where `score >= threshold`
    pub fn at_threshold(
        y_true: &Array1<f64>,
        scores: &Array1<f64>,
        threshold: f64,
    ) -> Result<Self> {
        check_inputs("classification_report", y_true, scores)?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::InvalidParameter(format!(
                "decision threshold must lie in [0, 1], got {threshold}"
            )));
        }
        if y_true.is_empty() {
            return Err(PipelineError::MetricUndefined {
                metric: "classification_report",
                reason: "no samples".to_string(),
            });
        }

        let mut confusion = [[0usize; 2]; 2];
        for (&y, &s) in y_true.iter().zip(scores.iter()) {
            let actual = usize::from(y == 1.0);
            let predicted = usize::from(s >= threshold);
            confusion[actual][predicted] += 1;
        }
        let [[tn, fp], [fn_, tp]] = confusion;

        let classes = [
            ClassMetrics::from_counts(tn, fn_, fp),
            ClassMetrics::from_counts(tp, fp, fn_),
        ];
        let total = y_true.len();
        let accuracy = (tn + tp) as f64 / total as f64;

        let average = |weight: &dyn Fn(&ClassMetrics) -> f64| {
            let norm: f64 = classes.iter().map(weight).sum();
            let mean = |f: fn(&ClassMetrics) -> f64| {
                classes.iter().map(|c| weight(c) * f(c)).sum::<f64>() / norm
            };
            ClassMetrics {
                precision: mean(|c| c.precision),
                recall: mean(|c| c.recall),
                f1_score: mean(|c| c.f1_score),
                support: total,
            }
        };
        let macro_avg = average(&|_| 1.0);
        let weighted_avg = average(&|c| c.support as f64);

        Ok(Self {
            classes,
            accuracy,
            macro_avg,
            weighted_avg,
            confusion,
            threshold,
        })
    }

    pub fn positive(&self) -> &ClassMetrics {
        &self.classes[1]
    }

    pub fn support(&self) -> usize {
        self.macro_avg.support
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WIDTH: usize = 12;
        let row = |f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics| {
            writeln!(
                f,
                "{name:>WIDTH$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                m.precision, m.recall, m.f1_score, m.support
            )
        };

        writeln!(
            f,
            "{:>WIDTH$}  {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (label, metrics) in self.classes.iter().enumerate() {
            row(f, &label.to_string(), metrics)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>WIDTH$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.support()
        )?;
        row(f, "macro avg", &self.macro_avg)?;
        row(f, "weighted avg", &self.weighted_avg)
    }
}
