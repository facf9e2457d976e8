//! Histogram gradient-boosted decision trees
//!
//! Binary logistic objective. Candidate split points come from per-feature
//! quantile cuts computed once on the training matrix; the fitted trees keep
//! raw-value thresholds (`x < threshold` goes left), so scoring needs no
//! binning state.

use crate::error::{PipelineError, Result};
use crate::models::logistic::sigmoid;
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Probability that a training row is used by a given tree
    pub subsample: f64,
    /// Share of feature columns available to a given tree
    pub colsample_bytree: f64,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// Minimum hessian sum in each child of a split
    pub min_child_weight: f64,
    /// Upper bound on histogram bins per feature
    pub max_bin: usize,
    /// Initial probability before any tree is added
    pub base_score: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 4,
            learning_rate: 0.08,
            subsample: 0.9,
            colsample_bytree: 0.9,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            max_bin: 256,
            base_score: 0.5,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidParameter(msg));
        if self.n_estimators == 0 {
            return invalid("ensemble.n_estimators must be positive".to_string());
        }
        if self.max_depth == 0 {
            return invalid("ensemble.max_depth must be positive".to_string());
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid(format!(
                "ensemble.learning_rate must lie in (0, 1], got {}",
                self.learning_rate
            ));
        }
        for (name, value) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return invalid(format!("ensemble.{name} must lie in (0, 1], got {value}"));
            }
        }
        if !(self.reg_lambda.is_finite() && self.reg_lambda >= 0.0) {
            return invalid(format!(
                "ensemble.reg_lambda must be non-negative, got {}",
                self.reg_lambda
            ));
        }
        if !(self.min_child_weight.is_finite() && self.min_child_weight >= 0.0) {
            return invalid(format!(
                "ensemble.min_child_weight must be non-negative, got {}",
                self.min_child_weight
            ));
        }
        if !(2..=u16::MAX as usize).contains(&self.max_bin) {
            return invalid(format!(
                "ensemble.max_bin must lie in [2, {}], got {}",
                u16::MAX,
                self.max_bin
            ));
        }
        if !(self.base_score > 0.0 && self.base_score < 1.0) {
            return invalid(format!(
                "ensemble.base_score must lie in (0, 1), got {}",
                self.base_score
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// One regression tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] < *threshold { *left } else { *right },
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// Node references must point forward and features must exist
    fn validate(&self, n_features: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(idx, node)| match node {
                Node::Leaf { value } => value.is_finite(),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < n_features
                        && !threshold.is_nan()
                        && *left > idx
                        && *right > idx
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }
}

/// Quantile-binned copy of the training matrix
struct BinnedMatrix {
    /// Ascending cut values per feature
    cuts: Vec<Vec<f64>>,
    /// Bin index per feature, per row
    bins: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    fn build(x: &Array2<f64>, max_bin: usize) -> Self {
        let mut cuts = Vec::with_capacity(x.ncols());
        let mut bins = Vec::with_capacity(x.ncols());
        for column in x.columns() {
            let feature_cuts = quantile_cuts(column, max_bin);
            bins.push(
                column
                    .iter()
                    .map(|v| feature_cuts.partition_point(|c| c <= v) as u16)
                    .collect(),
            );
            cuts.push(feature_cuts);
        }
        Self { cuts, bins }
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }
}

/// Cut values such that bin `k` holds values in `[cuts[k-1], cuts[k])`
fn quantile_cuts(column: ArrayView1<'_, f64>, max_bin: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = column.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut distinct = sorted.clone();
    distinct.dedup();

    let mut cuts: Vec<f64> = if distinct.len() <= max_bin {
        distinct.into_iter().skip(1).collect()
    } else {
        (1..max_bin)
            .map(|k| sorted[k * sorted.len() / max_bin])
            .collect()
    };
    cuts.dedup();
    if let Some(&min) = sorted.first() {
        cuts.retain(|&c| c > min);
    }
    cuts
}

struct SplitCandidate {
    gain: f64,
    feature: usize,
    bin: usize,
}

struct TreeBuilder<'a> {
    binned: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    columns: &'a [usize],
    params: &'a BoostingParams,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.reg_lambda)
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -self.params.learning_rate * g / (h + self.params.reg_lambda)
    }

    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();

        let best = if depth < self.params.max_depth && rows.len() >= 2 {
            self.best_split(&rows, g, h)
        } else {
            None
        };

        match best {
            None => {
                self.nodes[idx] = Node::Leaf {
                    value: self.leaf_value(g, h),
                };
            }
            Some(split) => {
                let feature_bins = &self.binned.bins[split.feature];
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                    .into_iter()
                    .partition(|&r| (feature_bins[r] as usize) < split.bin);
                let threshold = self.binned.cuts[split.feature][split.bin - 1];
                let left = self.grow(left_rows, depth + 1);
                let right = self.grow(right_rows, depth + 1);
                self.nodes[idx] = Node::Split {
                    feature: split.feature,
                    threshold,
                    left,
                    right,
                };
            }
        }
        idx
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.score(g, h);
        let mut best: Option<SplitCandidate> = None;

        for &feature in self.columns {
            let n_bins = self.binned.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let feature_bins = &self.binned.bins[feature];
            let mut g_hist = vec![0.0; n_bins];
            let mut h_hist = vec![0.0; n_bins];
            for &r in rows {
                let b = feature_bins[r] as usize;
                g_hist[b] += self.grad[r];
                h_hist[b] += self.hess[r];
            }

            let (mut gl, mut hl) = (0.0, 0.0);
            for bin in 1..n_bins {
                gl += g_hist[bin - 1];
                hl += h_hist[bin - 1];
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent);
                if gain > 0.0 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate { gain, feature, bin });
                }
            }
        }
        best
    }
}

/// Fitted boosted-tree classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_margin: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    /// Fit on raw features and 0/1 labels
    ///
    /// RNG use per tree: one draw per training row for subsampling, then one
    /// column shuffle.
    pub fn fit<R: Rng + ?Sized>(
        x: &Array2<f64>,
        y: &Array1<f64>,
        params: &BoostingParams,
        rng: &mut R,
    ) -> Result<Self> {
        params.validate()?;
        let (n, d) = x.dim();
        if n == 0 || d == 0 {
            return Err(PipelineError::DataIntegrity(
                "cannot fit boosted trees on an empty matrix".to_string(),
            ));
        }
        if y.len() != n || y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(PipelineError::DataIntegrity(
                "boosted trees need one 0/1 label per row".to_string(),
            ));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::DataIntegrity(
                "feature matrix contains non-finite values".to_string(),
            ));
        }

        let binned = BinnedMatrix::build(x, params.max_bin);
        let base_margin = (params.base_score / (1.0 - params.base_score)).ln();
        let n_columns = ((params.colsample_bytree * d as f64).floor() as usize).max(1);

        let mut margins = vec![base_margin; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            for i in 0..n {
                let p = sigmoid(margins[i]);
                grad[i] = p - y[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let mut rows: Vec<usize> = (0..n)
                .filter(|_| rng.gen::<f64>() < params.subsample)
                .collect();
            if rows.is_empty() {
                rows = (0..n).collect();
            }

            let mut columns: Vec<usize> = (0..d).collect();
            columns.shuffle(rng);
            columns.truncate(n_columns);
            columns.sort_unstable();

            let mut builder = TreeBuilder {
                binned: &binned,
                grad: &grad,
                hess: &hess,
                columns: &columns,
                params,
                nodes: Vec::new(),
            };
            builder.grow(rows, 0);
            let tree = RegressionTree {
                nodes: builder.nodes,
            };

            for (margin, row) in margins.iter_mut().zip(x.rows()) {
                *margin += tree.predict(row);
            }
            if round % 50 == 0 {
                debug!(round, leaves = tree.n_leaves(), "Boosting round");
            }
            trees.push(tree);
        }

        Ok(Self {
            base_margin,
            n_features: d,
            trees,
        })
    }

    /// Raw log-odds per row
    pub fn predict_margin(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(PipelineError::InferencePrecondition(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x
            .rows()
            .into_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .fold(self.base_margin, |acc, tree| acc + tree.predict(row))
            })
            .collect())
    }

    /// Probability of the anomalous class per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_margin(x)?.mapv(sigmoid))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Structural check for deserialized models
    pub fn validate(&self) -> Result<()> {
        if !self.base_margin.is_finite()
            || self.trees.iter().any(|t| !t.validate(self.n_features))
        {
            return Err(PipelineError::DataIntegrity(
                "boosted tree model is structurally invalid".to_string(),
            ));
        }
        Ok(())
    }
}
