//! Class-balanced L2 logistic regression
//!
//! Minimises `0.5 * |w|^2 + C * sum_i s_i * logloss_i` with an unpenalised
//! intercept, where `s_i = n / (2 * n_class(y_i))` so both labels carry equal
//! total weight. Fitted with Newton steps and a backtracking line search.

use crate::error::{PipelineError, Result};
use crate::models::scaler::Standardized;
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const ARMIJO: f64 = 1e-4;
const MAX_HALVINGS: usize = 50;
const HESSIAN_RIDGE: f64 = 1e-10;

/// Linear model hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    /// Inverse regularisation strength
    pub c: f64,
    /// Newton iteration cap
    pub max_iter: usize,
    /// Stop once every gradient component is below `tol * n`
    pub tol: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 200,
            tol: 1e-8,
        }
    }
}

impl LogisticParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(PipelineError::InvalidParameter(format!(
                "linear.c must be positive, got {}",
                self.c
            )));
        }
        if self.max_iter == 0 {
            return Err(PipelineError::InvalidParameter(
                "linear.max_iter must be positive".to_string(),
            ));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(PipelineError::InvalidParameter(format!(
                "linear.tol must be positive, got {}",
                self.tol
            )));
        }
        Ok(())
    }
}

/// Fitted logistic regression, tied to the scaler it was trained under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    coef: Vec<f64>,
    intercept: f64,
    scaler_fingerprint: u64,
    n_iter: usize,
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

struct Problem<'a> {
    x: ArrayView2<'a, f64>,
    y: &'a Array1<f64>,
    weights: Vec<f64>,
    c: f64,
}

impl Problem<'_> {
    fn dim(&self) -> usize {
        self.x.ncols() + 1
    }

    fn margins(&self, theta: &[f64]) -> Vec<f64> {
        let d = self.x.ncols();
        self.x
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(&theta[..d])
                    .fold(theta[d], |acc, (xi, wi)| acc + xi * wi)
            })
            .collect()
    }

    fn objective(&self, theta: &[f64]) -> f64 {
        let d = self.x.ncols();
        let penalty = 0.5 * theta[..d].iter().map(|w| w * w).sum::<f64>();
        let loss: f64 = self
            .margins(theta)
            .iter()
            .zip(self.y.iter())
            .zip(&self.weights)
            .map(|((&z, &y), &s)| s * (softplus(z) - y * z))
            .sum();
        penalty + self.c * loss
    }

    /// Gradient and Hessian of the objective at `theta`
    fn derivatives(&self, theta: &[f64]) -> (Vec<f64>, Vec<Vec<f64>>) {
        let d = self.x.ncols();
        let k = self.dim();
        let mut grad = vec![0.0; k];
        let mut hess = vec![vec![0.0; k]; k];

        for ((row, z), (&y, &s)) in self
            .x
            .rows()
            .into_iter()
            .zip(self.margins(theta))
            .zip(self.y.iter().zip(&self.weights))
        {
            let p = sigmoid(z);
            let r = self.c * s * (p - y);
            let w = self.c * s * p * (1.0 - p);
            for a in 0..k {
                let xa = if a < d { row[a] } else { 1.0 };
                grad[a] += r * xa;
                for b in a..k {
                    let xb = if b < d { row[b] } else { 1.0 };
                    hess[a][b] += w * xa * xb;
                }
            }
        }

        for a in 0..k {
            if a < d {
                grad[a] += theta[a];
                hess[a][a] += 1.0;
            }
            hess[a][a] += HESSIAN_RIDGE;
            for b in 0..a {
                hess[a][b] = hess[b][a];
            }
        }
        (grad, hess)
    }
}

/// Solve `a * x = b` by Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < f64::EPSILON {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

impl LogisticRegression {
    /// Fit on standardized features and 0/1 labels
    pub fn fit(x: &Standardized, y: &Array1<f64>, params: &LogisticParams) -> Result<Self> {
        params.validate()?;
        let view = x.view();
        let n = view.nrows();
        if n != y.len() {
            return Err(PipelineError::DataIntegrity(format!(
                "{n} feature rows but {} labels",
                y.len()
            )));
        }
        let positives = y.iter().filter(|&&v| v == 1.0).count();
        let negatives = y.iter().filter(|&&v| v == 0.0).count();
        if positives + negatives != n || positives == 0 || negatives == 0 {
            return Err(PipelineError::DataIntegrity(
                "logistic regression needs 0/1 labels with both classes present".to_string(),
            ));
        }

        let w_pos = n as f64 / (2.0 * positives as f64);
        let w_neg = n as f64 / (2.0 * negatives as f64);
        let problem = Problem {
            x: view,
            y,
            weights: y.iter().map(|&v| if v == 1.0 { w_pos } else { w_neg }).collect(),
            c: params.c,
        };

        let mut theta = vec![0.0; problem.dim()];
        let mut value = problem.objective(&theta);
        let threshold = params.tol * n as f64;
        let mut n_iter = 0;
        let mut converged = false;

        while n_iter < params.max_iter {
            let (grad, hess) = problem.derivatives(&theta);
            let grad_norm = grad.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
            if grad_norm <= threshold {
                converged = true;
                break;
            }
            n_iter += 1;

            let step = solve(hess, grad.clone()).ok_or_else(|| {
                PipelineError::DataIntegrity("logistic regression Hessian is singular".to_string())
            })?;
            let slope: f64 = grad.iter().zip(&step).map(|(g, s)| g * s).sum();

            let mut t = 1.0;
            let mut accepted = false;
            for _ in 0..MAX_HALVINGS {
                let candidate: Vec<f64> = theta.iter().zip(&step).map(|(p, s)| p - t * s).collect();
                let candidate_value = problem.objective(&candidate);
                if candidate_value <= value - ARMIJO * t * slope {
                    theta = candidate;
                    value = candidate_value;
                    accepted = true;
                    break;
                }
                t *= 0.5;
            }
            if !accepted {
                // no further decrease is representable
                converged = true;
                break;
            }
        }

        if converged {
            debug!(iterations = n_iter, objective = value, "Logistic regression converged");
        } else {
            warn!(
                iterations = n_iter,
                objective = value,
                "Logistic regression hit max_iter before converging"
            );
        }

        let d = problem.x.ncols();
        Ok(Self {
            coef: theta[..d].to_vec(),
            intercept: theta[d],
            scaler_fingerprint: x.fingerprint(),
            n_iter,
        })
    }

    /// Probability of the anomalous class for each row
    pub fn predict_proba(&self, x: &Standardized) -> Result<Array1<f64>> {
        self.check_input(x)?;
        Ok(x
            .view()
            .rows()
            .into_iter()
            .map(|row| {
                let z = row
                    .iter()
                    .zip(&self.coef)
                    .fold(self.intercept, |acc, (xi, wi)| acc + xi * wi);
                sigmoid(z)
            })
            .collect())
    }

    fn check_input(&self, x: &Standardized) -> Result<()> {
        if x.fingerprint() != self.scaler_fingerprint {
            return Err(PipelineError::InferencePrecondition(
                "features were not standardized with the scaler this model was trained with"
                    .to_string(),
            ));
        }
        if x.view().ncols() != self.coef.len() {
            return Err(PipelineError::InferencePrecondition(format!(
                "model expects {} features, got {}",
                self.coef.len(),
                x.view().ncols()
            )));
        }
        Ok(())
    }

    pub fn coef(&self) -> &[f64] {
        &self.coef
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn scaler_fingerprint(&self) -> u64 {
        self.scaler_fingerprint
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}
