//! Feature standardization for the linear model

use crate::error::{PipelineError, Result};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column mean/scale transform fitted on training data only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

/// A matrix produced by a specific fitted scaler
///
/// Only [`StandardScaler::transform`] creates these, and each one remembers
/// the fingerprint of the scaler that produced it.
#[derive(Debug, Clone)]
pub struct Standardized {
    data: Array2<f64>,
    fingerprint: u64,
}

impl Standardized {
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl StandardScaler {
    /// Fit column means and population standard deviations
    ///
    /// Constant columns get a scale of 1 so they map to zero.
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(PipelineError::DataIntegrity(
                "cannot fit a scaler on zero rows".to_string(),
            ));
        }
        let mean = x.mean_axis(Axis(0)).map(|m| m.to_vec()).unwrap_or_default();
        let scale = x
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s > 0.0 && s.is_finite() { s } else { 1.0 })
            .collect();
        let scaler = Self { mean, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Fitted parameters must be finite with positive scales
    pub fn validate(&self) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            return Err(PipelineError::InferencePrecondition(format!(
                "scaler has {} means but {} scales",
                self.mean.len(),
                self.scale.len()
            )));
        }
        let finite = self.mean.iter().all(|m| m.is_finite())
            && self.scale.iter().all(|s| s.is_finite() && *s > 0.0);
        if !finite {
            return Err(PipelineError::InferencePrecondition(
                "scaler parameters must be finite with positive scales".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `(x - mean) / scale` column-wise
    pub fn transform(&self, x: &Array2<f64>) -> Result<Standardized> {
        if x.ncols() != self.n_features() {
            return Err(PipelineError::InferencePrecondition(format!(
                "scaler expects {} columns, got {}",
                self.n_features(),
                x.ncols()
            )));
        }
        let mut data = x.clone();
        for (mut column, (mean, scale)) in data
            .axis_iter_mut(Axis(1))
            .zip(self.mean.iter().zip(&self.scale))
        {
            column.mapv_inplace(|v| (v - mean) / scale);
        }
        Ok(Standardized {
            data,
            fingerprint: self.fingerprint(),
        })
    }

    /// FNV-1a hash of the exact fitted parameter bits
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        self.mean
            .iter()
            .chain(&self.scale)
            .flat_map(|v| v.to_bits().to_le_bytes())
            .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform() {
        let x = array![[1.0, 10.0, 5.0], [3.0, 30.0, 5.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        assert_eq!(scaler.mean(), &[2.0, 20.0, 5.0]);
        assert_eq!(scaler.scale(), &[1.0, 10.0, 1.0]);

        let z = scaler.transform(&x).unwrap();
        assert_eq!(z.view(), array![[-1.0, -1.0, 0.0], [1.0, 1.0, 0.0]]);
        assert_eq!(z.fingerprint(), scaler.fingerprint());
    }

    #[test]
    fn test_training_statistics_reused() {
        let train = array![[0.0], [2.0]];
        let test = array![[4.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        let z = scaler.transform(&test).unwrap();
        assert_eq!(z.view()[[0, 0]], 3.0);
    }

    #[test]
    fn test_fingerprint_tracks_parameters() {
        let a = StandardScaler::fit(&array![[0.0], [2.0]]).unwrap();
        let b = StandardScaler::fit(&array![[0.0], [2.5]]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn test_column_mismatch_rejected() {
        let scaler = StandardScaler::fit(&array![[0.0, 1.0], [2.0, 3.0]]).unwrap();
        let err = scaler.transform(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::InferencePrecondition(_)));
    }
}
