//! Feature tables, flat-file I/O and train/test partitioning

pub mod io;
pub mod split;

pub use io::{
    parse_feature_table, read_feature_table, read_logins, read_users, write_feature_table,
    write_logins, write_users, CleaningReport,
};
pub use split::{stratified_split, Split};

use crate::error::{PipelineError, Result};
use crate::types::FeatureRow;
use ndarray::{Array1, Array2};

/// A clean feature table: every row complete and validated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.rows.iter().filter(|r| r.label() == 1).count()
    }

    pub fn positive_rate(&self) -> f64 {
        if self.rows.is_empty() {
            0.0
        } else {
            self.positives() as f64 / self.rows.len() as f64
        }
    }

    /// Labels as 0.0 / 1.0
    pub fn labels(&self) -> Array1<f64> {
        self.rows.iter().map(|r| r.label() as f64).collect()
    }

    /// Rows at the given positions, in that order
    pub fn select(&self, indices: &[usize]) -> FeatureTable {
        FeatureTable::new(indices.iter().map(|&i| self.rows[i]).collect())
    }

    /// Raw feature matrix with columns in `feature_names` order
    pub fn matrix(&self, feature_names: &[String]) -> Result<Array2<f64>> {
        feature_matrix(&self.rows, feature_names)
    }
}

/// Build a matrix from rows, one column per named feature
pub fn feature_matrix(rows: &[FeatureRow], feature_names: &[String]) -> Result<Array2<f64>> {
    let mut matrix = Array2::zeros((rows.len(), feature_names.len()));
    for (col, name) in feature_names.iter().enumerate() {
        for (r, row) in rows.iter().enumerate() {
            matrix[[r, col]] = row.value(name).ok_or_else(|| {
                PipelineError::DataIntegrity(format!("unknown feature column {name:?}"))
            })?;
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FEATURE_NAMES;

    fn names() -> Vec<String> {
        FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matrix_columns_follow_names() {
        let table = FeatureTable::new(vec![
            FeatureRow::new(1, 10.0, false, 0, 0).unwrap(),
            FeatureRow::new(2, 20.0, true, 3, 1).unwrap(),
        ]);
        let m = table.matrix(&names()).unwrap();
        assert_eq!(m.shape(), &[2, 4]);
        assert_eq!(m[[1, 0]], 2.0);
        assert_eq!(m[[1, 2]], 1.0);

        let reversed: Vec<String> = names().into_iter().rev().collect();
        let r = table.matrix(&reversed).unwrap();
        assert_eq!(r[[1, 0]], 3.0);
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let table = FeatureTable::new(vec![FeatureRow::new(1, 1.0, false, 0, 0).unwrap()]);
        let err = table.matrix(&["bogus".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::DataIntegrity(_)));
    }

    #[test]
    fn test_positive_rate() {
        let table = FeatureTable::new(vec![
            FeatureRow::new(1, 1.0, false, 0, 0).unwrap(),
            FeatureRow::new(1, 1.0, false, 0, 1).unwrap(),
            FeatureRow::new(1, 1.0, false, 0, 0).unwrap(),
            FeatureRow::new(1, 1.0, false, 0, 0).unwrap(),
        ]);
        assert_eq!(table.positives(), 1);
        assert_eq!(table.positive_rate(), 0.25);
        assert_eq!(table.labels().to_vec(), vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(table.select(&[1, 0]).rows()[0].label(), 1);
    }
}
