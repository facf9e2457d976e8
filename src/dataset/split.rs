//! Stratified train/test partitioning

use crate::dataset::FeatureTable;
use crate::error::{PipelineError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

/// Train and test partitions plus the source row positions of each
#[derive(Debug, Clone)]
pub struct Split {
    pub train: FeatureTable,
    pub test: FeatureTable,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Partition `table` so each label keeps its share in the test set
///
/// The test size is `ceil(test_fraction * n)`, apportioned between labels by
/// largest remainder. Fails when a label has fewer than two rows, since such
/// a table cannot be stratified.
pub fn stratified_split<R: Rng + ?Sized>(
    table: &FeatureTable,
    test_fraction: f64,
    rng: &mut R,
) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidParameter(format!(
            "test_fraction must lie in (0, 1), got {test_fraction}"
        )));
    }

    let n = table.len();
    let mut by_label: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (idx, row) in table.rows().iter().enumerate() {
        by_label[row.label() as usize].push(idx);
    }
    for (label, members) in by_label.iter().enumerate() {
        if members.len() < 2 {
            return Err(PipelineError::DataIntegrity(format!(
                "cannot stratify: label {label} has {} rows, need at least 2",
                members.len()
            )));
        }
    }

    let n_test = (test_fraction * n as f64).ceil() as usize;
    let n_train = n - n_test;
    if n_test < by_label.len() || n_train < by_label.len() {
        return Err(PipelineError::DataIntegrity(format!(
            "cannot stratify {n} rows with test_fraction {test_fraction}: \
             {n_train} train / {n_test} test rows"
        )));
    }

    let quotas = apportion(n_test, &[by_label[0].len(), by_label[1].len()]);

    let mut test_indices = Vec::with_capacity(n_test);
    let mut train_indices = Vec::with_capacity(n_train);
    for (members, quota) in by_label.iter_mut().zip(quotas) {
        members.shuffle(rng);
        test_indices.extend_from_slice(&members[..quota]);
        train_indices.extend_from_slice(&members[quota..]);
    }
    test_indices.shuffle(rng);
    train_indices.shuffle(rng);

    let split = Split {
        train: table.select(&train_indices),
        test: table.select(&test_indices),
        train_indices,
        test_indices,
    };
    info!(
        train = split.train.len(),
        test = split.test.len(),
        train_positives = split.train.positives(),
        test_positives = split.test.positives(),
        "Stratified split"
    );
    Ok(split)
}

/// Largest-remainder allocation of `total` seats proportional to `sizes`
fn apportion(total: usize, sizes: &[usize]) -> Vec<usize> {
    let population: usize = sizes.iter().sum();
    let shares: Vec<f64> = sizes
        .iter()
        .map(|&s| total as f64 * s as f64 / population as f64)
        .collect();
    let mut quotas: Vec<usize> = shares
        .iter()
        .zip(sizes)
        .map(|(share, &size)| (share.floor() as usize).min(size))
        .collect();

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = shares[a] - shares[a].floor();
        let fb = shares[b] - shares[b].floor();
        fb.total_cmp(&fa)
    });

    let mut remaining = total - quotas.iter().sum::<usize>();
    while remaining > 0 {
        let before = remaining;
        for &class in &order {
            if remaining > 0 && quotas[class] < sizes[class] {
                quotas[class] += 1;
                remaining -= 1;
            }
        }
        if remaining == before {
            break;
        }
    }
    quotas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureRow;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn table(n: usize, positives: usize) -> FeatureTable {
        FeatureTable::new(
            (0..n)
                .map(|i| {
                    let label = u8::from(i < positives);
                    FeatureRow::new(i as u32, i as f64, false, 0, label).unwrap()
                })
                .collect(),
        )
    }

    #[test]
    fn test_split_sizes_and_stratification() {
        let data = table(1_000, 60);
        let split = stratified_split(&data, 0.2, &mut StdRng::seed_from_u64(42)).unwrap();

        assert_eq!(split.test.len(), 200);
        assert_eq!(split.train.len(), 800);
        let positives = split.test.positives();
        assert!((10..=14).contains(&positives), "positives {positives}");
    }

    #[test]
    fn test_split_is_a_partition() {
        let data = table(503, 37);
        let split = stratified_split(&data, 0.25, &mut StdRng::seed_from_u64(1)).unwrap();

        let train: HashSet<_> = split.train_indices.iter().copied().collect();
        let test: HashSet<_> = split.test_indices.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), data.len());
        for (pos, &idx) in split.test_indices.iter().enumerate() {
            assert_eq!(split.test.rows()[pos], data.rows()[idx]);
        }
    }

    #[test]
    fn test_positive_rate_preserved() {
        for (n, positives) in [(977, 61), (2_000, 120), (150, 9), (10_000, 600)] {
            let data = table(n, positives);
            for seed in 0..5 {
                let split =
                    stratified_split(&data, 0.2, &mut StdRng::seed_from_u64(seed)).unwrap();
                let drift = (split.test.positive_rate() - data.positive_rate()).abs();
                assert!(drift <= 1.0 / split.test.len() as f64 + 1e-12, "n={n} drift={drift}");
            }
        }
    }

    #[test]
    fn test_split_deterministic() {
        let data = table(300, 30);
        let a = stratified_split(&data, 0.2, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = stratified_split(&data, 0.2, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.test_indices, b.test_indices);
        assert_eq!(a.train_indices, b.train_indices);
    }

    #[test]
    fn test_degenerate_tables_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let single_class = table(100, 0);
        assert!(matches!(
            stratified_split(&single_class, 0.2, &mut rng),
            Err(PipelineError::DataIntegrity(_))
        ));
        let lone_positive = table(100, 1);
        assert!(matches!(
            stratified_split(&lone_positive, 0.2, &mut rng),
            Err(PipelineError::DataIntegrity(_))
        ));
        assert!(matches!(
            stratified_split(&table(100, 10), 1.0, &mut rng),
            Err(PipelineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_apportion() {
        assert_eq!(apportion(200, &[940, 60]), vec![188, 12]);
        assert_eq!(apportion(3, &[5, 5]), vec![2, 1]);
        assert_eq!(apportion(10, &[1, 99]).iter().sum::<usize>(), 10);
    }
}
