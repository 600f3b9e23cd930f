use std::collections::BTreeMap;

use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::dataset::ClassLabel;
use crate::utility::errors::{FiirsError, FiirsResult};

#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub y_train: Vec<ClassLabel>,
    pub x_test: Array2<f64>,
    pub y_test: Vec<ClassLabel>,
}

/// Test rows per class: `ceil(test_size * n)` spread proportionally,
/// leftovers going to the largest remainders (smaller label first on ties).
fn allocate_test_rows(class_sizes: &BTreeMap<ClassLabel, usize>, n: usize, test_size: f64) -> BTreeMap<ClassLabel, usize> {
    let n_test = ((test_size * n as f64).ceil() as usize).min(n);

    let mut allocation: BTreeMap<ClassLabel, usize> = BTreeMap::new();
    let mut remainders: Vec<(f64, ClassLabel)> = Vec::new();
    for (&label, &size) in class_sizes {
        let quota = n_test as f64 * size as f64 / n as f64;
        allocation.insert(label, quota.floor() as usize);
        remainders.push((quota - quota.floor(), label));
    }

    let assigned: usize = allocation.values().sum();
    remainders.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, label) in remainders.into_iter().take(n_test.saturating_sub(assigned)) {
        if let Some(count) = allocation.get_mut(&label) {
            *count += 1;
        }
    }
    allocation
}

/// Stratified train/test partition with per-class seeded shuffles.
///
/// Every class needs at least two members and must land on both sides.
pub fn stratified_split(x: &Array2<f64>, y: &[ClassLabel], test_size: f64, seed: u64) -> FiirsResult<TrainTestSplit> {
    if x.nrows() != y.len() {
        return Err(FiirsError::validation(
            "split",
            format!("{} rows for {} labels", x.nrows(), y.len()),
        ));
    }
    if y.is_empty() {
        return Err(FiirsError::insufficient_data("stratified split", "empty dataset"));
    }

    let mut members: BTreeMap<ClassLabel, Vec<usize>> = BTreeMap::new();
    for (i, label) in y.iter().enumerate() {
        members.entry(*label).or_default().push(i);
    }

    if let Some((label, rows)) = members.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(FiirsError::insufficient_data(
            "stratified split",
            format!("class {} has only {} member(s), at least 2 are needed", label, rows.len()),
        ));
    }

    let sizes: BTreeMap<ClassLabel, usize> = members.iter().map(|(l, rows)| (*l, rows.len())).collect();
    let allocation = allocate_test_rows(&sizes, y.len(), test_size);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_rows = Vec::new();
    let mut test_rows = Vec::new();
    for (label, mut rows) in members {
        let n_test = allocation.get(&label).copied().unwrap_or(0);
        if n_test == 0 || n_test >= rows.len() {
            return Err(FiirsError::insufficient_data(
                "stratified split",
                format!(
                    "class {} ({} rows) would get {} test rows with test size {}",
                    label,
                    rows.len(),
                    n_test,
                    test_size
                ),
            ));
        }
        rows.shuffle(&mut rng);
        test_rows.extend_from_slice(&rows[..n_test]);
        train_rows.extend_from_slice(&rows[n_test..]);
    }
    train_rows.sort_unstable();
    test_rows.sort_unstable();

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), &train_rows),
        y_train: train_rows.iter().map(|&i| y[i]).collect(),
        x_test: x.select(Axis(0), &test_rows),
        y_test: test_rows.iter().map(|&i| y[i]).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(labels: &[ClassLabel]) -> (Array2<f64>, Vec<ClassLabel>) {
        let x = Array2::from_shape_fn((labels.len(), 2), |(i, j)| (i * 2 + j) as f64);
        (x, labels.to_vec())
    }

    fn count(labels: &[ClassLabel], class: ClassLabel) -> usize {
        labels.iter().filter(|&&l| l == class).count()
    }

    #[test]
    fn test_proportions_are_kept() {
        let labels: Vec<ClassLabel> = [vec![1; 10], vec![2; 10], vec![3; 10]].concat();
        let (x, y) = data(&labels);
        let split = stratified_split(&x, &y, 0.3, 10).expect("split");

        assert_eq!(split.y_test.len(), 9);
        assert_eq!(split.y_train.len(), 21);
        for class in 1..=3 {
            assert_eq!(count(&split.y_test, class), 3);
            assert_eq!(count(&split.y_train, class), 7);
        }
        assert_eq!(split.x_train.nrows(), 21);
    }

    #[test]
    fn test_largest_remainder_allocation() {
        let sizes: BTreeMap<ClassLabel, usize> = [(1, 5), (2, 4), (3, 2)].into_iter().collect();
        let allocation = allocate_test_rows(&sizes, 11, 0.3);
        // ceil(3.3) = 4 test rows: quotas 1.82, 1.45, 0.73
        assert_eq!(allocation[&1], 2);
        assert_eq!(allocation[&2], 1);
        assert_eq!(allocation[&3], 1);
        assert_eq!(allocation.values().sum::<usize>(), 4);
    }

    #[test]
    fn test_same_seed_same_split() {
        let labels: Vec<ClassLabel> = (0..40).map(|i| (i % 3 + 1) as ClassLabel).collect();
        let (x, y) = data(&labels);
        let a = stratified_split(&x, &y, 0.3, 10).expect("split");
        let b = stratified_split(&x, &y, 0.3, 10).expect("split");
        assert_eq!(a.x_test, b.x_test);
        assert_eq!(a.y_train, b.y_train);
    }

    #[test]
    fn test_singleton_class_is_rejected() {
        let (x, y) = data(&[1, 1, 1, 2, 2, 3]);
        let error = stratified_split(&x, &y, 0.3, 10).expect_err("singleton class");
        assert!(matches!(error, FiirsError::InsufficientData { .. }));
    }

    #[test]
    fn test_class_missing_from_test_is_rejected() {
        // 2 test rows for 3 classes
        let (x, y) = data(&[1, 1, 2, 2, 3, 3]);
        assert!(stratified_split(&x, &y, 0.3, 10).is_err());
    }
}
