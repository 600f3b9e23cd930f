use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::decision_tree::{DecisionTree, TreeSettings};
use super::{argmax, class_list, Classifier};
use crate::dataset::ClassLabel;
use crate::utility::config::EnsembleConfig;
use crate::utility::errors::{FiirsError, FiirsResult};

/// Draws `n` rows with replacement; the weight of a row is how often it was drawn.
pub(super) fn bootstrap_weights(n: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
    let mut weights = vec![0.0; n];
    for _ in 0..n {
        weights[rng.gen_range(0..n)] += 1.0;
    }
    weights
}

/// Class probabilities averaged over every tree.
pub(super) fn average_proba(trees: &[DecisionTree], n_classes: usize, row: ArrayView1<'_, f64>) -> Vec<f64> {
    let mut total = vec![0.0; n_classes];
    for tree in trees {
        for (sum, p) in total.iter_mut().zip(tree.predict_proba(row)) {
            *sum += p;
        }
    }
    let count = trees.len().max(1) as f64;
    total.iter().map(|s| s / count).collect()
}

/// Bootstrap replicas of one decision tree configuration.
#[derive(Debug, Clone)]
pub struct Bagging {
    classes: Vec<ClassLabel>,
    trees: Vec<DecisionTree>,
}

impl Bagging {
    pub fn fit(
        x: &Array2<f64>,
        y: &[ClassLabel],
        base: TreeSettings,
        config: &EnsembleConfig,
        seed: u64,
    ) -> FiirsResult<Self> {
        if x.nrows() != y.len() || y.is_empty() {
            return Err(FiirsError::insufficient_data(
                "bagging",
                format!("{} rows for {} labels", x.nrows(), y.len()),
            ));
        }

        let classes = class_list(y);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(config.n_estimators);
        for _ in 0..config.n_estimators {
            let weights = bootstrap_weights(y.len(), &mut rng);
            let mut tree_rng = ChaCha8Rng::seed_from_u64(rng.gen());
            trees.push(DecisionTree::fit_weighted(x, y, &weights, &classes, base, &mut tree_rng)?);
        }

        Ok(Self { classes, trees })
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for Bagging {
    fn predict_one(&self, row: ArrayView1<'_, f64>) -> ClassLabel {
        let proba = average_proba(&self.trees, self.classes.len(), row);
        self.classes[argmax(&proba)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::decision_tree::tests::clusters;
    use crate::utility::config::DecisionTreeConfig;

    #[test]
    fn test_bootstrap_weights_sum_to_n() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let weights = bootstrap_weights(30, &mut rng);
        assert_eq!(weights.iter().sum::<f64>(), 30.0);
        assert!(weights.iter().any(|w| *w == 0.0));
    }

    #[test]
    fn test_bagging_fits_clusters() {
        let (x, y) = clusters();
        let base = TreeSettings::from_config(&DecisionTreeConfig::default());
        let model = Bagging::fit(&x, &y, base, &EnsembleConfig::default(), 10).expect("fit");
        assert_eq!(model.n_estimators(), 50);
        assert_eq!(model.predict(&x), y);
    }
}
