use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::bagging::{average_proba, bootstrap_weights};
use super::decision_tree::{DecisionTree, TreeSettings};
use super::{argmax, class_list, Classifier};
use crate::dataset::ClassLabel;
use crate::utility::config::EnsembleConfig;
use crate::utility::errors::{FiirsError, FiirsResult};

/// Fully grown trees on bootstrap samples, √features examined per split.
#[derive(Debug, Clone)]
pub struct RandomForest {
    classes: Vec<ClassLabel>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn fit(x: &Array2<f64>, y: &[ClassLabel], config: &EnsembleConfig, seed: u64) -> FiirsResult<Self> {
        if x.nrows() != y.len() || y.is_empty() {
            return Err(FiirsError::insufficient_data(
                "random_forest",
                format!("{} rows for {} labels", x.nrows(), y.len()),
            ));
        }

        let max_features = ((x.ncols() as f64).sqrt() as usize).max(1);
        let settings = TreeSettings {
            max_features: Some(max_features),
            ..TreeSettings::unrestricted()
        };

        let classes = class_list(y);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(config.n_estimators);
        for _ in 0..config.n_estimators {
            let weights = bootstrap_weights(y.len(), &mut rng);
            let mut tree_rng = ChaCha8Rng::seed_from_u64(rng.gen());
            trees.push(DecisionTree::fit_weighted(x, y, &weights, &classes, settings, &mut tree_rng)?);
        }

        Ok(Self { classes, trees })
    }

    pub fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        average_proba(&self.trees, self.classes.len(), row)
    }
}

impl Classifier for RandomForest {
    fn predict_one(&self, row: ArrayView1<'_, f64>) -> ClassLabel {
        self.classes[argmax(&self.predict_proba(row))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::decision_tree::tests::clusters;
    use ndarray::array;

    #[test]
    fn test_forest_fits_clusters() {
        let (x, y) = clusters();
        let forest = RandomForest::fit(&x, &y, &EnsembleConfig::default(), 10).expect("fit");
        assert_eq!(forest.predict(&x), y);

        let proba = forest.predict_proba(array![0.1, -0.1].view());
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(proba[0] > 0.5);
    }
}
