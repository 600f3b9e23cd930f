//! AdaBoost with the multi-class SAMME update over decision stumps.

use ndarray::{Array2, ArrayView1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::decision_tree::{DecisionTree, TreeSettings};
use super::{argmax, class_list, Classifier};
use crate::dataset::ClassLabel;
use crate::utility::config::BoostingConfig;
use crate::utility::errors::{FiirsError, FiirsResult};

#[derive(Debug, Clone)]
pub struct AdaBoost {
    classes: Vec<ClassLabel>,
    stumps: Vec<(DecisionTree, f64)>,
}

impl AdaBoost {
    pub fn fit(x: &Array2<f64>, y: &[ClassLabel], config: &BoostingConfig, seed: u64) -> FiirsResult<Self> {
        let n = y.len();
        if x.nrows() != n || n == 0 {
            return Err(FiirsError::insufficient_data(
                "boosting",
                format!("{} rows for {} labels", x.nrows(), n),
            ));
        }

        let classes = class_list(y);
        let k = classes.len().max(2) as f64;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut weights = vec![1.0 / n as f64; n];
        let mut stumps = Vec::with_capacity(config.n_estimators);

        for round in 0..config.n_estimators {
            let total: f64 = weights.iter().sum();
            if total <= 0.0 {
                break;
            }
            weights.iter_mut().for_each(|w| *w /= total);

            let stump = DecisionTree::fit_weighted(x, y, &weights, &classes, TreeSettings::stump(), &mut rng)?;
            let missed: Vec<bool> = x
                .rows()
                .into_iter()
                .zip(y)
                .map(|(row, label)| stump.predict_one(row) != *label)
                .collect();
            let error: f64 = weights.iter().zip(&missed).filter(|(_, m)| **m).map(|(w, _)| w).sum();

            if error <= 0.0 {
                stumps.push((stump, 1.0));
                break;
            }
            if error >= 1.0 - 1.0 / k {
                // worse than chance: stop, keeping a lone first stump
                if stumps.is_empty() {
                    stumps.push((stump, 1.0));
                }
                break;
            }

            let estimator_weight = config.learning_rate * (((1.0 - error) / error).ln() + (k - 1.0).ln());
            stumps.push((stump, estimator_weight));

            if round + 1 < config.n_estimators {
                for (w, missed) in weights.iter_mut().zip(&missed) {
                    if *missed {
                        *w *= estimator_weight.exp();
                    }
                }
            }
        }

        debug!("boosting kept {} stumps", stumps.len());
        Ok(Self { classes, stumps })
    }

    pub fn n_estimators(&self) -> usize {
        self.stumps.len()
    }
}

impl Classifier for AdaBoost {
    fn predict_one(&self, row: ArrayView1<'_, f64>) -> ClassLabel {
        let mut scores = vec![0.0; self.classes.len()];
        for (stump, weight) in &self.stumps {
            let label = stump.predict_one(row);
            if let Some(i) = self.classes.iter().position(|c| *c == label) {
                scores[i] += weight;
            }
        }
        self.classes[argmax(&scores)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::decision_tree::tests::clusters;
    use ndarray::array;

    #[test]
    fn test_perfect_stump_stops_early() {
        let x = array![[0.0], [0.5], [1.0], [3.0], [3.5], [4.0]];
        let y = [2, 2, 2, 3, 3, 3];
        let model = AdaBoost::fit(&x, &y, &BoostingConfig::default(), 10).expect("fit");
        assert_eq!(model.n_estimators(), 1);
        assert_eq!(model.predict(&x), y.to_vec());
    }

    #[test]
    fn test_three_classes_deterministic() {
        let (x, y) = clusters();
        let a = AdaBoost::fit(&x, &y, &BoostingConfig::default(), 10).expect("fit");
        let b = AdaBoost::fit(&x, &y, &BoostingConfig::default(), 10).expect("fit");
        let pa = a.predict(&x);
        assert_eq!(pa, b.predict(&x));
        assert!(pa.iter().all(|label| (1..=3).contains(label)));
        assert!(a.n_estimators() >= 2);
    }
}
