//! Multi-algorithm evaluation on a stratified hold-out split.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::dataset::{ClassLabel, FeatureMatrix, LabelVector, Target};
use crate::model::{
    stratified_split, AdaBoost, Algorithm, Bagging, Classifier, DecisionTree, HardVoting, KNearestNeighbors,
    Mlp, Model, RandomForest, TrainTestSplit, TreeSettings,
};
use crate::utility::config::{Config, ModelsConfig};
use crate::utility::errors::{FiirsError, FiirsResult};

/// One fitted algorithm and its hold-out accuracy in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub algorithm: Algorithm,
    pub accuracy: f64,
    pub model: Model,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmAccuracy {
    pub algorithm: Algorithm,
    pub accuracy: f64,
}

/// Results of one training run, best accuracy first.
#[derive(Debug, Clone)]
pub struct TrainedModelSet {
    target: Target,
    training_width: usize,
    results: Vec<TrainedModel>,
}

impl TrainedModelSet {
    pub fn target(&self) -> Target {
        self.target
    }

    /// Feature width the models were fitted on
    pub fn training_width(&self) -> usize {
        self.training_width
    }

    pub fn results(&self) -> &[TrainedModel] {
        &self.results
    }

    pub fn best(&self) -> Option<&TrainedModel> {
        self.results.first()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn accuracies(&self) -> Vec<AlgorithmAccuracy> {
        self.results
            .iter()
            .map(|r| AlgorithmAccuracy {
                algorithm: r.algorithm,
                accuracy: r.accuracy,
            })
            .collect()
    }
}

/// Fraction of positions where both slices agree.
pub fn accuracy(predicted: &[ClassLabel], expected: &[ClassLabel]) -> f64 {
    if expected.is_empty() {
        return 0.0;
    }
    let hits = predicted.iter().zip(expected).filter(|(p, e)| p == e).count();
    hits as f64 / expected.len() as f64
}

/// Trains the configured algorithms and keeps fitted models for reuse.
///
/// The cache only lives as long as the trainer and is keyed by algorithm. It
/// is emptied whenever the training input changes, and bypassed entirely
/// when `re_evaluate` is set.
pub struct ModelTrainer {
    models: ModelsConfig,
    test_size: f64,
    seed: u64,
    re_evaluate: bool,
    algorithms: Vec<Algorithm>,
    cache: HashMap<Algorithm, Model>,
    fingerprint: Option<u64>,
}

impl ModelTrainer {
    pub fn new(config: &Config) -> FiirsResult<Self> {
        let algorithms = config
            .training
            .algorithms
            .iter()
            .map(|name| name.parse::<Algorithm>())
            .collect::<FiirsResult<Vec<_>>>()?;

        Ok(Self {
            models: config.models.clone(),
            test_size: config.training.test_set_size,
            seed: config.training.seed,
            re_evaluate: config.training.re_evaluate,
            algorithms,
            cache: HashMap::new(),
            fingerprint: None,
        })
    }

    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Number of fitted models currently held for reuse
    pub fn cached_models(&self) -> usize {
        self.cache.len()
    }

    pub fn train(&mut self, target: Target, features: &FeatureMatrix, labels: &LabelVector) -> FiirsResult<TrainedModelSet> {
        if features.tickers() != labels.tickers() {
            return Err(FiirsError::validation(
                "training",
                format!(
                    "{} feature rows are not aligned with {} labels",
                    features.n_rows(),
                    labels.len()
                ),
            ));
        }

        let started = Instant::now();
        let split = stratified_split(features.values(), labels.labels(), self.test_size, self.seed)?;
        info!(
            indicator = %target,
            train_rows = split.y_train.len(),
            test_rows = split.y_test.len(),
            width = features.width(),
            "🧠 training {} algorithms",
            self.algorithms.len()
        );

        let fingerprint = self.fingerprint_of(features, labels);
        if self.re_evaluate || self.fingerprint != Some(fingerprint) {
            self.cache.clear();
        }
        self.fingerprint = Some(fingerprint);

        let mut results = Vec::with_capacity(self.algorithms.len());
        for algorithm in self.algorithms.clone() {
            let fit_started = Instant::now();
            let model = self.fitted(algorithm, &split)?;
            let accuracy = accuracy(&model.predict(&split.x_test), &split.y_test);
            debug!(
                indicator = %target,
                algorithm = %algorithm,
                elapsed_ms = fit_started.elapsed().as_millis() as u64,
                "accuracy {:.4}",
                accuracy
            );
            results.push(TrainedModel {
                algorithm,
                accuracy,
                model,
            });
        }

        // stable: equal accuracies keep the configured order
        results.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));

        if let Some(best) = results.first() {
            info!(
                indicator = %target,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "🏆 best approach: {} ({:.2}%)",
                best.algorithm,
                best.accuracy * 100.0
            );
        }

        Ok(TrainedModelSet {
            target,
            training_width: features.width(),
            results,
        })
    }

    fn fingerprint_of(&self, features: &FeatureMatrix, labels: &LabelVector) -> u64 {
        let mut hasher = DefaultHasher::new();
        features.values().shape().hash(&mut hasher);
        for value in features.values().iter() {
            value.to_bits().hash(&mut hasher);
        }
        labels.labels().hash(&mut hasher);
        hasher.finish()
    }

    /// Cached model for `algorithm`, fitting and caching it when absent.
    fn fitted(&mut self, algorithm: Algorithm, split: &TrainTestSplit) -> FiirsResult<Model> {
        if let Some(model) = self.cache.get(&algorithm) {
            debug!(algorithm = %algorithm, "reusing cached model");
            return Ok(model.clone());
        }

        let (x, y) = (&split.x_train, split.y_train.as_slice());
        let models = &self.models;
        let tree_settings = TreeSettings::from_config(&models.decision_tree);
        let model = match algorithm {
            Algorithm::DecisionTree => Model::DecisionTree(DecisionTree::fit(x, y, tree_settings, self.seed)?),
            Algorithm::Mlp => Model::Mlp(Mlp::fit(x, y, &models.mlp, self.seed)?),
            Algorithm::Knn => Model::Knn(KNearestNeighbors::fit(x, y, &models.knn)?),
            Algorithm::RandomForest => Model::RandomForest(RandomForest::fit(x, y, &models.random_forest, self.seed)?),
            Algorithm::Boosting => Model::Boosting(AdaBoost::fit(x, y, &models.boosting, self.seed)?),
            Algorithm::Bagging => Model::Bagging(Bagging::fit(x, y, tree_settings, &models.bagging, self.seed)?),
            Algorithm::Voting => {
                let Model::DecisionTree(tree) = self.fitted(Algorithm::DecisionTree, split)? else {
                    return Err(FiirsError::general("cached decision_tree entry holds another family"));
                };
                let Model::Mlp(mlp) = self.fitted(Algorithm::Mlp, split)? else {
                    return Err(FiirsError::general("cached mlp entry holds another family"));
                };
                let Model::Knn(knn) = self.fitted(Algorithm::Knn, split)? else {
                    return Err(FiirsError::general("cached knn entry holds another family"));
                };
                Model::Voting(HardVoting::new(tree, mlp, knn))
            }
        };

        self.cache.insert(algorithm, model.clone());
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::decision_tree::tests::clusters;

    fn matrix() -> (FeatureMatrix, LabelVector) {
        let (x, y) = clusters();
        let tickers: Vec<String> = (0..y.len()).map(|i| format!("FUND{:02}11", i)).collect();
        let rows = tickers
            .iter()
            .zip(x.rows())
            .map(|(ticker, row)| (ticker.clone(), row.to_vec()))
            .collect();
        let labels = LabelVector::new(tickers, y).expect("aligned");
        (FeatureMatrix::from_rows(rows), labels)
    }

    fn config(algorithms: &[&str]) -> Config {
        let mut config = Config::default();
        config.training.algorithms = algorithms.iter().map(|a| a.to_string()).collect();
        config.models.mlp.max_iter = 500;
        config
    }

    #[test]
    fn test_trains_every_algorithm_ranked() {
        let (features, labels) = matrix();
        let mut trainer = ModelTrainer::new(&config(&[
            "decision_tree",
            "mlp",
            "knn",
            "voting",
            "bagging",
            "boosting",
            "random_forest",
        ]))
        .expect("trainer");

        let set = trainer.train(Target::Beta, &features, &labels).expect("train");
        assert_eq!(set.len(), 7);
        assert_eq!(set.training_width(), 2);
        assert_eq!(set.target(), Target::Beta);

        let accuracies: Vec<f64> = set.results().iter().map(|r| r.accuracy).collect();
        assert!(accuracies.windows(2).all(|w| w[0] >= w[1]));
        assert!(accuracies.iter().all(|a| (0.0..=1.0).contains(a)));
        // well separated clusters
        assert_eq!(set.best().map(|b| b.accuracy), Some(1.0));
    }

    #[test]
    fn test_training_is_deterministic() {
        let (features, labels) = matrix();
        let algorithms = ["decision_tree", "knn", "bagging", "random_forest"];

        let first = ModelTrainer::new(&config(&algorithms))
            .expect("trainer")
            .train(Target::DividendYield, &features, &labels)
            .expect("train");
        let second = ModelTrainer::new(&config(&algorithms))
            .expect("trainer")
            .train(Target::DividendYield, &features, &labels)
            .expect("train");

        let order = |set: &TrainedModelSet| -> Vec<(Algorithm, f64)> {
            set.results().iter().map(|r| (r.algorithm, r.accuracy)).collect()
        };
        assert_eq!(order(&first), order(&second));
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let result = ModelTrainer::new(&config(&["knn", "svm"]));
        assert!(matches!(result, Err(FiirsError::InvalidAlgorithm { .. })));
    }

    #[test]
    fn test_voting_fills_cache_with_members() {
        let (features, labels) = matrix();
        let mut trainer = ModelTrainer::new(&config(&["voting"])).expect("trainer");
        trainer.train(Target::Beta, &features, &labels).expect("train");
        // tree, mlp, knn and the ensemble itself
        assert_eq!(trainer.cached_models(), 4);
    }

    #[test]
    fn test_cache_cleared_when_labels_change() {
        let (features, labels) = matrix();
        let mut trainer = ModelTrainer::new(&config(&["decision_tree"])).expect("trainer");
        trainer.train(Target::Beta, &features, &labels).expect("train");
        assert_eq!(trainer.cached_models(), 1);

        let flipped: Vec<ClassLabel> = labels.labels().iter().map(|l| 4 - l).collect();
        let other = LabelVector::new(labels.tickers().to_vec(), flipped).expect("aligned");
        let set = trainer.train(Target::DividendYield, &features, &other).expect("train");
        assert_eq!(trainer.cached_models(), 1);
        assert_eq!(set.best().map(|b| b.accuracy), Some(1.0));
    }

    #[test]
    fn test_misaligned_labels_are_rejected() {
        let (features, labels) = matrix();
        let shorter = LabelVector::new(labels.tickers()[1..].to_vec(), labels.labels()[1..].to_vec()).expect("aligned");
        let mut trainer = ModelTrainer::new(&config(&["knn"])).expect("trainer");
        assert!(trainer.train(Target::Beta, &features, &shorter).is_err());
    }

    #[test]
    fn test_accuracy_of_empty_input() {
        assert_eq!(accuracy(&[], &[]), 0.0);
        assert_eq!(accuracy(&[1, 2, 3, 3], &[1, 2, 3, 1]), 0.75);
    }
}
