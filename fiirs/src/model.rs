//! Classifier families evaluated by the trainer.

pub mod bagging;
pub mod boosting;
pub mod decision_tree;
pub mod knn;
pub mod mlp;
pub mod random_forest;
pub mod split;
pub mod voting;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::dataset::ClassLabel;
use crate::utility::errors::FiirsError;

pub use bagging::Bagging;
pub use boosting::AdaBoost;
pub use decision_tree::{DecisionTree, TreeSettings};
pub use knn::KNearestNeighbors;
pub use mlp::Mlp;
pub use random_forest::RandomForest;
pub use split::{stratified_split, TrainTestSplit};
pub use voting::HardVoting;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    DecisionTree,
    Mlp,
    Knn,
    Voting,
    Bagging,
    Boosting,
    RandomForest,
}

impl Algorithm {
    pub const ALL: [Algorithm; 7] = [
        Algorithm::DecisionTree,
        Algorithm::Mlp,
        Algorithm::Knn,
        Algorithm::Voting,
        Algorithm::Bagging,
        Algorithm::Boosting,
        Algorithm::RandomForest,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::DecisionTree => "decision_tree",
            Algorithm::Mlp => "mlp",
            Algorithm::Knn => "knn",
            Algorithm::Voting => "voting",
            Algorithm::Bagging => "bagging",
            Algorithm::Boosting => "boosting",
            Algorithm::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = FiirsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Algorithm::ALL
            .iter()
            .copied()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| FiirsError::invalid_algorithm(s))
    }
}

/// Fitted model able to classify one feature row.
pub trait Classifier {
    fn predict_one(&self, row: ArrayView1<'_, f64>) -> ClassLabel;

    fn predict(&self, x: &Array2<f64>) -> Vec<ClassLabel> {
        x.rows().into_iter().map(|row| self.predict_one(row)).collect()
    }
}

/// Any fitted classifier family
#[derive(Debug, Clone)]
pub enum Model {
    DecisionTree(DecisionTree),
    Mlp(Mlp),
    Knn(KNearestNeighbors),
    Voting(HardVoting),
    Bagging(Bagging),
    Boosting(AdaBoost),
    RandomForest(RandomForest),
}

impl Model {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Model::DecisionTree(_) => Algorithm::DecisionTree,
            Model::Mlp(_) => Algorithm::Mlp,
            Model::Knn(_) => Algorithm::Knn,
            Model::Voting(_) => Algorithm::Voting,
            Model::Bagging(_) => Algorithm::Bagging,
            Model::Boosting(_) => Algorithm::Boosting,
            Model::RandomForest(_) => Algorithm::RandomForest,
        }
    }
}

impl Classifier for Model {
    fn predict_one(&self, row: ArrayView1<'_, f64>) -> ClassLabel {
        match self {
            Model::DecisionTree(m) => m.predict_one(row),
            Model::Mlp(m) => m.predict_one(row),
            Model::Knn(m) => m.predict_one(row),
            Model::Voting(m) => m.predict_one(row),
            Model::Bagging(m) => m.predict_one(row),
            Model::Boosting(m) => m.predict_one(row),
            Model::RandomForest(m) => m.predict_one(row),
        }
    }
}

/// Sorted distinct labels
pub fn class_list(y: &[ClassLabel]) -> Vec<ClassLabel> {
    let mut classes = y.to_vec();
    classes.sort_unstable();
    classes.dedup();
    classes
}

/// Index of the largest score, ties resolved to the lowest index.
pub fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, score) in scores.iter().enumerate().skip(1) {
        if *score > scores[best] {
            best = i;
        }
    }
    best
}

/// Majority label; ties go to the smallest label.
pub fn majority_vote(votes: &[ClassLabel]) -> Option<ClassLabel> {
    let classes = class_list(votes);
    let counts: Vec<f64> = classes
        .iter()
        .map(|c| votes.iter().filter(|v| *v == c).count() as f64)
        .collect();
    classes.get(argmax(&counts)).copied()
}
