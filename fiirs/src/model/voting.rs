use ndarray::ArrayView1;

use super::decision_tree::DecisionTree;
use super::knn::KNearestNeighbors;
use super::mlp::Mlp;
use super::{majority_vote, Classifier};
use crate::dataset::ClassLabel;

/// Hard majority vote over the tree, the perceptron and kNN.
#[derive(Debug, Clone)]
pub struct HardVoting {
    tree: DecisionTree,
    mlp: Mlp,
    knn: KNearestNeighbors,
}

impl HardVoting {
    pub fn new(tree: DecisionTree, mlp: Mlp, knn: KNearestNeighbors) -> Self {
        Self { tree, mlp, knn }
    }
}

impl Classifier for HardVoting {
    fn predict_one(&self, row: ArrayView1<'_, f64>) -> ClassLabel {
        let votes = [
            self.tree.predict_one(row),
            self.mlp.predict_one(row),
            self.knn.predict_one(row),
        ];
        majority_vote(&votes).unwrap_or(votes[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::decision_tree::tests::clusters;
    use crate::model::decision_tree::TreeSettings;
    use crate::utility::config::{DecisionTreeConfig, KnnConfig, MlpConfig};

    #[test]
    fn test_voting_follows_the_majority() {
        let (x, y) = clusters();
        let tree = DecisionTree::fit(&x, &y, TreeSettings::from_config(&DecisionTreeConfig::default()), 10)
            .expect("tree");
        let knn = KNearestNeighbors::fit(&x, &y, &KnnConfig::default()).expect("knn");
        let mlp = Mlp::fit(&x, &y, &MlpConfig { max_iter: 3, ..MlpConfig::default() }, 10).expect("mlp");

        let voting = HardVoting::new(tree, mlp, knn);
        // tree and kNN agree on every training row, so they outvote the perceptron
        assert_eq!(voting.predict(&x), y);
    }
}
