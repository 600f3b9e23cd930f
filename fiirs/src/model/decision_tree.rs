//! CART classifier with Gini impurity and optional sample weights.
//!
//! The forest, bagging and boosting ensembles grow their members through
//! [`DecisionTree::fit_weighted`].

use ndarray::{Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{argmax, class_list, Classifier};
use crate::dataset::ClassLabel;
use crate::utility::config::DecisionTreeConfig;
use crate::utility::errors::{FiirsError, FiirsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSettings {
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_depth: Option<usize>,
    /// Features examined per split; all when `None`
    pub max_features: Option<usize>,
}

impl TreeSettings {
    pub fn from_config(config: &DecisionTreeConfig) -> Self {
        Self {
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_depth: config.max_depth,
            max_features: None,
        }
    }

    /// Fully grown tree
    pub fn unrestricted() -> Self {
        Self {
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_depth: None,
            max_features: None,
        }
    }

    /// Depth-one tree
    pub fn stump() -> Self {
        Self {
            max_depth: Some(1),
            ..Self::unrestricted()
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        probabilities: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    classes: Vec<ClassLabel>,
    root: Node,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    class_index: Vec<usize>,
    weights: &'a [f64],
    n_classes: usize,
    settings: TreeSettings,
    rng: &'a mut ChaCha8Rng,
}

fn gini(class_weights: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - class_weights.iter().map(|w| (w / total).powi(2)).sum::<f64>()
}

impl TreeBuilder<'_> {
    fn class_weights(&self, rows: &[usize]) -> Vec<f64> {
        let mut weights = vec![0.0; self.n_classes];
        for &row in rows {
            weights[self.class_index[row]] += self.weights[row];
        }
        weights
    }

    fn build(&mut self, rows: Vec<usize>, depth: usize) -> Node {
        let class_weights = self.class_weights(&rows);
        let total: f64 = class_weights.iter().sum();
        let impurity = gini(&class_weights, total);

        let depth_reached = self.settings.max_depth.is_some_and(|max| depth >= max);
        if depth_reached
            || rows.len() < self.settings.min_samples_split
            || rows.len() < 2 * self.settings.min_samples_leaf
            || impurity <= 1e-12
        {
            return Self::leaf(class_weights, total);
        }

        let Some(split) = self.best_split(&rows, total) else {
            return Self::leaf(class_weights, total);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&row| self.x[[row, split.feature]] <= split.threshold);

        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }

    fn leaf(class_weights: Vec<f64>, total: f64) -> Node {
        let probabilities = if total > 0.0 {
            class_weights.iter().map(|w| w / total).collect()
        } else {
            class_weights
        };
        Node::Leaf { probabilities }
    }

    fn best_split(&mut self, rows: &[usize], total: f64) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut *self.rng);
        let budget = self.settings.max_features.unwrap_or(features.len()).max(1);

        let mut best: Option<SplitCandidate> = None;
        for (visited, &feature) in features.iter().enumerate() {
            // keep looking past the budget only while nothing valid was found
            if visited >= budget && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_threshold(rows, feature, total) {
                if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn best_threshold(&self, rows: &[usize], feature: usize, total: f64) -> Option<SplitCandidate> {
        let min_leaf = self.settings.min_samples_leaf;
        let mut sorted: Vec<(f64, usize)> = rows.iter().map(|&r| (self.x[[r, feature]], r)).collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = sorted.len();
        let mut left = vec![0.0; self.n_classes];
        let mut right = self.class_weights(rows);
        let mut best: Option<SplitCandidate> = None;

        for i in 0..n.saturating_sub(1) {
            let (value, row) = sorted[i];
            let w = self.weights[row];
            left[self.class_index[row]] += w;
            right[self.class_index[row]] -= w;

            let next = sorted[i + 1].0;
            if !(value < next) {
                continue;
            }
            let left_count = i + 1;
            if left_count < min_leaf {
                continue;
            }
            if n - left_count < min_leaf {
                break;
            }

            let left_total: f64 = left.iter().sum();
            let right_total = total - left_total;
            let impurity =
                (left_total * gini(&left, left_total) + right_total * gini(&right, right_total)) / total;

            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let midpoint = value + (next - value) / 2.0;
                let threshold = if midpoint >= next { value } else { midpoint };
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
        best
    }
}

impl DecisionTree {
    /// Fits on every row with unit weight.
    pub fn fit(x: &Array2<f64>, y: &[ClassLabel], settings: TreeSettings, seed: u64) -> FiirsResult<Self> {
        let weights = vec![1.0; y.len()];
        let classes = class_list(y);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self::fit_weighted(x, y, &weights, &classes, settings, &mut rng)
    }

    /// Fits on the rows with a positive weight. `classes` fixes the layout of
    /// the leaf probabilities, so ensemble members agree on it even when a
    /// resample misses a class.
    pub fn fit_weighted(
        x: &Array2<f64>,
        y: &[ClassLabel],
        weights: &[f64],
        classes: &[ClassLabel],
        settings: TreeSettings,
        rng: &mut ChaCha8Rng,
    ) -> FiirsResult<Self> {
        if x.nrows() != y.len() || y.len() != weights.len() {
            return Err(FiirsError::validation(
                "decision_tree",
                format!("{} rows, {} labels, {} weights", x.nrows(), y.len(), weights.len()),
            ));
        }

        let class_index = y
            .iter()
            .map(|label| {
                classes.iter().position(|c| c == label).ok_or_else(|| {
                    FiirsError::validation("decision_tree", format!("label {} not in class list", label))
                })
            })
            .collect::<FiirsResult<Vec<usize>>>()?;

        let rows: Vec<usize> = (0..y.len()).filter(|&i| weights[i] > 0.0).collect();
        if rows.is_empty() {
            return Err(FiirsError::insufficient_data("decision_tree", "no weighted rows to fit"));
        }

        let mut builder = TreeBuilder {
            x,
            class_index,
            weights,
            n_classes: classes.len(),
            settings,
            rng,
        };
        let root = builder.build(rows, 0);

        Ok(Self {
            classes: classes.to_vec(),
            root,
        })
    }

    pub fn classes(&self) -> &[ClassLabel] {
        &self.classes
    }

    /// Leaf class distribution reached by `row`, aligned with [`Self::classes`].
    pub fn predict_proba(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { probabilities } => return probabilities,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn depth_of(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        depth_of(&self.root)
    }
}

impl Classifier for DecisionTree {
    fn predict_one(&self, row: ArrayView1<'_, f64>) -> ClassLabel {
        self.classes[argmax(self.predict_proba(row))]
    }
}
