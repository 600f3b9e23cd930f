use ndarray::{Array2, ArrayView1};

use super::{majority_vote, Classifier};
use crate::dataset::ClassLabel;
use crate::utility::config::KnnConfig;
use crate::utility::errors::{FiirsError, FiirsResult};

/// Euclidean k-nearest-neighbours with uniform weights.
#[derive(Debug, Clone)]
pub struct KNearestNeighbors {
    k: usize,
    x: Array2<f64>,
    y: Vec<ClassLabel>,
}

impl KNearestNeighbors {
    pub fn fit(x: &Array2<f64>, y: &[ClassLabel], config: &KnnConfig) -> FiirsResult<Self> {
        if x.nrows() != y.len() || y.is_empty() {
            return Err(FiirsError::insufficient_data(
                "knn",
                format!("{} rows for {} labels", x.nrows(), y.len()),
            ));
        }
        Ok(Self {
            k: config.k.min(y.len()),
            x: x.to_owned(),
            y: y.to_vec(),
        })
    }
}

impl Classifier for KNearestNeighbors {
    fn predict_one(&self, row: ArrayView1<'_, f64>) -> ClassLabel {
        let mut distances: Vec<(f64, usize)> = self
            .x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, sample)| {
                let d: f64 = sample
                    .iter()
                    .zip(row.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (d, i)
            })
            .collect();
        // ties on distance keep the earlier training row
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let votes: Vec<ClassLabel> = distances.iter().take(self.k).map(|(_, i)| self.y[*i]).collect();
        majority_vote(&votes).unwrap_or(self.y[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_three_nearest_vote() {
        let x = array![[0.0], [0.1], [0.2], [5.0], [5.1], [9.0]];
        let y = [1, 1, 2, 2, 2, 3];
        let knn = KNearestNeighbors::fit(&x, &y, &KnnConfig::default()).expect("fit");

        assert_eq!(knn.predict_one(array![0.05].view()), 1);
        assert_eq!(knn.predict_one(array![5.05].view()), 2);
        // neighbours 9.0, 5.1, 5.0 vote 3, 2, 2
        assert_eq!(knn.predict_one(array![8.0].view()), 2);
    }

    #[test]
    fn test_vote_tie_goes_to_smallest_label() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = [3, 1, 2];
        let knn = KNearestNeighbors::fit(&x, &y, &KnnConfig::default()).expect("fit");
        assert_eq!(knn.predict_one(array![1.0].view()), 1);
    }

    #[test]
    fn test_k_capped_by_training_size() {
        let x = array![[0.0], [1.0]];
        let knn = KNearestNeighbors::fit(&x, &[2, 2], &KnnConfig { k: 5 }).expect("fit");
        assert_eq!(knn.predict_one(array![0.4].view()), 2);
    }
}
