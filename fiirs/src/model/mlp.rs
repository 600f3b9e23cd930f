//! Single hidden layer perceptron trained with Adam on cross-entropy.

use ndarray::{Array, Array1, Array2, ArrayView1, Axis, Dimension, Zip};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::{argmax, class_list, Classifier};
use crate::dataset::ClassLabel;
use crate::utility::config::MlpConfig;
use crate::utility::errors::{FiirsError, FiirsResult};

const BETA_1: f64 = 0.9;
const BETA_2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
const PROBABILITY_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct Mlp {
    classes: Vec<ClassLabel>,
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
    n_iter: usize,
    loss: f64,
}

struct AdamSlot<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> AdamSlot<D> {
    fn for_param(param: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    fn step(&mut self, param: &mut Array<f64, D>, grad: &Array<f64, D>, lr_t: f64) {
        Zip::from(param)
            .and(grad)
            .and(&mut self.m)
            .and(&mut self.v)
            .for_each(|p, &g, m, v| {
                *m = BETA_1 * *m + (1.0 - BETA_1) * g;
                *v = BETA_2 * *v + (1.0 - BETA_2) * g * g;
                *p -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
            });
    }
}

fn glorot_uniform(rng: &mut ChaCha8Rng, fan_in: usize, fan_out: usize) -> (Array2<f64>, Array1<f64>) {
    let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
    let weights = Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-bound..bound));
    let bias = Array1::from_shape_fn(fan_out, |_| rng.gen_range(-bound..bound));
    (weights, bias)
}

fn softmax_rows(logits: &mut Array2<f64>) {
    for mut row in logits.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

impl Mlp {
    pub fn fit(x: &Array2<f64>, y: &[ClassLabel], config: &MlpConfig, seed: u64) -> FiirsResult<Self> {
        let (n, d) = x.dim();
        if n != y.len() || n == 0 {
            return Err(FiirsError::insufficient_data(
                "mlp",
                format!("{} rows for {} labels", n, y.len()),
            ));
        }

        let classes = class_list(y);
        let k = classes.len();
        let mut one_hot = Array2::<f64>::zeros((n, k));
        for (i, label) in y.iter().enumerate() {
            if let Some(j) = classes.iter().position(|c| c == label) {
                one_hot[[i, j]] = 1.0;
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (mut w1, mut b1) = glorot_uniform(&mut rng, d, config.hidden_units);
        let (mut w2, mut b2) = glorot_uniform(&mut rng, config.hidden_units, k);
        let mut adam_w1 = AdamSlot::for_param(&w1);
        let mut adam_b1 = AdamSlot::for_param(&b1);
        let mut adam_w2 = AdamSlot::for_param(&w2);
        let mut adam_b2 = AdamSlot::for_param(&b2);

        let batch_size = config.batch_size.clamp(1, n);
        let alpha = config.alpha;
        let mut order: Vec<usize> = (0..n).collect();
        let mut step = 0i32;
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0usize;
        let mut loss = f64::INFINITY;
        let mut n_iter = 0usize;

        for _ in 0..config.max_iter {
            n_iter += 1;
            order.shuffle(&mut rng);
            let mut accumulated = 0.0;

            for batch in order.chunks(batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = one_hot.select(Axis(0), batch);
                let nb = batch.len() as f64;

                let mut hidden = xb.dot(&w1);
                hidden += &b1;
                hidden.mapv_inplace(|v| v.max(0.0));
                let mut probabilities = hidden.dot(&w2);
                probabilities += &b2;
                softmax_rows(&mut probabilities);

                let cross_entropy =
                    -(&yb * &probabilities.mapv(|p| p.max(PROBABILITY_FLOOR).ln())).sum() / nb;
                let penalty =
                    0.5 * alpha * (w1.iter().map(|v| v * v).sum::<f64>() + w2.iter().map(|v| v * v).sum::<f64>()) / nb;
                accumulated += (cross_entropy + penalty) * nb;

                let delta_out = (&probabilities - &yb) / nb;
                let grad_w2 = hidden.t().dot(&delta_out) + &(&w2 * (alpha / nb));
                let grad_b2 = delta_out.sum_axis(Axis(0));

                let mut delta_hidden = delta_out.dot(&w2.t());
                Zip::from(&mut delta_hidden).and(&hidden).for_each(|delta, &h| {
                    if h <= 0.0 {
                        *delta = 0.0;
                    }
                });
                let grad_w1 = xb.t().dot(&delta_hidden) + &(&w1 * (alpha / nb));
                let grad_b1 = delta_hidden.sum_axis(Axis(0));

                step += 1;
                let lr_t = config.learning_rate * (1.0 - BETA_2.powi(step)).sqrt() / (1.0 - BETA_1.powi(step));
                adam_w1.step(&mut w1, &grad_w1, lr_t);
                adam_b1.step(&mut b1, &grad_b1, lr_t);
                adam_w2.step(&mut w2, &grad_w2, lr_t);
                adam_b2.step(&mut b2, &grad_b2, lr_t);
            }

            loss = accumulated / n as f64;
            if loss > best_loss - config.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            if loss < best_loss {
                best_loss = loss;
            }
            if no_improvement > config.n_iter_no_change {
                break;
            }
        }

        debug!("mlp converged after {} epochs, loss {:.6}", n_iter, loss);
        Ok(Self {
            classes,
            w1,
            b1,
            w2,
            b2,
            n_iter,
            loss,
        })
    }

    /// Epochs actually run
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn loss(&self) -> f64 {
        self.loss
    }
}

impl Classifier for Mlp {
    fn predict_one(&self, row: ArrayView1<'_, f64>) -> ClassLabel {
        let mut hidden = row.dot(&self.w1) + &self.b1;
        hidden.mapv_inplace(|v| v.max(0.0));
        let logits = hidden.dot(&self.w2) + &self.b2;
        let scores: Vec<f64> = logits.to_vec();
        self.classes[argmax(&scores)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_groups() -> (Array2<f64>, Vec<ClassLabel>) {
        let x = array![[-2.0], [-1.8], [-1.5], [-1.2], [-1.0], [1.0], [1.2], [1.5], [1.8], [2.0]];
        let y = vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2];
        (x, y)
    }

    fn config() -> MlpConfig {
        MlpConfig {
            learning_rate: 0.01,
            max_iter: 2000,
            tol: 1e-6,
            ..MlpConfig::default()
        }
    }

    #[test]
    fn test_learns_separable_groups() {
        let (x, y) = two_groups();
        let mlp = Mlp::fit(&x, &y, &config(), 10).expect("fit");
        assert_eq!(mlp.predict(&x), y);
        assert!(mlp.n_iter() <= 2000);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = two_groups();
        let a = Mlp::fit(&x, &y, &config(), 3).expect("fit");
        let b = Mlp::fit(&x, &y, &config(), 3).expect("fit");
        assert_eq!(a.loss(), b.loss());
        assert_eq!(a.n_iter(), b.n_iter());
    }

    #[test]
    fn test_max_iter_bounds_training() {
        let (x, y) = two_groups();
        let short = MlpConfig {
            max_iter: 5,
            ..config()
        };
        let mlp = Mlp::fit(&x, &y, &short, 1).expect("fit");
        assert_eq!(mlp.n_iter(), 5);
    }
}
