//! Continuous indicators to ordinal classes.
//!
//! The default strategy cuts each series at its own empirical terciles.
//! Quantiles interpolate linearly between order statistics
//! (`h = (n - 1) * q`); bins are right-closed and the lowest bin also
//! includes its left edge. Labels run 3 (lowest third) to 1 (highest third).

use serde::{Deserialize, Serialize};

use super::{ClassLabel, Target};
use crate::utility::config::BinningConfig;

pub const TERCILE_CUTS: [f64; 4] = [0.0, 0.33, 0.67, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningStrategy {
    Tercile,
    /// Absolute thresholds from the first version of the pipeline
    FixedRange,
}

/// `[lower, upper)` mapped to `label`; no upper bound means infinity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassRange {
    pub label: ClassLabel,
    pub lower: f64,
    #[serde(default)]
    pub upper: Option<f64>,
}

impl ClassRange {
    pub fn new(label: ClassLabel, lower: f64, upper: Option<f64>) -> Self {
        Self { label, lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && self.upper.map_or(true, |upper| value < upper)
    }
}

/// Linear-interpolation quantile of an ascending, NaN-free slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = h.floor() as usize;
    let upper = h.ceil() as usize;
    let fraction = h - lower as f64;
    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// Tercile classes; non-finite values stay unclassified.
pub fn tercile_labels(values: &[f64]) -> Vec<Option<ClassLabel>> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let edges: Vec<f64> = match TERCILE_CUTS
        .iter()
        .map(|&q| quantile(&sorted, q))
        .collect::<Option<Vec<f64>>>()
    {
        Some(edges) => edges,
        None => return vec![None; values.len()],
    };

    values
        .iter()
        .map(|&value| {
            if !value.is_finite() {
                return None;
            }
            // bins ascending: [e0, e1], (e1, e2], (e2, e3]
            let bin = (0..3).find(|&i| {
                let low = edges[i];
                let high = edges[i + 1];
                value <= high && (value > low || (i == 0 && value >= low))
            })?;
            Some(3 - bin as ClassLabel)
        })
        .collect()
}

/// First range containing `|value|`, if any.
pub fn fixed_range_labels(values: &[f64], ranges: &[ClassRange]) -> Vec<Option<ClassLabel>> {
    values
        .iter()
        .map(|&value| {
            if !value.is_finite() {
                return None;
            }
            let magnitude = value.abs();
            ranges.iter().find(|r| r.contains(magnitude)).map(|r| r.label)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct TargetBinner {
    strategy: BinningStrategy,
    beta_ranges: Vec<ClassRange>,
    dy_ranges: Vec<ClassRange>,
}

impl TargetBinner {
    pub fn from_config(config: &BinningConfig) -> Self {
        Self {
            strategy: config.strategy,
            beta_ranges: config.beta_ranges.clone(),
            dy_ranges: config.dy_ranges.clone(),
        }
    }

    pub fn strategy(&self) -> BinningStrategy {
        self.strategy
    }

    fn ranges(&self, target: Target) -> &[ClassRange] {
        match target {
            Target::Beta => &self.beta_ranges,
            Target::DividendYield => &self.dy_ranges,
        }
    }

    pub fn bin(&self, target: Target, values: &[f64]) -> Vec<Option<ClassLabel>> {
        match self.strategy {
            BinningStrategy::Tercile => tercile_labels(values),
            BinningStrategy::FixedRange => fixed_range_labels(values, self.ranges(target)),
        }
    }

    /// Human-readable band of `label`, used as the predicted value in reports.
    pub fn describe(&self, target: Target, label: ClassLabel) -> String {
        match self.strategy {
            BinningStrategy::Tercile => match label {
                1 => "top third".to_string(),
                2 => "middle third".to_string(),
                3 => "bottom third".to_string(),
                other => format!("class {}", other),
            },
            BinningStrategy::FixedRange => self
                .ranges(target)
                .iter()
                .find(|r| r.label == label)
                .map(|r| match r.upper {
                    Some(upper) => format!("[{:.2}, {:.2})", r.lower, upper),
                    None => format!("[{:.2}, inf)", r.lower),
                })
                .unwrap_or_else(|| format!("class {}", label)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_fund_scenario() {
        let labels = tercile_labels(&[0.05, 0.15, 0.25, 0.35, 0.45]);
        assert_eq!(labels, vec![Some(3), Some(3), Some(2), Some(1), Some(1)]);
    }

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [0.05, 0.15, 0.25, 0.35, 0.45];
        let q33 = quantile(&sorted, 0.33).expect("non-empty");
        let q67 = quantile(&sorted, 0.67).expect("non-empty");
        assert!((q33 - 0.182).abs() < 1e-12);
        assert!((q67 - 0.318).abs() < 1e-12);
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_terciles_are_balanced_and_ordered() {
        for n in 3..40usize {
            // distinct values in scrambled order
            let values: Vec<f64> = (0..n).map(|i| ((i * 7919) % n) as f64 * 1.5 - 3.0).collect();
            let labels: Vec<ClassLabel> = tercile_labels(&values)
                .into_iter()
                .map(|l| l.expect("classified"))
                .collect();

            for class in 1..=3u8 {
                let count = labels.iter().filter(|&&l| l == class).count();
                assert!(
                    count + 1 >= n / 3 && count <= n / 3 + 2,
                    "n = {}, class {} has {} members",
                    n,
                    class,
                    count
                );
            }

            let max_index = values
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .expect("non-empty");
            assert_eq!(labels[max_index], 1);
        }
    }

    #[test]
    fn test_nan_is_unclassified() {
        let labels = tercile_labels(&[1.0, f64::NAN, 2.0, 3.0]);
        assert_eq!(labels[1], None);
        assert_eq!(labels[0], Some(3));
        assert_eq!(labels[3], Some(1));
    }

    #[test]
    fn test_duplicate_edges_do_not_fail() {
        let labels = tercile_labels(&[1.0, 1.0, 1.0, 1.0, 2.0]);
        assert!(labels.iter().all(|l| l.is_some()));
        assert_eq!(labels[0], Some(3));
        assert_eq!(labels[4], Some(1));
    }

    #[test]
    fn test_fixed_range_strategy() {
        let ranges = [
            ClassRange::new(1, 0.2, None),
            ClassRange::new(2, 0.1, Some(0.2)),
            ClassRange::new(3, 0.0, Some(0.1)),
        ];
        let labels = fixed_range_labels(&[0.05, -0.15, 0.2, 1.7, f64::NAN], &ranges);
        assert_eq!(labels, vec![Some(3), Some(2), Some(1), Some(1), None]);
    }

    #[test]
    fn test_describe_band() {
        let config = BinningConfig::default();
        let binner = TargetBinner::from_config(&config);
        assert_eq!(binner.describe(Target::Beta, 1), "top third");

        let fixed = TargetBinner::from_config(&BinningConfig {
            strategy: BinningStrategy::FixedRange,
            ..config
        });
        assert_eq!(fixed.describe(Target::DividendYield, 2), "[0.60, 1.00)");
        assert_eq!(fixed.describe(Target::Beta, 1), "[0.20, inf)");
    }
}
