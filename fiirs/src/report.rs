//! Result tables printed on stdout.
//!
//! Verbosity 0 prints nothing, 1 prints accuracies and validation counters,
//! 2 adds the per-fund detail table.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::dataset::{Target, Window};
use crate::trainer::{AlgorithmAccuracy, TrainedModelSet};
use crate::utility::errors::{FiirsError, FiirsResult};
use crate::validator::ValidationReport;

pub const SUMMARY_VERBOSITY: u8 = 1;
pub const DETAIL_VERBOSITY: u8 = 2;

#[derive(Tabled)]
struct AccuracyRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Algorithm")]
    algorithm: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
}

#[derive(Tabled)]
struct DetailRow {
    #[tabled(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Predicted")]
    predicted_class: u8,
    #[tabled(rename = "Predicted Value")]
    predicted_value: String,
    #[tabled(rename = "Real")]
    real_class: u8,
    #[tabled(rename = "Match")]
    matched: bool,
}

/// Training accuracies for one target.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub target: Target,
    pub training_width: usize,
    pub accuracies: Vec<AlgorithmAccuracy>,
}

impl TrainingSummary {
    pub fn from_set(set: &TrainedModelSet) -> Self {
        Self {
            target: set.target(),
            training_width: set.training_width(),
            accuracies: set.accuracies(),
        }
    }
}

/// Everything one pipeline run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub training_window: Window,
    pub validation_window: Window,
    pub training_funds: usize,
    pub validation_funds: usize,
    pub generated_on: NaiveDate,
    pub training: Vec<TrainingSummary>,
    pub validation: Vec<ValidationReport>,
}

impl PipelineReport {
    pub fn write_json(&self, path: &str) -> FiirsResult<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| FiirsError::io("create report directory", e))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| FiirsError::io("write report", e))
    }
}

pub fn accuracy_table(set: &TrainedModelSet) -> String {
    let rows: Vec<AccuracyRow> = set
        .results()
        .iter()
        .enumerate()
        .map(|(i, r)| AccuracyRow {
            rank: i + 1,
            algorithm: r.algorithm.to_string(),
            accuracy: format!("{:.2}%", r.accuracy * 100.0),
        })
        .collect();
    Table::new(rows).to_string()
}

pub fn validation_summary(report: &ValidationReport) -> String {
    format!(
        "[{} | {}] trues: {}  falses: {}  accuracy: {:.2}%",
        report.target,
        report.scope.name(),
        report.trues,
        report.falses,
        report.accuracy_pct
    )
}

pub fn detail_table(report: &ValidationReport) -> String {
    let rows: Vec<DetailRow> = report
        .details
        .iter()
        .map(|d| DetailRow {
            ticker: d.ticker.clone(),
            model: d.algorithm.to_string(),
            predicted_class: d.predicted_class,
            predicted_value: d.predicted_value.clone(),
            real_class: d.real_class,
            matched: d.matched,
        })
        .collect();
    Table::new(rows).to_string()
}

pub fn print_training(set: &TrainedModelSet, verbosity: u8) {
    if verbosity < SUMMARY_VERBOSITY {
        return;
    }
    println!("\n=== {} training accuracy (width {}) ===", set.target(), set.training_width());
    println!("{}", accuracy_table(set));
    if let Some(best) = set.best() {
        println!("Best approach: {}", best.algorithm);
    }
}

pub fn print_validation(report: &ValidationReport, verbosity: u8) {
    if verbosity >= DETAIL_VERBOSITY {
        println!("{}", detail_table(report));
    }
    if verbosity >= SUMMARY_VERBOSITY {
        println!("{}", validation_summary(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Algorithm;
    use crate::validator::{ValidationRow, ValidationScope};

    fn report() -> ValidationReport {
        ValidationReport {
            target: Target::Beta,
            scope: ValidationScope::BestOnly,
            trues: 1,
            falses: 1,
            accuracy_pct: 50.0,
            details: vec![
                ValidationRow {
                    ticker: "HGLG11".to_string(),
                    algorithm: Algorithm::Knn,
                    predicted_class: 1,
                    predicted_value: "top third".to_string(),
                    real_class: 1,
                    matched: true,
                },
                ValidationRow {
                    ticker: "KNRI11".to_string(),
                    algorithm: Algorithm::Knn,
                    predicted_class: 3,
                    predicted_value: "bottom third".to_string(),
                    real_class: 2,
                    matched: false,
                },
            ],
        }
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(
            validation_summary(&report()),
            "[beta | best model] trues: 1  falses: 1  accuracy: 50.00%"
        );
    }

    #[test]
    fn test_detail_table_lists_every_row() {
        let table = detail_table(&report());
        assert!(table.contains("HGLG11"));
        assert!(table.contains("KNRI11"));
        assert!(table.contains("bottom third"));
        assert!(table.contains("Predicted Value"));
    }

    #[test]
    fn test_report_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out").join("report.json");
        let window = Window::new(
            NaiveDate::from_ymd_opt(2020, 3, 31).expect("date"),
            NaiveDate::from_ymd_opt(2021, 3, 31).expect("date"),
        )
        .expect("window");
        let pipeline_report = PipelineReport {
            training_window: window,
            validation_window: window,
            training_funds: 2,
            validation_funds: 2,
            generated_on: window.end,
            training: Vec::new(),
            validation: vec![report()],
        };

        pipeline_report.write_json(path.to_str().expect("utf8 path")).expect("write");
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(written["validation"][0]["trues"], 1);
        assert_eq!(written["validation"][0]["scope"], "best_only");
        assert_eq!(written["validation"][0]["details"][1]["algorithm"], "knn");
    }
}
