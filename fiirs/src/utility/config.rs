use std::fs;
use std::path::Path;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::binning::{BinningStrategy, ClassRange};
use crate::dataset::QuotationColumn;
use crate::model::Algorithm;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
    #[error("failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub binning: BinningConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub fiis_db_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            fiis_db_path: "fiis.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DatasetConfig {
    /// Per-day fields flattened into the feature vector, in order
    pub columns: Vec<QuotationColumn>,
    pub symmetric_beta: bool,
    pub only_valid_funds: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            columns: QuotationColumn::DEFAULT.to_vec(),
            symmetric_beta: true,
            only_valid_funds: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BinningConfig {
    pub strategy: BinningStrategy,
    pub beta_ranges: Vec<ClassRange>,
    pub dy_ranges: Vec<ClassRange>,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            strategy: BinningStrategy::Tercile,
            beta_ranges: vec![
                ClassRange::new(1, 0.2, None),
                ClassRange::new(2, 0.1, Some(0.2)),
                ClassRange::new(3, 0.0, Some(0.1)),
            ],
            dy_ranges: vec![
                ClassRange::new(1, 1.0, None),
                ClassRange::new(2, 0.6, Some(1.0)),
                ClassRange::new(3, 0.0, Some(0.6)),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TrainingConfig {
    pub end_date: String,
    pub window_months: u32,
    pub test_set_size: f64,
    pub seed: u64,
    /// Retrain even when a fitted model is already cached
    pub re_evaluate: bool,
    pub algorithms: Vec<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            end_date: "2021-03-31".to_string(),
            window_months: 12,
            test_set_size: 0.3,
            seed: 10,
            re_evaluate: false,
            algorithms: Algorithm::ALL.iter().map(|a| a.name().to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ValidationConfig {
    /// Empty means today
    pub end_date: String,
    pub window_months: u32,
    pub evaluate_best_only_too: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            end_date: String::new(),
            window_months: 13,
            evaluate_best_only_too: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ModelsConfig {
    pub decision_tree: DecisionTreeConfig,
    pub mlp: MlpConfig,
    pub knn: KnnConfig,
    pub random_forest: EnsembleConfig,
    pub boosting: BoostingConfig,
    pub bagging: EnsembleConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DecisionTreeConfig {
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_depth: Option<usize>,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self {
            min_samples_split: 5,
            min_samples_leaf: 3,
            max_depth: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MlpConfig {
    pub hidden_units: usize,
    pub max_iter: usize,
    pub learning_rate: f64,
    /// L2 penalty
    pub alpha: f64,
    pub batch_size: usize,
    pub tol: f64,
    pub n_iter_no_change: usize,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_units: 10,
            max_iter: 10_000,
            learning_rate: 1e-3,
            alpha: 1e-4,
            batch_size: 200,
            tol: 1e-4,
            n_iter_no_change: 10,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct KnnConfig {
    pub k: usize,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self { k: 3 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EnsembleConfig {
    pub n_estimators: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self { n_estimators: 50 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// 0 silent, 1 summaries, 2 per-fund detail tables
    pub verbosity: u8,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbosity: 1,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ReportConfig {
    pub json_path: Option<String>,
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl Config {
    /// Loads `path`, applies environment overrides and validates the result.
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            return Err(ConfigError::FileNotFound(format!(
                "{} is missing; copy config.example.toml to config.toml and adjust it",
                path
            )));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FIIS_DB_PATH") {
            self.database.fiis_db_path = path;
        }

        // directive lists such as "fiirs=debug" are left to the EnvFilter
        if let Ok(level) = std::env::var("RUST_LOG") {
            if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
                self.logging.level = level.to_lowercase();
            }
        }

        if let Ok(verbosity) = std::env::var("FIIRS_VERBOSITY") {
            if let Ok(value) = verbosity.parse::<u8>() {
                self.logging.verbosity = value;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.fiis_db_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.fiis_db_path must not be empty".to_string(),
            ));
        }

        if self.dataset.columns.is_empty() {
            return Err(ConfigError::ValidationError(
                "dataset.columns must list at least one field".to_string(),
            ));
        }
        if self.dataset.columns.contains(&QuotationColumn::Date) {
            return Err(ConfigError::ValidationError(
                "dataset.columns: 'date' is not a numeric field".to_string(),
            ));
        }

        validate_ranges("binning.beta_ranges", &self.binning.beta_ranges)?;
        validate_ranges("binning.dy_ranges", &self.binning.dy_ranges)?;

        if !(self.training.test_set_size > 0.0 && self.training.test_set_size < 1.0) {
            return Err(ConfigError::ValidationError(
                "training.test_set_size must be between 0 and 1 (exclusive)".to_string(),
            ));
        }
        if self.training.window_months == 0 || self.validation.window_months == 0 {
            return Err(ConfigError::ValidationError(
                "window_months must be greater than zero".to_string(),
            ));
        }
        if parse_config_date(&self.training.end_date).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "training.end_date must be YYYY-MM-DD, got '{}'",
                self.training.end_date
            )));
        }
        if !self.validation.end_date.trim().is_empty()
            && parse_config_date(&self.validation.end_date).is_none()
        {
            return Err(ConfigError::ValidationError(format!(
                "validation.end_date must be YYYY-MM-DD or empty, got '{}'",
                self.validation.end_date
            )));
        }
        if self.training.algorithms.is_empty() {
            return Err(ConfigError::ValidationError(
                "training.algorithms must name at least one algorithm".to_string(),
            ));
        }

        let models = &self.models;
        if models.decision_tree.min_samples_split < 2 {
            return Err(ConfigError::ValidationError(
                "models.decision_tree.min_samples_split must be at least 2".to_string(),
            ));
        }
        if models.decision_tree.min_samples_leaf == 0 || models.decision_tree.max_depth == Some(0) {
            return Err(ConfigError::ValidationError(
                "models.decision_tree sizes must be greater than zero".to_string(),
            ));
        }
        if models.mlp.hidden_units == 0 || models.mlp.max_iter == 0 || models.mlp.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "models.mlp sizes must be greater than zero".to_string(),
            ));
        }
        if models.mlp.learning_rate <= 0.0 || models.mlp.alpha < 0.0 {
            return Err(ConfigError::ValidationError(
                "models.mlp.learning_rate must be positive and alpha non-negative".to_string(),
            ));
        }
        if models.knn.k == 0 {
            return Err(ConfigError::ValidationError(
                "models.knn.k must be greater than zero".to_string(),
            ));
        }
        if models.random_forest.n_estimators == 0
            || models.bagging.n_estimators == 0
            || models.boosting.n_estimators == 0
        {
            return Err(ConfigError::ValidationError(
                "ensemble n_estimators must be greater than zero".to_string(),
            ));
        }
        if models.boosting.learning_rate <= 0.0 {
            return Err(ConfigError::ValidationError(
                "models.boosting.learning_rate must be positive".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(
                "logging.level must be one of 'error', 'warn', 'info', 'debug', 'trace'".to_string(),
            ));
        }
        if self.logging.verbosity > 2 {
            return Err(ConfigError::ValidationError(
                "logging.verbosity must be 0, 1 or 2".to_string(),
            ));
        }

        Ok(())
    }

    pub fn training_end_date(&self) -> Result<NaiveDate, ConfigError> {
        parse_config_date(&self.training.end_date).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "training.end_date must be YYYY-MM-DD, got '{}'",
                self.training.end_date
            ))
        })
    }

    /// Validation end date, today when unset.
    pub fn validation_end_date(&self) -> Result<NaiveDate, ConfigError> {
        if self.validation.end_date.trim().is_empty() {
            return Ok(Local::now().date_naive());
        }
        parse_config_date(&self.validation.end_date).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "validation.end_date must be YYYY-MM-DD, got '{}'",
                self.validation.end_date
            ))
        })
    }
}

fn parse_config_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

fn validate_ranges(field: &str, ranges: &[ClassRange]) -> Result<(), ConfigError> {
    if ranges.is_empty() {
        return Err(ConfigError::ValidationError(format!("{} must not be empty", field)));
    }

    let mut sorted: Vec<&ClassRange> = ranges.iter().collect();
    sorted.sort_by(|a, b| a.lower.total_cmp(&b.lower));

    for range in &sorted {
        if !(1..=3).contains(&range.label) {
            return Err(ConfigError::ValidationError(format!(
                "{}: label {} is outside 1..=3",
                field, range.label
            )));
        }
        if range.lower < 0.0 || range.upper.is_some_and(|upper| upper <= range.lower) {
            return Err(ConfigError::ValidationError(format!(
                "{}: inverted range for label {}",
                field, range.label
            )));
        }
    }

    for pair in sorted.windows(2) {
        match pair[0].upper {
            Some(upper) if upper <= pair[1].lower => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "{}: ranges of labels {} and {} overlap",
                    field, pair[0].label, pair[1].label
                )))
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.training.test_set_size, 0.3);
        assert_eq!(config.training.seed, 10);
        assert_eq!(config.models.knn.k, 3);
        assert_eq!(config.training.algorithms.len(), 7);
        assert_eq!(
            config.training_end_date().expect("date"),
            NaiveDate::from_ymd_opt(2021, 3, 31).expect("valid date")
        );
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::from_toml_str(
            r#"
            [database]
            fiis_db_path = "/tmp/fiis.db"

            [dataset]
            columns = ["last", "year_reference"]

            [binning]
            strategy = "fixed_range"

            [training]
            end_date = "2020-12-31"
            seed = 7
            "#,
        )
        .expect("valid config");

        assert_eq!(config.dataset.columns, vec![QuotationColumn::Last, QuotationColumn::YearReference]);
        assert_eq!(config.binning.strategy, BinningStrategy::FixedRange);
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.window_months, 12);
        assert_eq!(config.models.mlp.hidden_units, 10);
    }

    #[test]
    fn test_rejects_unknown_column() {
        let result = Config::from_toml_str("[dataset]\ncolumns = [\"price\"]\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_rejects_date_column() {
        let result = Config::from_toml_str("[dataset]\ncolumns = [\"date\", \"last\"]\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_rejects_bad_test_fraction() {
        let mut config = Config::default();
        config.training.test_set_size = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_overlapping_ranges() {
        let mut config = Config::default();
        config.binning.beta_ranges = vec![
            ClassRange::new(1, 0.15, None),
            ClassRange::new(2, 0.1, Some(0.2)),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[validation]\nend_date = \"2022-04-30\"\nwindow_months = 6\n")
            .expect("write config");

        let config = Config::load_from_file(path.to_str().expect("utf-8 path")).expect("load");
        assert_eq!(config.validation.window_months, 6);
        assert_eq!(
            config.validation_end_date().expect("date"),
            NaiveDate::from_ymd_opt(2022, 4, 30).expect("valid date")
        );
    }
}
