use std::fmt;
use std::time::Instant;

use chrono::Local;
use tracing::{debug, info};

use fiistore::FundDataSource;

use crate::dataset::{DatasetPipeline, QuotationAssembler, Target, TargetBinner, Window};
use crate::report::{self, PipelineReport, TrainingSummary};
use crate::trainer::ModelTrainer;
use crate::utility::config::Config;
use crate::utility::errors::{FiirsError, FiirsResult};
use crate::validator::{ValidationScope, Validator};

/// Pipeline states, visited strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    FetchTrainingFunds,
    PrepareTrainingData,
    Train,
    PrepareValidationData,
    ValidateBetaAll,
    ValidateBetaBest,
    ValidateDyAll,
    ValidateDyBest,
    Terminate,
}

impl PipelineStage {
    pub fn next(self) -> Option<PipelineStage> {
        use PipelineStage::*;
        match self {
            Init => Some(FetchTrainingFunds),
            FetchTrainingFunds => Some(PrepareTrainingData),
            PrepareTrainingData => Some(Train),
            Train => Some(PrepareValidationData),
            PrepareValidationData => Some(ValidateBetaAll),
            ValidateBetaAll => Some(ValidateBetaBest),
            ValidateBetaBest => Some(ValidateDyAll),
            ValidateDyAll => Some(ValidateDyBest),
            ValidateDyBest => Some(Terminate),
            Terminate => None,
        }
    }

    /// Target and scope scored by a validation stage
    fn validation(self) -> Option<(Target, ValidationScope)> {
        match self {
            PipelineStage::ValidateBetaAll => Some((Target::Beta, ValidationScope::AllModels)),
            PipelineStage::ValidateBetaBest => Some((Target::Beta, ValidationScope::BestOnly)),
            PipelineStage::ValidateDyAll => Some((Target::DividendYield, ValidationScope::AllModels)),
            PipelineStage::ValidateDyBest => Some((Target::DividendYield, ValidationScope::BestOnly)),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Init => "init",
            PipelineStage::FetchTrainingFunds => "fetch training funds",
            PipelineStage::PrepareTrainingData => "prepare training data",
            PipelineStage::Train => "train",
            PipelineStage::PrepareValidationData => "prepare validation data",
            PipelineStage::ValidateBetaAll => "validate beta (all models)",
            PipelineStage::ValidateBetaBest => "validate beta (best model)",
            PipelineStage::ValidateDyAll => "validate dy (all models)",
            PipelineStage::ValidateDyBest => "validate dy (best model)",
            PipelineStage::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

/// Runs the training and validation passes over one data source.
pub struct Runner<'a, S: FundDataSource + ?Sized> {
    config: Config,
    source: &'a S,
    verbosity: u8,
    stage: PipelineStage,
    visited: Vec<PipelineStage>,
}

impl<'a, S: FundDataSource + ?Sized> Runner<'a, S> {
    pub fn new(config: Config, source: &'a S, verbosity: u8) -> Self {
        Self {
            config,
            source,
            verbosity,
            stage: PipelineStage::Init,
            visited: vec![PipelineStage::Init],
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Stages entered so far, in order
    pub fn visited(&self) -> &[PipelineStage] {
        &self.visited
    }

    fn advance(&mut self) -> FiirsResult<PipelineStage> {
        let next = self
            .stage
            .next()
            .ok_or_else(|| FiirsError::general("pipeline already terminated"))?;
        info!("▶️ stage: {} -> {}", self.stage, next);
        self.stage = next;
        self.visited.push(next);
        Ok(next)
    }

    pub fn run(&mut self) -> FiirsResult<PipelineReport> {
        if self.stage != PipelineStage::Init {
            return Err(FiirsError::general(format!("runner cannot restart from stage '{}'", self.stage)));
        }
        let started = Instant::now();

        let training_window = Window::months_ending(self.config.training_end_date()?, self.config.training.window_months)?;
        let validation_window =
            Window::months_ending(self.config.validation_end_date()?, self.config.validation.window_months)?;
        info!("📅 training window: {}", training_window);
        info!("📅 validation window: {}", validation_window);

        let pipeline = DatasetPipeline::new(
            QuotationAssembler::new(self.source, &self.config.dataset),
            TargetBinner::from_config(&self.config.binning),
        );
        let mut trainer = ModelTrainer::new(&self.config)?;
        let validator = Validator::new(&pipeline);

        self.advance()?;
        let funds = pipeline.assembler().registered_tickers()?;
        info!("📋 {} registered funds", funds.len());

        self.advance()?;
        let training = pipeline.prepare_dataset(Some(funds.as_slice()), training_window)?.drop_incomplete_rows();
        if training.is_empty() {
            return Err(FiirsError::insufficient_data(
                "training",
                format!("no complete fund rows in {}", training_window),
            ));
        }

        self.advance()?;
        let beta_models = trainer.train(Target::Beta, &training.features, &training.beta)?;
        report::print_training(&beta_models, self.verbosity);
        let dy_models = trainer.train(Target::DividendYield, &training.features, &training.dy)?;
        report::print_training(&dy_models, self.verbosity);

        self.advance()?;
        let validation = validator.prepare(Some(funds.as_slice()), validation_window, training.features.width())?;

        let mut validation_reports = Vec::new();
        while let Some((target, scope)) = self.advance()?.validation() {
            if scope == ValidationScope::BestOnly && !self.config.validation.evaluate_best_only_too {
                debug!("skipping {}", self.stage);
                continue;
            }
            let models = match target {
                Target::Beta => &beta_models,
                Target::DividendYield => &dy_models,
            };
            let outcome = validator.score(models, &validation, scope);
            report::print_validation(&outcome, self.verbosity);
            validation_reports.push(outcome);
        }

        let report = PipelineReport {
            training_window,
            validation_window,
            training_funds: training.len(),
            validation_funds: validation.len(),
            generated_on: Local::now().date_naive(),
            training: vec![TrainingSummary::from_set(&beta_models), TrainingSummary::from_set(&dy_models)],
            validation: validation_reports,
        };

        if let Some(path) = &self.config.report.json_path {
            report.write_json(path)?;
            info!("💾 report written to {}", path);
        }

        info!("🏁 pipeline finished in {:.1}s", started.elapsed().as_secs_f64());
        Ok(report)
    }
}

pub struct RunnerBuilder<'a, S: FundDataSource + ?Sized> {
    config: Option<Config>,
    source: Option<&'a S>,
    verbosity: Option<u8>,
}

impl<'a, S: FundDataSource + ?Sized> Default for RunnerBuilder<'a, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, S: FundDataSource + ?Sized> RunnerBuilder<'a, S> {
    pub fn new() -> Self {
        Self {
            config: None,
            source: None,
            verbosity: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn source(mut self, source: &'a S) -> Self {
        self.source = Some(source);
        self
    }

    /// Overrides `logging.verbosity`
    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = Some(verbosity);
        self
    }

    pub fn build(self) -> FiirsResult<Runner<'a, S>> {
        let source = self
            .source
            .ok_or_else(|| FiirsError::validation("runner", "a data source is required"))?;
        let config = match self.config {
            Some(config) => config,
            None => Config::from_env()?,
        };
        config.validate()?;
        let verbosity = self.verbosity.unwrap_or(config.logging.verbosity);
        Ok(Runner::new(config, source, verbosity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{date, FakeSource};

    fn source() -> FakeSource {
        let mut source = FakeSource::default();
        for i in 0..9 {
            source.add_fund(
                &format!("FII{}11", i),
                date(2021, 1, 1),
                20,
                12.0 * (i + 1) as f64,
                Some(0.05 + 0.1 * i as f64),
                Some(0.2 + 0.1 * i as f64),
            );
        }
        source
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.training.end_date = "2021-01-10".to_string();
        config.training.window_months = 1;
        config.training.algorithms = vec!["decision_tree".to_string(), "knn".to_string()];
        config.validation.end_date = "2021-01-20".to_string();
        config.validation.window_months = 1;
        config
    }

    #[test]
    fn test_stage_order() {
        let mut stage = PipelineStage::Init;
        let mut count = 1;
        while let Some(next) = stage.next() {
            stage = next;
            count += 1;
        }
        assert_eq!(stage, PipelineStage::Terminate);
        assert_eq!(count, 10);
    }

    #[test]
    fn test_full_run() {
        let source = source();
        let mut runner = RunnerBuilder::new()
            .config(config())
            .source(&source)
            .verbosity(0)
            .build()
            .expect("runner");

        let report = runner.run().expect("run");
        assert_eq!(runner.stage(), PipelineStage::Terminate);
        assert_eq!(runner.visited().len(), 10);

        assert_eq!(report.training.len(), 2);
        assert_eq!(report.training[0].training_width, 10 * 4);
        assert_eq!(report.validation.len(), 4);
        assert_eq!(report.validation_funds, 9);
        let scopes: Vec<(Target, ValidationScope)> = report.validation.iter().map(|r| (r.target, r.scope)).collect();
        assert_eq!(
            scopes,
            vec![
                (Target::Beta, ValidationScope::AllModels),
                (Target::Beta, ValidationScope::BestOnly),
                (Target::DividendYield, ValidationScope::AllModels),
                (Target::DividendYield, ValidationScope::BestOnly),
            ]
        );
        assert_eq!(report.validation[0].compared(), 2 * 9);
        assert_eq!(report.validation[1].compared(), 9);
    }

    #[test]
    fn test_best_only_pass_can_be_skipped() {
        let source = source();
        let mut config = config();
        config.validation.evaluate_best_only_too = false;
        let report = RunnerBuilder::new()
            .config(config)
            .source(&source)
            .verbosity(0)
            .build()
            .expect("runner")
            .run()
            .expect("run");
        assert_eq!(report.validation.len(), 2);
        assert!(report.validation.iter().all(|r| r.scope == ValidationScope::AllModels));
    }

    #[test]
    fn test_short_validation_window_stops_the_run() {
        let source = source();
        let mut config = config();
        config.validation.end_date = "2021-01-05".to_string();
        let mut runner = RunnerBuilder::new()
            .config(config)
            .source(&source)
            .verbosity(0)
            .build()
            .expect("runner");

        assert!(matches!(runner.run(), Err(FiirsError::WidthMismatch { .. })));
        assert_eq!(runner.stage(), PipelineStage::PrepareValidationData);
    }

    #[test]
    fn test_report_written_as_json() {
        let source = source();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        let mut config = config();
        config.report.json_path = Some(path.to_string_lossy().into_owned());

        RunnerBuilder::new()
            .config(config)
            .source(&source)
            .verbosity(0)
            .build()
            .expect("runner")
            .run()
            .expect("run");
        assert!(path.exists());
    }

    #[test]
    fn test_builder_requires_source() {
        let result = RunnerBuilder::<FakeSource>::new().config(config()).build();
        assert!(result.is_err());
    }
}
