//! Scores trained models against classes rebuilt over a later window.

use serde::Serialize;
use tracing::{error, info};

use fiistore::FundDataSource;

use crate::dataset::{ClassLabel, Dataset, DatasetPipeline, Target, Window};
use crate::model::{Algorithm, Classifier};
use crate::trainer::{TrainedModel, TrainedModelSet};
use crate::utility::errors::{FiirsError, FiirsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationScope {
    AllModels,
    BestOnly,
}

impl ValidationScope {
    pub fn name(&self) -> &'static str {
        match self {
            ValidationScope::AllModels => "all models",
            ValidationScope::BestOnly => "best model",
        }
    }
}

/// One fund scored by one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationRow {
    pub ticker: String,
    pub algorithm: Algorithm,
    pub predicted_class: ClassLabel,
    pub predicted_value: String,
    pub real_class: ClassLabel,
    pub matched: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub target: Target,
    pub scope: ValidationScope,
    pub trues: usize,
    pub falses: usize,
    pub accuracy_pct: f64,
    pub details: Vec<ValidationRow>,
}

impl ValidationReport {
    pub fn compared(&self) -> usize {
        self.trues + self.falses
    }
}

pub struct Validator<'p, 'a, S: FundDataSource + ?Sized> {
    pipeline: &'p DatasetPipeline<'a, S>,
}

impl<'p, 'a, S: FundDataSource + ?Sized> Validator<'p, 'a, S> {
    pub fn new(pipeline: &'p DatasetPipeline<'a, S>) -> Self {
        Self { pipeline }
    }

    /// Validation dataset right-aligned to `reference_width` columns.
    ///
    /// A window narrower than the training one is a `WidthMismatch`.
    pub fn prepare(&self, fund_set: Option<&[String]>, window: Window, reference_width: usize) -> FiirsResult<Dataset> {
        let dataset = self.pipeline.prepare_dataset(fund_set, window)?;
        let validation_width = dataset.features.width();
        if validation_width < reference_width {
            error!(
                validation_width,
                training_width = reference_width,
                "❌ validation window {} is narrower than the training window",
                window
            );
            return Err(FiirsError::width_mismatch(validation_width, reference_width));
        }

        let aligned = dataset.align_to_width(reference_width)?;
        info!(
            "🔎 validation set {}: {} funds kept of {}, trailing {} of {} columns",
            window,
            aligned.len(),
            dataset.len(),
            reference_width,
            validation_width
        );
        Ok(aligned)
    }

    /// Compares every selected model's prediction with each fund's real class.
    pub fn score(&self, models: &TrainedModelSet, dataset: &Dataset, scope: ValidationScope) -> ValidationReport {
        let target = models.target();
        let selected: &[TrainedModel] = match scope {
            ValidationScope::AllModels => models.results(),
            ValidationScope::BestOnly => &models.results()[..models.len().min(1)],
        };
        let labels = dataset.labels(target);

        let mut details = Vec::with_capacity(selected.len() * dataset.len());
        for (i, ticker) in dataset.features.tickers().iter().enumerate() {
            let row = dataset.features.row(i);
            let real_class = labels.labels()[i];
            for trained in selected {
                let predicted_class = trained.model.predict_one(row);
                details.push(ValidationRow {
                    ticker: ticker.clone(),
                    algorithm: trained.algorithm,
                    predicted_class,
                    predicted_value: self.pipeline.binner().describe(target, predicted_class),
                    real_class,
                    matched: predicted_class == real_class,
                });
            }
        }

        let trues = details.iter().filter(|d| d.matched).count();
        let falses = details.len() - trues;
        let accuracy_pct = if details.is_empty() {
            0.0
        } else {
            trues as f64 / details.len() as f64 * 100.0
        };

        info!(
            indicator = %target,
            scope = scope.name(),
            trues,
            falses,
            "✅ validation accuracy {:.2}%",
            accuracy_pct
        );

        ValidationReport {
            target,
            scope,
            trues,
            falses,
            accuracy_pct,
            details,
        }
    }

    /// Rebuilds the dataset over `window` and scores `models` on it.
    pub fn validate(
        &self,
        models: &TrainedModelSet,
        fund_set: Option<&[String]>,
        window: Window,
        reference_width: usize,
        scope: ValidationScope,
    ) -> FiirsResult<ValidationReport> {
        let dataset = self.prepare(fund_set, window, reference_width)?;
        Ok(self.score(models, &dataset, scope))
    }
}
