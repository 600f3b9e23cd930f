//! Feature and label construction for one date window.

pub mod assembler;
pub mod binning;

use std::collections::HashMap;
use std::fmt;

use chrono::{Datelike, Local, Months, NaiveDate};
use ndarray::{s, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use fiistore::{DailyQuotation, FundDataSource};

use crate::utility::errors::{FiirsError, FiirsResult};
pub use assembler::{FundRecord, FundSeries, QuotationAssembler};
pub use binning::{BinningStrategy, ClassRange, TargetBinner};

/// Ordinal class: 1 = top third, 2 = middle, 3 = bottom third.
pub type ClassLabel = u8;

/// Per-day quotation field that can be flattened into a feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationColumn {
    Date,
    /// Seconds elapsed since January 1st of the quotation's year
    YearReference,
    Last,
    Open,
    Maximum,
    Minimum,
    Volume,
    Variation,
}

impl QuotationColumn {
    pub const DEFAULT: [QuotationColumn; 4] = [
        QuotationColumn::Last,
        QuotationColumn::Open,
        QuotationColumn::Maximum,
        QuotationColumn::Minimum,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            QuotationColumn::Date => "date",
            QuotationColumn::YearReference => "year_reference",
            QuotationColumn::Last => "last",
            QuotationColumn::Open => "open",
            QuotationColumn::Maximum => "maximum",
            QuotationColumn::Minimum => "minimum",
            QuotationColumn::Volume => "volume",
            QuotationColumn::Variation => "variation",
        }
    }

    /// Numeric value of this field; `None` for the date itself.
    pub fn value(&self, quotation: &DailyQuotation) -> Option<f64> {
        match self {
            QuotationColumn::Date => None,
            QuotationColumn::YearReference => {
                let new_year = NaiveDate::from_ymd_opt(quotation.date.year(), 1, 1)?;
                Some((quotation.date - new_year).num_seconds() as f64)
            }
            QuotationColumn::Last => Some(quotation.last),
            QuotationColumn::Open => Some(quotation.open),
            QuotationColumn::Maximum => Some(quotation.maximum),
            QuotationColumn::Minimum => Some(quotation.minimum),
            QuotationColumn::Volume => Some(quotation.volume),
            QuotationColumn::Variation => Some(quotation.variation),
        }
    }
}

/// Indicator being classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Beta,
    DividendYield,
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Target::Beta => "beta",
            Target::DividendYield => "dy",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed date interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> FiirsResult<Self> {
        if start > end {
            return Err(FiirsError::validation(
                "window",
                format!("start {} is after end {}", start, end),
            ));
        }
        Ok(Self { start, end })
    }

    /// `months` calendar months ending at `end`.
    pub fn months_ending(end: NaiveDate, months: u32) -> FiirsResult<Self> {
        let start = end.checked_sub_months(Months::new(months)).ok_or_else(|| {
            FiirsError::validation("window", format!("{} months before {} is out of range", months, end))
        })?;
        Self::new(start, end)
    }

    /// Missing bounds default to 1990-01-01 and today.
    pub fn bounded(start: Option<NaiveDate>, end: Option<NaiveDate>) -> FiirsResult<Self> {
        let start = match start {
            Some(date) => date,
            None => NaiveDate::from_ymd_opt(1990, 1, 1)
                .ok_or_else(|| FiirsError::general("invalid default start date"))?,
        };
        Self::new(start, end.unwrap_or_else(|| Local::now().date_naive()))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.start, self.end)
    }
}

/// One row per fund, flattened per-day fields as columns.
///
/// Shorter rows are right-padded with NaN up to the widest one.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    tickers: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn from_rows(rows: Vec<(String, Vec<f64>)>) -> Self {
        let width = rows.iter().map(|(_, row)| row.len()).max().unwrap_or(0);
        let mut values = Array2::from_elem((rows.len(), width), f64::NAN);
        let mut tickers = Vec::with_capacity(rows.len());

        for (i, (ticker, row)) in rows.into_iter().enumerate() {
            for (j, value) in row.into_iter().enumerate() {
                values[[i, j]] = value;
            }
            tickers.push(ticker);
        }

        Self { tickers, values }
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Rows without any NaN, in current order.
    pub fn complete_row_indices(&self) -> Vec<usize> {
        self.values
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            tickers: indices.iter().map(|&i| self.tickers[i].clone()).collect(),
            values: self.values.select(Axis(0), indices),
        }
    }

    pub fn drop_incomplete_rows(&self) -> Self {
        self.select_rows(&self.complete_row_indices())
    }

    /// Keeps the last `width` columns, discarding the earliest observations.
    pub fn keep_trailing_columns(&self, width: usize) -> FiirsResult<Self> {
        if width > self.width() {
            return Err(FiirsError::width_mismatch(self.width(), width));
        }
        let offset = self.width() - width;
        Ok(Self {
            tickers: self.tickers.clone(),
            values: self.values.slice(s![.., offset..]).to_owned(),
        })
    }
}

/// One class per fund for a single target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelVector {
    tickers: Vec<String>,
    labels: Vec<ClassLabel>,
}

impl LabelVector {
    pub fn new(tickers: Vec<String>, labels: Vec<ClassLabel>) -> FiirsResult<Self> {
        if tickers.len() != labels.len() {
            return Err(FiirsError::validation(
                "labels",
                format!("{} tickers for {} labels", tickers.len(), labels.len()),
            ));
        }
        Ok(Self { tickers, labels })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn labels(&self) -> &[ClassLabel] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<ClassLabel> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|i| self.labels[i])
    }

    pub fn class_counts(&self) -> HashMap<ClassLabel, usize> {
        let mut counts = HashMap::new();
        for label in &self.labels {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            tickers: indices.iter().map(|&i| self.tickers[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// Features plus both label vectors, aligned row by row on the same tickers.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: FeatureMatrix,
    pub beta: LabelVector,
    pub dy: LabelVector,
}

impl Dataset {
    pub fn labels(&self, target: Target) -> &LabelVector {
        match target {
            Target::Beta => &self.beta,
            Target::DividendYield => &self.dy,
        }
    }

    pub fn len(&self) -> usize {
        self.features.n_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Drops funds whose feature row holds a NaN (padding or missing data).
    pub fn drop_incomplete_rows(&self) -> Self {
        let keep = self.features.complete_row_indices();
        let dropped = self.len() - keep.len();
        if dropped > 0 {
            debug!("dropping {} incomplete feature rows", dropped);
        }
        Self {
            features: self.features.select_rows(&keep),
            beta: self.beta.select_rows(&keep),
            dy: self.dy.select_rows(&keep),
        }
    }

    /// Right-aligns the features to `width` columns, then drops incomplete rows.
    pub fn align_to_width(&self, width: usize) -> FiirsResult<Self> {
        let aligned = Self {
            features: self.features.keep_trailing_columns(width)?,
            beta: self.beta.clone(),
            dy: self.dy.clone(),
        };
        Ok(aligned.drop_incomplete_rows())
    }
}

/// Assembler and binner chained into the dataset of one window.
pub struct DatasetPipeline<'a, S: FundDataSource + ?Sized> {
    assembler: QuotationAssembler<'a, S>,
    binner: TargetBinner,
}

impl<'a, S: FundDataSource + ?Sized> DatasetPipeline<'a, S> {
    pub fn new(assembler: QuotationAssembler<'a, S>, binner: TargetBinner) -> Self {
        Self { assembler, binner }
    }

    pub fn assembler(&self) -> &QuotationAssembler<'a, S> {
        &self.assembler
    }

    pub fn binner(&self) -> &TargetBinner {
        &self.binner
    }

    /// Features, beta classes and DY classes of `fund_set` over `window`.
    ///
    /// Classes are computed from this window alone. A fund lacking either
    /// indicator or either class is left out. Incomplete feature rows are kept;
    /// callers drop them once the final width is known.
    pub fn prepare_dataset(&self, fund_set: Option<&[String]>, window: Window) -> FiirsResult<Dataset> {
        let records = self.assembler.assemble(fund_set, window)?;

        let betas: Vec<f64> = records.iter().map(|r| r.beta).collect();
        let yields: Vec<f64> = records.iter().map(|r| r.dividend_yield).collect();
        let beta_classes = self.binner.bin(Target::Beta, &betas);
        let dy_classes = self.binner.bin(Target::DividendYield, &yields);

        let mut rows = Vec::new();
        let mut beta_labels = Vec::new();
        let mut dy_labels = Vec::new();
        let mut tickers = Vec::new();
        for ((record, beta), dy) in records.into_iter().zip(beta_classes).zip(dy_classes) {
            let (Some(beta), Some(dy)) = (beta, dy) else {
                debug!(ticker = %record.ticker, "fund dropped: unclassifiable indicator");
                continue;
            };
            tickers.push(record.ticker.clone());
            beta_labels.push(beta);
            dy_labels.push(dy);
            rows.push((record.ticker, record.features));
        }

        let dataset = Dataset {
            features: FeatureMatrix::from_rows(rows),
            beta: LabelVector::new(tickers.clone(), beta_labels)?,
            dy: LabelVector::new(tickers, dy_labels)?,
        };
        info!(
            "📊 dataset {}: {} funds, width {}",
            window,
            dataset.len(),
            dataset.features.width()
        );
        Ok(dataset)
    }
}
