//! Bulk import of fund data from a directory of CSV files.
//!
//! ```text
//! <data_dir>/funds.csv              ticker,historical_data_link
//! <data_dir>/dividends.csv          ticker,date_record,date_payment,value
//! <data_dir>/quotations/<TICKER>.csv date,last,open,maximum,minimum,volume,variation
//! ```
//!
//! Funds are imported in parallel, one task per fund. Every task opens its own
//! connection, so no transaction is shared between workers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{StoreError, StoreResult};
use crate::store::FiiStore;
use crate::types::{parse_date, DailyQuotation, DividendRecord};

pub const DEFAULT_THREADS: usize = 20;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub threads: usize,
    pub show_progress: bool,
}

impl LoadOptions {
    pub fn new(data_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            db_path: db_path.into(),
            threads: DEFAULT_THREADS,
            show_progress: true,
        }
    }
}

/// Result of importing a single fund
#[derive(Debug, Clone, Serialize)]
pub struct FundLoadOutcome {
    pub ticker: String,
    pub quotations: usize,
    pub dividends: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub outcomes: Vec<FundLoadOutcome>,
}

impl LoadSummary {
    pub fn loaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.loaded()
    }

    pub fn total_quotations(&self) -> usize {
        self.outcomes.iter().map(|o| o.quotations).sum()
    }

    pub fn total_dividends(&self) -> usize {
        self.outcomes.iter().map(|o| o.dividends).sum()
    }
}

fn csv_reader(path: &Path) -> StoreResult<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| StoreError::loader(format!("{}: {}", path.display(), e)))
}

fn field<'a>(record: &'a csv::StringRecord, index: usize, name: &str) -> StoreResult<&'a str> {
    record
        .get(index)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| StoreError::parsing(name, "missing field"))
}

fn number(record: &csv::StringRecord, index: usize, name: &str) -> StoreResult<f64> {
    let raw = field(record, index, name)?;
    raw.parse::<f64>()
        .map_err(|e| StoreError::parsing(name, format!("{} ({})", raw, e)))
}

fn number_or_zero(record: &csv::StringRecord, index: usize, name: &str) -> StoreResult<f64> {
    match record.get(index) {
        None | Some("") => Ok(0.0),
        Some(_) => number(record, index, name),
    }
}

/// Reads `funds.csv` into `(ticker, historical_data_link)` pairs.
pub fn read_funds(path: &Path) -> StoreResult<Vec<(String, String)>> {
    let mut reader = csv_reader(path)?;
    let mut funds = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let parsed = record
            .map_err(|e| StoreError::parsing("funds.csv", e.to_string()))
            .and_then(|record| {
                let ticker = field(&record, 0, "ticker")?.to_uppercase();
                let link = record.get(1).unwrap_or_default().to_string();
                Ok((ticker, link))
            });
        match parsed {
            Ok(fund) => funds.push(fund),
            Err(e) => warn!("skipping funds.csv line {}: {}", line + 2, e),
        }
    }

    Ok(funds)
}

/// Reads one fund's quotation file. Malformed lines are skipped.
pub fn read_quotations(path: &Path) -> StoreResult<Vec<DailyQuotation>> {
    let mut reader = csv_reader(path)?;
    let mut quotations = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let parsed = record
            .map_err(|e| StoreError::parsing("quotation", e.to_string()))
            .and_then(|record| {
                Ok(DailyQuotation {
                    date: parse_date(field(&record, 0, "date")?)?,
                    last: number(&record, 1, "last")?,
                    open: number(&record, 2, "open")?,
                    maximum: number(&record, 3, "maximum")?,
                    minimum: number(&record, 4, "minimum")?,
                    volume: number_or_zero(&record, 5, "volume")?,
                    variation: number_or_zero(&record, 6, "variation")?,
                })
            });
        match parsed {
            Ok(quotation) => quotations.push(quotation),
            Err(e) => warn!("skipping {} line {}: {}", path.display(), line + 2, e),
        }
    }

    Ok(quotations)
}

/// Reads `dividends.csv`, grouped by upper-cased ticker.
pub fn read_dividends(path: &Path) -> StoreResult<HashMap<String, Vec<DividendRecord>>> {
    let mut reader = csv_reader(path)?;
    let mut dividends: HashMap<String, Vec<DividendRecord>> = HashMap::new();

    for (line, record) in reader.records().enumerate() {
        let parsed = record
            .map_err(|e| StoreError::parsing("dividend", e.to_string()))
            .and_then(|record| {
                let ticker = field(&record, 0, "ticker")?.to_uppercase();
                let date_payment = match record.get(2) {
                    None | Some("") => None,
                    Some(raw) => Some(parse_date(raw)?),
                };
                Ok((
                    ticker,
                    DividendRecord {
                        date_record: parse_date(field(&record, 1, "date_record")?)?,
                        date_payment,
                        value: number(&record, 3, "value")?,
                    },
                ))
            });
        match parsed {
            Ok((ticker, dividend)) => dividends.entry(ticker).or_default().push(dividend),
            Err(e) => warn!("skipping dividends.csv line {}: {}", line + 2, e),
        }
    }

    Ok(dividends)
}

fn load_one_fund(
    db_path: &Path,
    quotations_dir: &Path,
    ticker: &str,
    dividends: &[DividendRecord],
) -> StoreResult<(usize, usize)> {
    let mut store = FiiStore::open(db_path)?;
    let fund_id = store
        .fund_id_by_ticker(ticker)?
        .ok_or_else(|| StoreError::fund_not_found(ticker))?;

    let quotation_file = quotations_dir.join(format!("{}.csv", ticker));
    let quotations = if quotation_file.exists() {
        read_quotations(&quotation_file)?
    } else {
        debug!("no quotation file for {}", ticker);
        Vec::new()
    };

    let inserted_quotations = store.insert_daily_quotations(fund_id, &quotations)?;
    let inserted_dividends = store.insert_dividends(fund_id, dividends)?;
    Ok((inserted_quotations, inserted_dividends))
}

/// Registers every fund of `funds.csv`, then imports quotations and dividends
/// on a bounded worker pool.
pub fn load_directory(options: &LoadOptions) -> StoreResult<LoadSummary> {
    let funds = read_funds(&options.data_dir.join("funds.csv"))?;

    let dividends_path = options.data_dir.join("dividends.csv");
    let dividends = if dividends_path.exists() {
        read_dividends(&dividends_path)?
    } else {
        warn!("{} not found, no dividends imported", dividends_path.display());
        HashMap::new()
    };

    {
        let store = FiiStore::open(&options.db_path)?;
        for (ticker, link) in &funds {
            store.register_fund(ticker, link)?;
        }
    }
    info!("📋 {} funds registered", funds.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads.max(1))
        .build()
        .map_err(|e| StoreError::loader(format!("worker pool: {}", e)))?;

    let pb = if options.show_progress {
        ProgressBar::new(funds.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .map_err(|e| StoreError::loader(format!("progress template: {}", e)))?
            .progress_chars("#>-"),
    );

    let quotations_dir = options.data_dir.join("quotations");
    let empty: Vec<DividendRecord> = Vec::new();

    let outcomes: Vec<FundLoadOutcome> = pool.install(|| {
        funds
            .par_iter()
            .map(|(ticker, _)| {
                let fund_dividends = dividends.get(ticker).unwrap_or(&empty);
                let outcome = match load_one_fund(
                    &options.db_path,
                    &quotations_dir,
                    ticker,
                    fund_dividends,
                ) {
                    Ok((quotations, dividends)) => FundLoadOutcome {
                        ticker: ticker.clone(),
                        quotations,
                        dividends,
                        error: None,
                    },
                    Err(e) => {
                        warn!("❌ failed to load {}: {}", ticker, e);
                        FundLoadOutcome {
                            ticker: ticker.clone(),
                            quotations: 0,
                            dividends: 0,
                            error: Some(e.to_string()),
                        }
                    }
                };
                pb.set_message(ticker.clone());
                pb.inc(1);
                outcome
            })
            .collect()
    });
    pb.finish_with_message("done");

    let summary = LoadSummary { outcomes };
    info!(
        "✅ load finished: {} funds ok, {} failed, {} quotations, {} dividends",
        summary.loaded(),
        summary.failed(),
        summary.total_quotations(),
        summary.total_dividends()
    );
    Ok(summary)
}
