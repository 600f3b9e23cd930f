use std::time::Instant;

use tracing::{debug, info};

use fiistore::{DailyQuotation, FundDataSource};

use super::{QuotationColumn, Window};
use crate::utility::config::DatasetConfig;
use crate::utility::errors::FiirsResult;

/// One fund's flattened series, indicators possibly missing.
#[derive(Debug, Clone, PartialEq)]
pub struct FundSeries {
    pub ticker: String,
    pub features: Vec<f64>,
    pub beta: Option<f64>,
    pub dividend_yield: Option<f64>,
}

/// A fund with every indicator present.
#[derive(Debug, Clone, PartialEq)]
pub struct FundRecord {
    pub ticker: String,
    pub features: Vec<f64>,
    pub beta: f64,
    pub dividend_yield: f64,
}

impl FundSeries {
    /// `None` when beta or dividend yield is missing or not finite.
    pub fn into_record(self) -> Option<FundRecord> {
        let beta = self.beta.filter(|v| v.is_finite())?;
        let dividend_yield = self.dividend_yield.filter(|v| v.is_finite())?;
        Some(FundRecord {
            ticker: self.ticker,
            features: self.features,
            beta,
            dividend_yield,
        })
    }
}

pub struct QuotationAssembler<'a, S: FundDataSource + ?Sized> {
    source: &'a S,
    columns: Vec<QuotationColumn>,
    symmetric_beta: bool,
    only_valid_funds: bool,
}

impl<'a, S: FundDataSource + ?Sized> QuotationAssembler<'a, S> {
    pub fn new(source: &'a S, config: &DatasetConfig) -> Self {
        Self {
            source,
            columns: config.columns.clone(),
            symmetric_beta: config.symmetric_beta,
            only_valid_funds: config.only_valid_funds,
        }
    }

    pub fn source(&self) -> &'a S {
        self.source
    }

    /// Registered tickers, restricted to valid funds when so configured.
    pub fn registered_tickers(&self) -> FiirsResult<Vec<String>> {
        let funds = self.source.registered_funds(self.only_valid_funds)?;
        Ok(funds.into_iter().map(|fund| fund.ticker).collect())
    }

    /// Row-major flattening: every selected field of day 1, then day 2, ...
    pub fn flatten(&self, quotations: &[DailyQuotation]) -> Vec<f64> {
        quotations
            .iter()
            .flat_map(|q| self.columns.iter().filter_map(move |column| column.value(q)))
            .collect()
    }

    /// Every fund of the set with its series and whatever indicators exist.
    pub fn collect_series(&self, fund_set: Option<&[String]>, window: Window) -> FiirsResult<Vec<FundSeries>> {
        let tickers = match fund_set {
            Some(tickers) => tickers.to_vec(),
            None => self.registered_tickers()?,
        };

        let betas = self
            .source
            .calculate_beta(window.start, window.end, self.symmetric_beta)?;
        let yields = self.source.dividend_yield(window.start, window.end)?;

        let mut series = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            if fiistore::types::is_benchmark(&ticker) {
                continue;
            }
            let quotations = self.source.daily_quotation(&ticker, window.start, window.end)?;
            if quotations.is_empty() {
                debug!(ticker = %ticker, "no quotations in window");
                continue;
            }
            series.push(FundSeries {
                beta: betas.get(&ticker).copied(),
                dividend_yield: yields.get(&ticker).copied(),
                features: self.flatten(&quotations),
                ticker,
            });
        }
        Ok(series)
    }

    /// Funds with features, beta and dividend yield; the rest are dropped.
    pub fn assemble(&self, fund_set: Option<&[String]>, window: Window) -> FiirsResult<Vec<FundRecord>> {
        let started = Instant::now();
        let series = self.collect_series(fund_set, window)?;
        let total = series.len();

        let mut records: Vec<FundRecord> = series.into_iter().filter_map(FundSeries::into_record).collect();
        records.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        info!(
            "🧩 assembled {} of {} funds for {} in {:.2?}",
            records.len(),
            total,
            window,
            started.elapsed()
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{date, FakeSource};
    use crate::utility::config::DatasetConfig;

    #[test]
    fn test_flatten_is_row_major() {
        let source = FakeSource::default();
        let config = DatasetConfig {
            columns: vec![QuotationColumn::Last, QuotationColumn::Open],
            ..DatasetConfig::default()
        };
        let assembler = QuotationAssembler::new(&source, &config);
        let quotations = vec![
            DailyQuotation {
                date: date(2021, 1, 4),
                last: 10.0,
                open: 9.0,
                maximum: 11.0,
                minimum: 8.0,
                volume: 1.0,
                variation: 0.0,
            },
            DailyQuotation {
                date: date(2021, 1, 5),
                last: 12.0,
                open: 10.5,
                maximum: 13.0,
                minimum: 10.0,
                volume: 1.0,
                variation: 0.0,
            },
        ];
        assert_eq!(assembler.flatten(&quotations), vec![10.0, 9.0, 12.0, 10.5]);
    }

    #[test]
    fn test_missing_beta_is_never_assembled() {
        let mut source = FakeSource::default();
        let start = date(2021, 1, 1);
        source.add_fund("AAAA11", start, 3, 10.0, Some(0.3), Some(0.7));
        source.add_fund("BBBB11", start, 3, 10.0, None, Some(0.7));
        source.add_fund("CCCC11", start, 3, 10.0, Some(f64::NAN), Some(0.7));

        let assembler = QuotationAssembler::new(&source, &DatasetConfig::default());
        let window = Window::new(start, date(2021, 1, 10)).expect("window");

        let series = assembler.collect_series(None, window).expect("series");
        assert_eq!(series.len(), 3);

        let records = assembler.assemble(None, window).expect("records");
        let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAAA11"]);
    }

    #[test]
    fn test_explicit_fund_set_skips_benchmark() {
        let mut source = FakeSource::default();
        let start = date(2021, 1, 1);
        source.add_fund("AAAA11", start, 3, 10.0, Some(0.3), Some(0.7));
        source.add_fund("IFIX", start, 3, 2800.0, Some(1.0), Some(0.1));

        let assembler = QuotationAssembler::new(&source, &DatasetConfig::default());
        let window = Window::new(start, date(2021, 1, 10)).expect("window");
        let fund_set = vec!["IFIX".to_string(), "AAAA11".to_string()];

        let records = assembler.assemble(Some(fund_set.as_slice()), window).expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].features.len(), 3 * 4);
    }
}
