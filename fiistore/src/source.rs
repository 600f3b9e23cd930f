use std::collections::HashMap;

use chrono::NaiveDate;

use crate::errors::StoreResult;
use crate::types::{DailyQuotation, RegisteredFund};

/// Read-only access to already materialized fund data.
///
/// This is everything the classification pipeline consumes. Implementations
/// may be backed by SQLite ([`crate::FiiStore`]) or by fixtures in tests.
pub trait FundDataSource {
    /// Registered funds (benchmark excluded); with `only_valid`, only those
    /// that are currently quoted and paying dividends.
    fn registered_funds(&self, only_valid: bool) -> StoreResult<Vec<RegisteredFund>>;

    /// Daily quotations of `ticker` within `[start, end]`, ascending by date.
    fn daily_quotation(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DailyQuotation>>;

    /// Beta against the benchmark for every fund with enough shared sessions.
    fn calculate_beta(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        symmetric: bool,
    ) -> StoreResult<HashMap<String, f64>>;

    /// Trailing one-year dividend yield anchored at `end`. `start` is not used.
    fn dividend_yield(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<HashMap<String, f64>>;
}
