use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{StoreError, StoreResult};

/// ISO 8601 calendar date, the only date format stored and accepted.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Ticker of the benchmark index every beta is computed against.
pub const BENCHMARK_TICKER: &str = "IFIX";

/// One row of `registered_fiis`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredFund {
    pub id: i64,
    pub ticker: String,
    pub detail_link: String,
}

/// One trading session of a fund
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyQuotation {
    pub date: NaiveDate,
    pub last: f64,
    pub open: f64,
    pub maximum: f64,
    pub minimum: f64,
    pub volume: f64,
    pub variation: f64,
}

/// One dividend announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendRecord {
    pub date_record: NaiveDate,
    pub date_payment: Option<NaiveDate>,
    pub value: f64,
}

pub fn parse_date(value: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| StoreError::parsing("date", format!("{} ({})", value, e)))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn is_benchmark(ticker: &str) -> bool {
    ticker.eq_ignore_ascii_case(BENCHMARK_TICKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_round_trip() {
        let date = parse_date("2021-03-31").expect("valid date");
        assert_eq!(format_date(date), "2021-03-31");
        assert!(parse_date("31/03/2021").is_err());
    }

    #[test]
    fn test_benchmark_detection() {
        assert!(is_benchmark("ifix"));
        assert!(is_benchmark("IFIX"));
        assert!(!is_benchmark("HGLG11"));
    }
}
