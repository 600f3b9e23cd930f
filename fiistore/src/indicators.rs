//! Benchmark-relative indicators computed from stored quotations.
//!
//! Beta follows the historical SQL definition
//! `COVAR_POP(fund.last, ifix.last) / VARIANCE(ifix.last)`, where `VARIANCE`
//! is the sample variance. Dividend yield is a trailing one-year figure.

use std::collections::HashMap;

use chrono::{Months, NaiveDate};

/// Beta of a fund against the benchmark, over the sessions both share.
///
/// `None` when fewer than two sessions are shared or the benchmark did not move.
pub fn beta(fund: &[(NaiveDate, f64)], benchmark: &HashMap<NaiveDate, f64>) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = fund
        .iter()
        .filter_map(|(date, last)| benchmark.get(date).map(|b| (*last, *b)))
        .collect();

    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_fund = pairs.iter().map(|(f, _)| f).sum::<f64>() / n;
    let mean_bench = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;

    let covar_pop = pairs
        .iter()
        .map(|(f, b)| (f - mean_fund) * (b - mean_bench))
        .sum::<f64>()
        / n;
    let var_samp = pairs
        .iter()
        .map(|(_, b)| (b - mean_bench).powi(2))
        .sum::<f64>()
        / (n - 1.0);

    if var_samp.abs() < f64::EPSILON {
        return None;
    }

    let value = covar_pop / var_samp;
    value.is_finite().then_some(value)
}

/// Ids of the funds that joined the greatest number of sessions.
///
/// Every fund tied at the maximum qualifies. Funds without sessions never do.
pub fn max_session_funds(session_counts: &HashMap<i64, usize>) -> Vec<i64> {
    let maximum = match session_counts.values().copied().max() {
        Some(max) if max > 0 => max,
        _ => return Vec::new(),
    };

    let mut ids: Vec<i64> = session_counts
        .iter()
        .filter(|(_, &count)| count == maximum)
        .map(|(&id, _)| id)
        .collect();
    ids.sort_unstable();
    ids
}

/// Dividend yield in percent: average dividend over average quotation.
pub fn dividend_yield(avg_dividend: f64, avg_quotation: f64) -> Option<f64> {
    if avg_quotation.abs() < f64::EPSILON {
        return None;
    }
    let value = 100.0 * avg_dividend / avg_quotation;
    value.is_finite().then_some(value)
}

/// Start of the trailing one-year lookback ending at `end`.
pub fn one_year_before(end: NaiveDate) -> NaiveDate {
    end.checked_sub_months(Months::new(12)).unwrap_or(NaiveDate::MIN)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
