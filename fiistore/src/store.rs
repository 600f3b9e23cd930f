use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::errors::{StoreError, StoreResult};
use crate::indicators;
use crate::source::FundDataSource;
use crate::types::{
    format_date, is_benchmark, parse_date, DailyQuotation, DividendRecord, RegisteredFund,
    BENCHMARK_TICKER,
};

/// Days without quotations after which a fund stops being valid.
pub const VALIDITY_WINDOW_DAYS: i64 = 30;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS registered_fiis (
        fii_id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker TEXT NOT NULL UNIQUE,
        historical_data_link TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS fiis_daily_quotation (
        fii_id INTEGER NOT NULL REFERENCES registered_fiis(fii_id),
        date TEXT NOT NULL,
        last REAL NOT NULL,
        open REAL NOT NULL,
        maximum REAL NOT NULL,
        minimum REAL NOT NULL,
        volume REAL NOT NULL DEFAULT 0,
        variation REAL NOT NULL DEFAULT 0,
        PRIMARY KEY (fii_id, date)
    );
    CREATE TABLE IF NOT EXISTS dividend_quotations (
        fii_id INTEGER NOT NULL REFERENCES registered_fiis(fii_id),
        date_record TEXT NOT NULL,
        date_payment TEXT,
        value REAL NOT NULL,
        PRIMARY KEY (fii_id, date_record)
    );
    CREATE INDEX IF NOT EXISTS idx_quotation_date ON fiis_daily_quotation(date);
";

/// SQLite-backed store of registered funds, quotations and dividends.
pub struct FiiStore {
    conn: Connection,
    reference_date: NaiveDate,
}

impl FiiStore {
    /// Opens (creating if needed) the database file and its schema.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;

        let _: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = 10000;
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.busy_timeout(Duration::from_secs(30))?;

        info!("📂 fund store opened: {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            reference_date: Local::now().date_naive(),
        })
    }

    /// Date against which fund validity is judged (defaults to today).
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = date;
        self
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    pub fn fund_id_by_ticker(&self, ticker: &str) -> StoreResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT fii_id FROM registered_fiis WHERE LOWER(ticker) = LOWER(?1)",
                params![ticker],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Registers a fund (or refreshes its link) and returns its id.
    pub fn register_fund(&self, ticker: &str, detail_link: &str) -> StoreResult<i64> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(StoreError::parsing("ticker", "empty ticker"));
        }

        self.conn.execute(
            "INSERT INTO registered_fiis (ticker, historical_data_link) VALUES (?1, ?2)
             ON CONFLICT(ticker) DO UPDATE SET historical_data_link = excluded.historical_data_link",
            params![ticker, detail_link],
        )?;

        self.fund_id_by_ticker(ticker)?
            .ok_or_else(|| StoreError::fund_not_found(ticker))
    }

    /// Upserts quotations of one fund in a single transaction.
    pub fn insert_daily_quotations(
        &mut self,
        fund_id: i64,
        quotations: &[DailyQuotation],
    ) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO fiis_daily_quotation
                    (fii_id, date, last, open, maximum, minimum, volume, variation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(fii_id, date) DO UPDATE SET
                    last = excluded.last, open = excluded.open,
                    maximum = excluded.maximum, minimum = excluded.minimum,
                    volume = excluded.volume, variation = excluded.variation",
            )?;
            for q in quotations {
                stmt.execute(params![
                    fund_id,
                    format_date(q.date),
                    q.last,
                    q.open,
                    q.maximum,
                    q.minimum,
                    q.volume,
                    q.variation
                ])?;
            }
        }
        tx.commit()?;
        Ok(quotations.len())
    }

    /// Upserts dividends of one fund in a single transaction.
    pub fn insert_dividends(
        &mut self,
        fund_id: i64,
        dividends: &[DividendRecord],
    ) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO dividend_quotations (fii_id, date_record, date_payment, value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(fii_id, date_record) DO UPDATE SET
                    date_payment = excluded.date_payment, value = excluded.value",
            )?;
            for d in dividends {
                stmt.execute(params![
                    fund_id,
                    format_date(d.date_record),
                    d.date_payment.map(format_date),
                    d.value
                ])?;
            }
        }
        tx.commit()?;
        Ok(dividends.len())
    }

    /// Funds quoted in the last [`VALIDITY_WINDOW_DAYS`] up to `date` and with
    /// at least one dividend recorded on or before `date`.
    pub fn valid_fund_ids_at(&self, date: NaiveDate) -> StoreResult<HashSet<i64>> {
        let window_start = date - chrono::Duration::days(VALIDITY_WINDOW_DAYS);
        let mut stmt = self.conn.prepare(
            "SELECT rf.fii_id FROM registered_fiis AS rf
             WHERE LOWER(rf.ticker) <> LOWER(?3)
               AND EXISTS (SELECT 1 FROM fiis_daily_quotation AS fdq
                           WHERE fdq.fii_id = rf.fii_id AND fdq.date >= ?1 AND fdq.date <= ?2)
               AND EXISTS (SELECT 1 FROM dividend_quotations AS dq
                           WHERE dq.fii_id = rf.fii_id AND dq.date_record <= ?2)",
        )?;
        let ids = stmt
            .query_map(
                params![format_date(window_start), format_date(date), BENCHMARK_TICKER],
                |row| row.get(0),
            )?
            .collect::<Result<HashSet<i64>, _>>()?;
        Ok(ids)
    }

    /// Number of sessions each fund joined within `[start, end]`.
    pub fn session_counts(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<HashMap<i64, usize>> {
        let mut stmt = self.conn.prepare(
            "SELECT fii_id, COUNT(*) FROM fiis_daily_quotation
             WHERE date >= ?1 AND date <= ?2
             GROUP BY fii_id",
        )?;
        let counts = stmt
            .query_map(params![format_date(start), format_date(end)], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<HashMap<i64, usize>, _>>()?;
        Ok(counts)
    }

    fn last_series(
        &self,
        fund_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<(NaiveDate, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, last FROM fiis_daily_quotation
             WHERE fii_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;
        let raw = stmt
            .query_map(params![fund_id, format_date(start), format_date(end)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(date, last)| Ok((parse_date(&date)?, last)))
            .collect()
    }

    fn tickers_by_id(&self) -> StoreResult<HashMap<i64, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT fii_id, ticker FROM registered_fiis")?;
        let map = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashMap<i64, String>, _>>()?;
        Ok(map)
    }

    fn averages_by_ticker(&self, sql: &str, start: NaiveDate, end: NaiveDate) -> StoreResult<HashMap<String, f64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let map = stmt
            .query_map(params![format_date(start), format_date(end)], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<HashMap<String, f64>, _>>()?;
        Ok(map)
    }
}

impl FundDataSource for FiiStore {
    fn registered_funds(&self, only_valid: bool) -> StoreResult<Vec<RegisteredFund>> {
        let mut stmt = self.conn.prepare(
            "SELECT fii_id, ticker, historical_data_link FROM registered_fiis
             WHERE historical_data_link <> ''
             ORDER BY ticker ASC",
        )?;
        let funds = stmt
            .query_map([], |row| {
                Ok(RegisteredFund {
                    id: row.get(0)?,
                    ticker: row.get(1)?,
                    detail_link: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let funds: Vec<RegisteredFund> = funds
            .into_iter()
            .filter(|fund| !is_benchmark(&fund.ticker))
            .collect();

        if !only_valid {
            return Ok(funds);
        }

        let valid = self.valid_fund_ids_at(self.reference_date)?;
        let funds: Vec<RegisteredFund> = funds
            .into_iter()
            .filter(|fund| valid.contains(&fund.id))
            .collect();
        debug!(
            "valid funds at {}: {}",
            format_date(self.reference_date),
            funds.len()
        );
        Ok(funds)
    }

    fn daily_quotation(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<DailyQuotation>> {
        let fund_id = self
            .fund_id_by_ticker(ticker)?
            .ok_or_else(|| StoreError::fund_not_found(ticker))?;

        let mut stmt = self.conn.prepare(
            "SELECT date, last, open, maximum, minimum, volume, variation
             FROM fiis_daily_quotation
             WHERE fii_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;
        let raw = stmt
            .query_map(params![fund_id, format_date(start), format_date(end)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    [
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                    ],
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(date, [last, open, maximum, minimum, volume, variation])| {
                Ok(DailyQuotation {
                    date: parse_date(&date)?,
                    last,
                    open,
                    maximum,
                    minimum,
                    volume,
                    variation,
                })
            })
            .collect()
    }

    fn calculate_beta(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        symmetric: bool,
    ) -> StoreResult<HashMap<String, f64>> {
        let benchmark_id = match self.fund_id_by_ticker(BENCHMARK_TICKER)? {
            Some(id) => id,
            None => {
                warn!("benchmark {} is not registered, no beta available", BENCHMARK_TICKER);
                return Ok(HashMap::new());
            }
        };
        let benchmark: HashMap<NaiveDate, f64> = self
            .last_series(benchmark_id, start, end)?
            .into_iter()
            .collect();

        let tickers = self.tickers_by_id()?;
        let candidates: Vec<i64> = if symmetric {
            let valid = self.valid_fund_ids_at(end)?;
            let counts: HashMap<i64, usize> = self
                .session_counts(start, end)?
                .into_iter()
                .filter(|(id, _)| valid.contains(id))
                .collect();
            indicators::max_session_funds(&counts)
        } else {
            let mut ids: Vec<i64> = tickers
                .iter()
                .filter(|(_, ticker)| !is_benchmark(ticker))
                .map(|(&id, _)| id)
                .collect();
            ids.sort_unstable();
            ids
        };

        let mut betas = HashMap::new();
        for fund_id in candidates {
            let Some(ticker) = tickers.get(&fund_id) else {
                continue;
            };
            let series = self.last_series(fund_id, start, end)?;
            if let Some(value) = indicators::beta(&series, &benchmark) {
                betas.insert(ticker.clone(), value);
            }
        }

        debug!(
            "beta computed for {} funds ({} ~ {}, symmetric: {})",
            betas.len(),
            format_date(start),
            format_date(end),
            symmetric
        );
        Ok(betas)
    }

    fn dividend_yield(&self, _start: NaiveDate, end: NaiveDate) -> StoreResult<HashMap<String, f64>> {
        let lookback_start = indicators::one_year_before(end);

        let dividends = self.averages_by_ticker(
            "SELECT rf.ticker, AVG(dq.value)
             FROM dividend_quotations AS dq
             JOIN registered_fiis AS rf ON rf.fii_id = dq.fii_id
             WHERE dq.date_record >= ?1 AND dq.date_record <= ?2
             GROUP BY rf.fii_id, rf.ticker",
            lookback_start,
            end,
        )?;
        let quotations = self.averages_by_ticker(
            "SELECT rf.ticker, AVG(fdq.last)
             FROM fiis_daily_quotation AS fdq
             JOIN registered_fiis AS rf ON rf.fii_id = fdq.fii_id
             WHERE fdq.date >= ?1 AND fdq.date <= ?2
             GROUP BY rf.fii_id, rf.ticker",
            lookback_start,
            end,
        )?;

        let yields: HashMap<String, f64> = dividends
            .into_iter()
            .filter(|(ticker, _)| !is_benchmark(ticker))
            .filter_map(|(ticker, avg_dividend)| {
                let avg_quotation = quotations.get(&ticker)?;
                indicators::dividend_yield(avg_dividend, *avg_quotation).map(|dy| (ticker, dy))
            })
            .collect();

        debug!(
            "dividend yield computed for {} funds ({} ~ {})",
            yields.len(),
            format_date(lookback_start),
            format_date(end)
        );
        Ok(yields)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Datelike;

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
    }

    pub(crate) fn quotation(day: NaiveDate, last: f64) -> DailyQuotation {
        DailyQuotation {
            date: day,
            last,
            open: last - 0.5,
            maximum: last + 1.0,
            minimum: last - 1.0,
            volume: 1000.0,
            variation: 0.1,
        }
    }

    /// Sessions on every weekday of January 2021 (19 sessions).
    fn january_sessions() -> Vec<NaiveDate> {
        (1..=31)
            .map(|d| date(2021, 1, d))
            .filter(|d| d.weekday().number_from_monday() <= 5)
            .collect()
    }

    fn seeded_store() -> FiiStore {
        let mut store = FiiStore::open_in_memory()
            .expect("in-memory store")
            .with_reference_date(date(2021, 1, 31));
        let sessions = january_sessions();

        let ifix = store.register_fund("IFIX", "link/ifix").expect("register");
        let bench: Vec<DailyQuotation> = sessions
            .iter()
            .enumerate()
            .map(|(i, d)| quotation(*d, 2800.0 + (i as f64 * 7.0) % 23.0))
            .collect();
        store.insert_daily_quotations(ifix, &bench).expect("insert");

        for (n, ticker) in ["AAAA11", "BBBB11", "CCCC11"].iter().enumerate() {
            let id = store.register_fund(ticker, &format!("link/{}", ticker)).expect("register");
            // CCCC11 misses the last two sessions
            let take = if *ticker == "CCCC11" { sessions.len() - 2 } else { sessions.len() };
            let quotes: Vec<DailyQuotation> = bench
                .iter()
                .take(take)
                .map(|q| quotation(q.date, q.last / 28.0 * (n as f64 + 1.0)))
                .collect();
            store.insert_daily_quotations(id, &quotes).expect("insert");
            store
                .insert_dividends(
                    id,
                    &[DividendRecord {
                        date_record: date(2021, 1, 15),
                        date_payment: Some(date(2021, 1, 25)),
                        value: 0.5 * (n as f64 + 1.0),
                    }],
                )
                .expect("insert dividends");
        }

        // registered without link, never part of the fund list
        store.register_fund("DDDD11", "").expect("register");
        store
    }

    #[test]
    fn test_registered_funds_excludes_benchmark_and_unlinked() {
        let store = seeded_store();
        let funds = store.registered_funds(false).expect("funds");
        let tickers: Vec<&str> = funds.iter().map(|f| f.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAAA11", "BBBB11", "CCCC11"]);
    }

    #[test]
    fn test_only_valid_funds_need_recent_quotes() {
        let store = seeded_store().with_reference_date(date(2021, 6, 30));
        assert!(store.registered_funds(true).expect("funds").is_empty());

        let store = store.with_reference_date(date(2021, 2, 1));
        assert_eq!(store.registered_funds(true).expect("funds").len(), 3);
    }

    #[test]
    fn test_daily_quotation_is_ordered_and_bounded() {
        let store = seeded_store();
        let rows = store
            .daily_quotation("aaaa11", date(2021, 1, 5), date(2021, 1, 12))
            .expect("quotations");
        assert_eq!(rows.len(), 6);
        assert!(rows.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(rows[0].date, date(2021, 1, 5));
    }

    #[test]
    fn test_daily_quotation_unknown_ticker() {
        let store = seeded_store();
        let error = store
            .daily_quotation("ZZZZ11", date(2021, 1, 1), date(2021, 1, 31))
            .expect_err("unknown ticker");
        assert!(matches!(error, StoreError::FundNotFound { .. }));
    }

    #[test]
    fn test_symmetric_beta_keeps_only_full_session_funds() {
        let store = seeded_store();
        let betas = store
            .calculate_beta(date(2021, 1, 1), date(2021, 1, 31), true)
            .expect("betas");
        let mut tickers: Vec<&String> = betas.keys().collect();
        tickers.sort();
        assert_eq!(tickers, vec!["AAAA11", "BBBB11"]);

        // each fund is a scaled copy of the benchmark: beta = scale * (n - 1) / n
        let n = january_sessions().len() as f64;
        let expected = (1.0 / 28.0) * (n - 1.0) / n;
        assert!((betas["AAAA11"] - expected).abs() < 1e-9);
        assert!((betas["BBBB11"] - 2.0 * expected).abs() < 1e-9);
    }

    #[test]
    fn test_plain_beta_covers_every_fund() {
        let store = seeded_store();
        let betas = store
            .calculate_beta(date(2021, 1, 1), date(2021, 1, 31), false)
            .expect("betas");
        assert_eq!(betas.len(), 3);
        assert!(!betas.contains_key("IFIX"));
    }

    #[test]
    fn test_dividend_yield_ignores_start_date() {
        let store = seeded_store();
        let wide = store
            .dividend_yield(date(1990, 1, 1), date(2021, 1, 31))
            .expect("dy");
        let narrow = store
            .dividend_yield(date(2021, 1, 30), date(2021, 1, 31))
            .expect("dy");
        assert_eq!(wide, narrow);
        assert_eq!(wide.len(), 3);
        assert!(wide.values().all(|dy| *dy > 0.0));
    }

    #[test]
    fn test_dividend_yield_lookback_is_one_year() {
        let store = seeded_store();
        let later = store
            .dividend_yield(date(2021, 1, 1), date(2022, 2, 1))
            .expect("dy");
        assert!(later.is_empty());
    }
}
