//! Fund data collaborator: SQLite store, benchmark indicators and bulk loader.

use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

pub mod errors;
pub mod indicators;
pub mod loader;
pub mod source;
pub mod store;
pub mod types;

pub use errors::{StoreError, StoreResult};
pub use loader::{load_directory, FundLoadOutcome, LoadOptions, LoadSummary};
pub use source::FundDataSource;
pub use store::FiiStore;
pub use types::{DailyQuotation, DividendRecord, RegisteredFund, BENCHMARK_TICKER};

/// Installs the JSON tracing subscriber on stderr.
///
/// `RUST_LOG` wins over `default_level`. Records emitted through the `log`
/// macros are forwarded as well.
pub fn init_tracing(default_level: &str) -> Result<(), String> {
    LogTracer::init().map_err(|e| format!("failed to set LogTracer: {}", e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .with_target(true),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("failed to set tracing subscriber: {}", e))
}
