//! Risk (beta) and yield (dividend yield) classification of FIIs from their
//! daily quotations.

use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

pub mod dataset;
pub mod model;
pub mod report;
pub mod runner;
pub mod trainer;
pub mod utility;
pub mod validator;

/// JSON logs on stderr so stdout only carries the result tables.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) -> Result<(), String> {
    LogTracer::init().map_err(|e| format!("failed to set LogTracer: {}", e))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("failed to set tracing subscriber: {}", e))
}
