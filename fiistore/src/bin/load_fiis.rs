use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info};

use fiistore::{init_tracing, load_directory, LoadOptions};

#[derive(Parser)]
#[command(name = "load_fiis")]
#[command(about = "Imports fund quotations and dividends from CSV files into the SQLite store")]
struct Args {
    /// Directory holding funds.csv, dividends.csv and quotations/
    #[arg(short, long)]
    data_dir: PathBuf,

    /// SQLite database file (created if missing)
    #[arg(long, env = "FIIS_DB_PATH", default_value = "fiis.db")]
    db: PathBuf,

    /// Worker threads used for the import
    #[arg(short, long, default_value_t = fiistore::loader::DEFAULT_THREADS)]
    threads: usize,

    /// Prints the per-fund summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("info").map_err(anyhow::Error::msg)?;

    if !args.data_dir.is_dir() {
        bail!("data directory not found: {}", args.data_dir.display());
    }

    info!("🚀 load_fiis started");
    info!("📁 data directory: {}", args.data_dir.display());
    info!("💾 database: {}", args.db.display());

    let mut options = LoadOptions::new(&args.data_dir, &args.db);
    options.threads = args.threads;

    let summary = load_directory(&options).context("fund import failed")?;

    for outcome in summary.outcomes.iter().filter(|o| o.error.is_some()) {
        error!(
            "{}: {}",
            outcome.ticker,
            outcome.error.as_deref().unwrap_or_default()
        );
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "funds loaded: {}  failed: {}  quotations: {}  dividends: {}",
            summary.loaded(),
            summary.failed(),
            summary.total_quotations(),
            summary.total_dividends()
        );
    }

    info!("🏁 load_fiis finished");
    Ok(())
}
