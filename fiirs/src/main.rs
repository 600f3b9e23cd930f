use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use fiirs::runner::RunnerBuilder;
use fiirs::utility::config::{Config, DATE_FORMAT};
use fiirs::utility::errors::{FiirsError, FiirsResult};
use fiistore::FiiStore;

#[derive(Parser)]
#[command(name = "fiirs")]
#[command(about = "Trains and validates FII beta / dividend yield classifiers")]
struct Args {
    /// Configuration file; built-in defaults are used when it does not exist
    #[arg(short, long, env = "FIIRS_CONFIG", default_value = "config.toml")]
    config: String,

    /// 0 = quiet, 1 = summaries, 2 = per-fund details
    #[arg(short, long)]
    verbosity: Option<u8>,

    /// FII database path (overrides database.fiis_db_path)
    #[arg(long)]
    db: Option<String>,

    /// Training window end, YYYY-MM-DD
    #[arg(long)]
    train_end: Option<String>,

    /// Validation window end, YYYY-MM-DD
    #[arg(long)]
    validation_end: Option<String>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report_json: Option<String>,
}

fn load_config(args: &Args) -> FiirsResult<Config> {
    let mut config = if Path::new(&args.config).exists() {
        Config::load_from_file(&args.config)?
    } else {
        Config::from_env()?
    };

    if let Some(db) = &args.db {
        config.database.fiis_db_path = db.clone();
    }
    if let Some(end) = &args.train_end {
        config.training.end_date = end.clone();
    }
    if let Some(end) = &args.validation_end {
        config.validation.end_date = end.clone();
    }
    if let Some(path) = &args.report_json {
        config.report.json_path = Some(path.clone());
    }
    if let Some(verbosity) = args.verbosity {
        config.logging.verbosity = verbosity;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: &Args, config: Config) -> FiirsResult<()> {
    info!("🚀 fiirs start");
    info!("📁 config file: {}", args.config);
    info!(
        "📅 training ends {} ({} months), validation ends {} ({} months)",
        config.training_end_date()?.format(DATE_FORMAT),
        config.training.window_months,
        config.validation_end_date()?.format(DATE_FORMAT),
        config.validation.window_months
    );

    let store = FiiStore::open(&config.database.fiis_db_path)?;
    info!("💾 fii db: {}", config.database.fiis_db_path);

    let verbosity = config.logging.verbosity;
    let mut runner = RunnerBuilder::new()
        .config(config)
        .source(&store)
        .verbosity(verbosity)
        .build()?;
    runner.run()?;

    info!("🏁 fiirs finished");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fiirs: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = fiirs::init_tracing(&config.logging.level) {
        eprintln!("fiirs: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&args, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if matches!(e, FiirsError::WidthMismatch { .. }) {
                error!("❌ validation window is too short for the trained models: {}", e);
            } else {
                error!("❌ pipeline failed: {}", e);
            }
            eprintln!("fiirs: {}", e);
            ExitCode::FAILURE
        }
    }
}
