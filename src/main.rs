mod config;

use crate::config::{Config, ConfigError};

use std::path::Path;

use clap::Parser;
use perf::runner::{self, CaseReport};
use perf::{Backends, LocalStorage};
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<String>,

    /// Only run cases whose name contains this
    #[arg(short, long)]
    filter: Option<String>,

    /// Runs per case, instead of each case's own iteration count
    #[arg(short = 'n', long)]
    repetitions: Option<u32>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// List the selected cases and exit
    #[arg(long)]
    list: bool,
}

#[derive(Error, Debug)]
enum Error {
    #[error("Unable to open local storage: {0}")]
    LocalStorage(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] perf::StoreError),

    #[error("Unable to serialize report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Unable to write results: {0}")]
    Results(String),
}

fn main() {
    pretty_env_logger::formatted_timed_builder()
        .filter(None, log::LevelFilter::Info)
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_default())
        .init();

    let args = Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };
    if args.filter.is_some() {
        config.filter = args.filter.clone();
    }
    if args.repetitions.is_some() {
        config.repetitions = args.repetitions;
    }
    log::debug!("Config loaded successfully: {:#?}", config);

    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Unable to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(&config, &args)) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load(Path::new(path)),
        None if Path::new(config::DEFAULT_PATH).exists() => {
            Config::load(Path::new(config::DEFAULT_PATH))
        }
        None => Ok(Config::default()),
    }
}

async fn run(config: &Config, args: &Args) -> Result<(), Error> {
    let local_storage = match &config.local_storage_path {
        Some(path) => LocalStorage::open(path)?,
        None => LocalStorage::in_memory(),
    };
    let backends = Backends {
        idb: kv::idb::Factory::new(),
        local_storage,
    };
    let options = config.run_options();

    let mut reports = Vec::new();
    for suite in &config.suites {
        let cases = suite.test_cases(&backends);
        if args.list {
            for case in cases.iter().filter(|case| options.selects(case)) {
                println!("{suite}\t{}\t{}", case.name, case.label);
            }
            continue;
        }

        log::info!("Running suite {suite}");
        reports.extend(runner::run_cases(&cases, &options).await?);
    }

    if args.list {
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_table(&reports);
    }

    if let Some(path) = &config.results_path {
        let json = serde_json::to_string_pretty(&reports)?;
        std::fs::write(path, json).map_err(|e| Error::Results(e.to_string()))?;
        log::info!("Results saved to {}", path.display());
    }

    Ok(())
}

fn print_table(reports: &[CaseReport]) {
    println!(
        "{:<28} {:>10} {:>10} {:>10} {:>10}  label",
        "name", "median ms", "mean ms", "p95 ms", "max ms"
    );
    for report in reports {
        match (&report.summary, &report.error) {
            (_, Some(error)) => println!("{:<28} failed: {error}", report.name),
            (Some(s), None) => println!(
                "{:<28} {:>10.3} {:>10.3} {:>10.3} {:>10.3}  {}",
                report.name, s.median_ms, s.mean_ms, s.p95_ms, s.max_ms, report.label
            ),
            (None, None) => println!("{:<28} no samples  {}", report.name, report.label),
        }
    }
}
