//! # count-apply
//!
//! Counts each member's applications in submission order and writes both the
//! count table and the full export with the counts attached.

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use lib_common::configs::config_sys::{load_runtime_config, RuntimeConfig, CONFIG_DEFAULT_NAME};
use lib_common::loggers::loggerlocal::LoggerLocal;
use lib_common::reconcile::counting::{attach_counts, count_applications, CountColumns};
use lib_common::reconcile::settings::{CountSettings, LogSettings};
use lib_common::reconcile::tabular::{read_table, write_table};
use lib_common::utils::misc::utils::process_basename;
use std::path::PathBuf;

/// CLI arguments for count-apply.
#[derive(Parser)]
#[clap(
    name = "count-apply",
    version = "1.0.0",
    about = "Adds per-member application counts to an applicant export."
)]
pub struct Cli {
    /// INI settings file; paths are read from its `[other]` section.
    #[clap(
        long,
        short = 'c',
        value_hint = ValueHint::FilePath,
        default_value = CONFIG_DEFAULT_NAME,
        env = "APPLICANT_RECONCILE_CONFIG"
    )]
    pub config: PathBuf,
}

fn main() {
    let args = Cli::parse();

    let config = match load_runtime_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    let logger = match LogSettings::from_config(&config) {
        Ok(settings) => settings.build_logger(&process_basename()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = execute(&config, &logger) {
        logger.fatal(&format!("Counting aborted: {:#}", e), None);
        std::process::exit(1);
    }
}

fn execute(config: &RuntimeConfig, logger: &LoggerLocal) -> Result<()> {
    let settings = CountSettings::from_config(config).context("Invalid [other] settings")?;
    let columns = CountColumns::default();

    let input = read_table(&settings.input_file, settings.encoding)?;
    let counts = count_applications(&input, &columns, &settings.dates, logger)?;
    write_table(&settings.count_file, &counts, settings.encoding)
        .with_context(|| format!("Cannot write count table {}", settings.count_file.display()))?;
    logger.info(&format!("Saved count table to {}", settings.count_file.display()), None);

    let output = attach_counts(&input, &counts, &columns)?;
    write_table(&settings.output_file, &output, settings.encoding)
        .with_context(|| format!("Cannot write {}", settings.output_file.display()))?;
    logger.info(
        &format!("Saved {} rows with counts to {}", output.len(), settings.output_file.display()),
        None,
    );
    Ok(())
}
