//! # applicant-reconcile
//!
//! Reconciles the latest applicant export with the accepted baseline and writes
//! the next baseline, keeping the previous one as a timestamped backup.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{ArgAction, Parser, ValueHint};
use lib_common::configs::config_sys::{load_runtime_config, RuntimeConfig, CONFIG_DEFAULT_NAME};
use lib_common::loggers::loggerlocal::LoggerLocal;
use lib_common::reconcile::pipeline::run;
use lib_common::reconcile::settings::{LogSettings, ReconcileSettings, TargetDate};
use lib_common::utils::misc::utils::process_basename;
use std::path::PathBuf;

/// CLI arguments for applicant-reconcile.
#[derive(Parser)]
#[clap(
    name = "applicant-reconcile",
    version = "1.0.0",
    about = "Merges a fresh applicant export into the accepted baseline.",
    long_about = "Admits new applications (minus block-listed venues), applies field updates \
                  modified on or after the target date, numbers new applications per member \
                  and replaces the baseline file, backing up the previous one."
)]
pub struct Cli {
    /// INI settings file.
    #[clap(
        long,
        short = 'c',
        value_hint = ValueHint::FilePath,
        default_value = CONFIG_DEFAULT_NAME,
        env = "APPLICANT_RECONCILE_CONFIG"
    )]
    pub config: PathBuf,

    /// Update cutoff, `yesterday` or YYYY-MM-DD. Overrides `target_date`.
    #[clap(long, value_name = "DATE")]
    pub target_date: Option<String>,

    /// Reconcile and report without writing the output or touching backups.
    #[clap(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,
}

fn main() {
    let args = Cli::parse();

    let (config, logger) = match bootstrap(&args) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Error: Failed to load settings.");
            eprintln!("Details: {:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = execute(&args, &config, &logger) {
        logger.fatal(&format!("Reconciliation aborted: {:#}", e), None);
        std::process::exit(1);
    }
}

/// Loads the settings file and builds the diagnostics sink from `[logging]`.
fn bootstrap(args: &Cli) -> Result<(RuntimeConfig, LoggerLocal)> {
    let config = load_runtime_config(&args.config)
        .with_context(|| format!("Cannot read {}", args.config.display()))?;
    let logger = LogSettings::from_config(&config)
        .context("Invalid [logging] settings")?
        .build_logger(&process_basename());
    Ok((config, logger))
}

fn execute(args: &Cli, config: &RuntimeConfig, logger: &LoggerLocal) -> Result<()> {
    let mut settings = ReconcileSettings::from_config(config).context("Invalid settings")?;
    if let Some(raw) = &args.target_date {
        settings.target_date = raw
            .parse::<TargetDate>()
            .map_err(anyhow::Error::msg)
            .context("Invalid --target-date")?;
    }

    let summary = run(&settings, Local::now().naive_local(), args.dry_run, logger)?;

    match &summary.write {
        Some(report) => logger.info(
            &format!(
                "Done: {} rows in {}{}",
                report.rows,
                report.output.display(),
                report
                    .backup
                    .as_ref()
                    .map(|b| format!(", previous kept as {}", b.display()))
                    .unwrap_or_default()
            ),
            None,
        ),
        None => logger.info(
            &format!("Done (dry run): cutoff {}", summary.target_date),
            None,
        ),
    }
    Ok(())
}
