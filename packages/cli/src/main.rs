#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Scrapes one day of Utah Avalanche Center reports.
//!
//! Runs a single session for the requested date and either prints the
//! normalized records as JSON (`--dry-run`) or stores them in the `DuckDB`
//! report store.
//!
//! ```text
//! backcountry_scrape [--date YYYY-MM-DD] [--db PATH] [--dry-run] [--delay-ms N]
//! ```

mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use backcountry_database::report_db::DuckDbSink;
use backcountry_database::{DbError, ReportSink, paths};
use backcountry_report_models::ScrapeDate;
use backcountry_scraper::ScrapeError;
use backcountry_scraper::fetch::HttpFetcher;
use backcountry_scraper::provider::utah;
use backcountry_scraper::session::ScrapeSession;
use chrono::NaiveDate;
use clap::Parser;
use indicatif::MultiProgress;

use crate::progress::IndicatifProgress;

#[derive(Debug, Parser)]
#[command(
    name = "backcountry_scrape",
    about = "Scrape one day of Utah Avalanche Center observation and avalanche reports"
)]
struct Cli {
    /// Day to scrape (YYYY-MM-DD). Defaults to yesterday.
    #[arg(long, value_parser = parse_date)]
    date: Option<ScrapeDate>,

    /// Path of the `DuckDB` report store. Defaults to `data/reports.duckdb`.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Print the records as JSON instead of storing them.
    #[arg(long)]
    dry_run: bool,

    /// Delay before each report page request, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Scrape session aborted")]
    Scrape(#[from] ScrapeError),

    #[error("Report store failed")]
    Database(#[from] DbError),

    #[error("Failed to encode reports as JSON")]
    Json(#[from] serde_json::Error),
}

fn parse_date(value: &str) -> Result<ScrapeDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(ScrapeDate::new)
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

async fn run(cli: &Cli, multi: &MultiProgress) -> Result<(), CliError> {
    let date = cli.date.unwrap_or_else(ScrapeDate::yesterday);
    let provider = utah();
    let fetcher = HttpFetcher::new(provider)?;

    let bar = IndicatifProgress::reports_bar(multi, &format!("Scraping {date}"));
    let mut session = ScrapeSession::new(&fetcher, provider, date).with_progress(bar);
    if let Some(ms) = cli.delay_ms {
        session = session.with_delay(Duration::from_millis(ms));
    }

    log::info!("Searching {}", session.search_url());
    let outcome = session.run().await?;

    for skipped in &outcome.skipped {
        log::warn!("Skipped {}: {}", skipped.url, skipped.error);
    }
    log::info!(
        "{} reports were collected for {date}",
        outcome.reports.len()
    );

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&outcome.reports)?);
        return Ok(());
    }

    let path = cli.db.clone().unwrap_or_else(paths::reports_db_path);
    let mut sink = DuckDbSink::open(&path)?;
    let summary = sink.insert_reports_batch(&outcome.reports);
    log::info!("{}: {summary}", path.display());

    Ok(())
}

fn log_error_chain(error: &dyn std::error::Error) {
    log::error!("{error}");
    let mut source = error.source();
    while let Some(cause) = source {
        log::error!("  caused by: {cause}");
        source = cause.source();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let multi = progress::init_logger();
    let cli = Cli::parse();

    match run(&cli, &multi).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_error_chain(&e);
            ExitCode::FAILURE
        }
    }
}
