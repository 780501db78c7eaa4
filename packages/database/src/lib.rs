#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Storage for scraped avalanche reports.
//!
//! Every sink is idempotent on `report_id`: submitting a report that is
//! already stored is a no-op reported as [`InsertOutcome::Skipped`], never an
//! error. [`report_db::DuckDbSink`] persists to a `DuckDB` file;
//! [`memory::MemorySink`] keeps everything in a map.

pub mod memory;
pub mod paths;
pub mod report_db;

use backcountry_report_models::ScrapedReport;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` query or connection error.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding of a list column failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be converted back into a model type.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// What happened to a single submitted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The report was stored.
    Inserted,
    /// A report with the same id was already stored.
    Skipped,
}

/// Counts from [`ReportSink::insert_reports_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl BatchSummary {
    /// Total number of reports submitted.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.inserted + self.skipped + self.failed
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} inserted, {} already stored, {} failed",
            self.inserted, self.skipped, self.failed
        )
    }
}

/// Destination for normalized reports.
pub trait ReportSink {
    /// Stores one report with its detail record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the report could not be stored. A duplicate
    /// `report_id` is not an error.
    fn insert_report(&mut self, report: &ScrapedReport) -> Result<InsertOutcome, DbError>;

    /// Stores every report, logging and counting failures instead of
    /// stopping at the first one.
    fn insert_reports_batch(&mut self, reports: &[ScrapedReport]) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for report in reports {
            match self.insert_report(report) {
                Ok(InsertOutcome::Inserted) => summary.inserted += 1,
                Ok(InsertOutcome::Skipped) => {
                    log::debug!("Report {} already stored", report.report_id());
                    summary.skipped += 1;
                }
                Err(e) => {
                    log::error!("Failed to insert report {}: {e}", report.report_id());
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "Successfully inserted {}/{} reports",
            summary.inserted,
            reports.len()
        );
        summary
    }
}
