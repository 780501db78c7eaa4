#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report harvesting for the avalanche center's public website.
//!
//! The pipeline for one calendar day is:
//!
//! 1. [`discovery`] fetches the date-scoped search page and collects the
//!    report links in document order.
//! 2. [`session::ScrapeSession`] fetches each report page (with a fixed
//!    politeness delay) and classifies it by its first path segment.
//! 3. [`normalize::ReportNormalizer`] extracts labeled fields through
//!    [`fields::ReportPage`], fills gaps from the linked `SnowPilot` profile
//!    ([`snowpilot`]) and emits a [`ScrapedReport`].
//!
//! This crate knows nothing about storage. Callers hand the resulting
//! records to a sink of their choosing.

pub mod compass;
pub mod discovery;
pub mod fetch;
pub mod fields;
pub mod normalize;
pub mod progress;
pub mod provider;
pub mod session;
pub mod snowpilot;

pub use backcountry_report_models::ScrapedReport;

use backcountry_report_models::RegionNotFoundError;

/// Errors that can occur while harvesting reports.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// A page could not be fetched (transport failure, timeout, non-2xx).
    #[error("Network request failed: {url}: {message}")]
    Network {
        /// The URL that was requested.
        url: String,
        /// Description of the transport failure.
        message: String,
    },

    /// A fetched document is missing the structure the scraper relies on.
    #[error("Parsing failed for {context}: {message}")]
    Parsing {
        /// What was being parsed (e.g. "search results page").
        context: String,
        /// Description of what was missing.
        message: String,
    },

    /// A mandatory field is missing or malformed.
    #[error("Failed to extract field {field}: {message}")]
    DataExtraction {
        /// Name of the record field that could not be produced.
        field: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A value is present but fails validation.
    #[error("{reason} for field '{field}': {value}")]
    InvalidData {
        /// Name of the offending field.
        field: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The linked snow profile could not be loaded.
    #[error(transparent)]
    SecondarySource(#[from] SecondarySourceError),

    /// A region name is not one of the known forecast regions.
    #[error(transparent)]
    RegionNotFound(#[from] RegionNotFoundError),
}

impl ScrapeError {
    /// Builds a [`ScrapeError::DataExtraction`] for `field`.
    #[must_use]
    pub fn extraction(field: &str, message: impl Into<String>) -> Self {
        Self::DataExtraction {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error should abort the whole session rather
    /// than skip a single report.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Parsing { .. })
    }
}

/// Failure to load or parse a `SnowPilot` profile.
///
/// Never escapes [`normalize::ReportNormalizer`]: the normalizer logs it
/// and treats the affected fields as absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("SnowPilot error: {url}: {message}")]
pub struct SecondarySourceError {
    /// The profile page or XML URL that failed.
    pub url: String,
    /// Description of the failure.
    pub message: String,
}

impl SecondarySourceError {
    pub(crate) fn new(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_owned(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`Fetch`](crate::fetch::Fetch) implementation serving
    //! canned documents by URL.

    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use crate::ScrapeError;
    use crate::fetch::Fetch;

    #[derive(Default)]
    pub struct MapFetcher {
        pages: BTreeMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl MapFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_owned(), body.to_owned());
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Fetch for MapFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
            self.requests.lock().unwrap().push(url.to_owned());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::Network {
                    url: url.to_owned(),
                    message: "HTTP status client error (404 Not Found)".to_owned(),
                })
        }
    }
}
