//! Provider configuration loaded from embedded TOML.
//!
//! The provider file is baked into the binary with [`include_str!`] and
//! parsed once per process. Everything site-specific that is not page
//! structure lives here: the base URL, the search-query template, the
//! request header set, the politeness delay and the request deadline.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use backcountry_report_models::ScrapeDate;
use serde::Deserialize;

use crate::ScrapeError;

/// Embedded provider config for the Utah Avalanche Center.
const UTAH_TOML: &str = include_str!("../providers/utah.toml");

static UTAH: LazyLock<ProviderConfig> = LazyLock::new(|| {
    parse_provider_toml(UTAH_TOML).unwrap_or_else(|e| panic!("Failed to parse utah.toml: {e}"))
});

/// Site-level settings for one avalanche center.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Short identifier (e.g. `"utah"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Numeric state identifier stamped on every base record.
    pub state_id: u16,
    /// State name stamped on every base record.
    pub state_name: String,
    /// Scheme and host that relative report links are resolved against.
    pub base_url: String,
    /// Path and query of the observation search, with `{day}`, `{month}`
    /// and `{year}` placeholders.
    pub search_path: String,
    /// Fixed delay before each report page request.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Deadline applied to every HTTP request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Default headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

const fn default_request_delay_ms() -> u64 {
    1_000
}

const fn default_timeout_secs() -> u64 {
    10
}

impl ProviderConfig {
    /// Builds the date-scoped search URL for `date`.
    #[must_use]
    pub fn search_url(&self, date: ScrapeDate) -> String {
        let path = self
            .search_path
            .replace("{day}", &date.day())
            .replace("{month}", &date.month())
            .replace("{year}", &date.year());
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Resolves a report link from the search page to an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::InvalidData`] if the base URL or the link
    /// cannot be parsed as a URL.
    pub fn report_url(&self, link: &str) -> Result<url::Url, ScrapeError> {
        let invalid = |value: &str, e: url::ParseError| ScrapeError::InvalidData {
            field: "report_url".to_owned(),
            value: value.to_owned(),
            reason: format!("Unparseable URL ({e})"),
        };
        let base = url::Url::parse(&self.base_url).map_err(|e| invalid(&self.base_url, e))?;
        base.join(link).map_err(|e| invalid(link, e))
    }
}

/// Parses a provider definition from TOML text.
///
/// # Errors
///
/// Returns a [`toml::de::Error`] if the text is not a valid provider
/// definition.
pub fn parse_provider_toml(text: &str) -> Result<ProviderConfig, toml::de::Error> {
    toml::from_str(text)
}

/// Returns the embedded Utah Avalanche Center configuration.
///
/// # Panics
///
/// Panics on first use if the embedded TOML is malformed.
#[must_use]
pub fn utah() -> &'static ProviderConfig {
    &UTAH
}
