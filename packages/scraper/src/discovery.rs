//! Report link discovery.
//!
//! The observation search page lists every report published on the queried
//! date in a results table inside the main `view-content` region. Each row
//! links to a report by relative path, e.g. `/observation/67890`.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::ScrapeError;
use crate::fetch::Fetch;

const CONTEXT: &str = "search results page";

static CONTENT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.view-content").unwrap_or_else(|_| unreachable!()));

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").unwrap_or_else(|_| unreachable!()));

static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").unwrap_or_else(|_| unreachable!()));

/// Fetches the search page at `search_url` and returns its report links in
/// document order.
///
/// # Errors
///
/// * [`ScrapeError::Network`] if the search page cannot be fetched
/// * [`ScrapeError::Parsing`] if the page lacks the results container or
///   table
pub async fn discover<F: Fetch>(fetcher: &F, search_url: &str) -> Result<Vec<String>, ScrapeError> {
    log::debug!("Extracting report links from: {search_url}");
    let body = fetcher.fetch_text(search_url).await?;
    let links = parse_report_links(&body)?;
    log::debug!("Found {} report links", links.len());
    Ok(links)
}

/// Extracts the report links from a search results page.
///
/// A page with a results table but no rows yields an empty list.
///
/// # Errors
///
/// Returns [`ScrapeError::Parsing`] if the results container or its table is
/// missing.
pub fn parse_report_links(body: &str) -> Result<Vec<String>, ScrapeError> {
    let document = Html::parse_document(body);

    let content = document
        .select(&CONTENT_SEL)
        .next()
        .ok_or_else(|| ScrapeError::Parsing {
            context: CONTEXT.to_owned(),
            message: "results container div.view-content not found".to_owned(),
        })?;

    let table = content
        .select(&TABLE_SEL)
        .next()
        .ok_or_else(|| ScrapeError::Parsing {
            context: CONTEXT.to_owned(),
            message: "results table not found".to_owned(),
        })?;

    Ok(table
        .select(&LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_owned)
        .collect())
}
