//! `SnowPilot` snow-profile client.
//!
//! Reports may link to a `SnowPilot` pit page. That page in turn links to an
//! XML rendition of the pit whose root element carries the slope geometry:
//!
//! ```xml
//! <Pit_Observation aspect="135" incline="38" lat="40.61" longitude="-111.65">
//!   <Location elv="9400" />
//! </Pit_Observation>
//! ```
//!
//! Only those five values are read. Everything else in the document is
//! ignored.

use std::sync::LazyLock;

use backcountry_report_models::Aspect;
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::SecondarySourceError;
use crate::compass::to_compass;
use crate::fetch::Fetch;
use crate::fields::element_text;

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").unwrap_or_else(|_| unreachable!()));

/// Slope geometry read from a `SnowPilot` XML profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnowProfile {
    /// Slope aspect, converted from the recorded bearing.
    pub aspect: Option<Aspect>,
    /// Elevation exactly as recorded (feet).
    pub elevation: Option<String>,
    /// Slope incline exactly as recorded (degrees).
    pub slope_angle: Option<String>,
    /// Latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PitXml {
    #[serde(rename = "@aspect")]
    aspect: Option<String>,
    #[serde(rename = "@incline")]
    incline: Option<String>,
    #[serde(rename = "@lat")]
    lat: Option<String>,
    #[serde(rename = "@longitude")]
    longitude: Option<String>,
    #[serde(rename = "Location")]
    location: Option<LocationXml>,
}

#[derive(Debug, Deserialize)]
struct LocationXml {
    #[serde(rename = "@elv")]
    elv: Option<String>,
}

/// Loads snow profiles through a [`Fetch`] implementation.
pub struct SnowPilotClient<'a, F: Fetch> {
    fetcher: &'a F,
}

impl<'a, F: Fetch> SnowPilotClient<'a, F> {
    #[must_use]
    pub const fn new(fetcher: &'a F) -> Self {
        Self { fetcher }
    }

    /// Loads the profile behind the `SnowPilot` page at `page_url`.
    ///
    /// Returns `Ok(None)` when the page has no XML link, which is common and
    /// not a failure.
    ///
    /// # Errors
    ///
    /// Returns [`SecondarySourceError`] naming the failing URL if the page or
    /// the XML document cannot be fetched, or if the XML is malformed.
    pub async fn load(&self, page_url: &str) -> Result<Option<SnowProfile>, SecondarySourceError> {
        log::info!("Fetching SnowPilot page: {page_url}");
        let page = self
            .fetcher
            .fetch_text(page_url)
            .await
            .map_err(|e| SecondarySourceError::new(page_url, e.to_string()))?;

        let Some(xml_url) = find_xml_link(&page, page_url)? else {
            log::warn!("SnowPilot XML link not found on {page_url}");
            return Ok(None);
        };

        log::info!("Downloading SnowPilot XML: {xml_url}");
        let xml = self
            .fetcher
            .fetch_text(&xml_url)
            .await
            .map_err(|e| SecondarySourceError::new(&xml_url, e.to_string()))?;

        parse_profile_xml(&xml, &xml_url).map(Some)
    }
}

/// Finds the first anchor whose text mentions "xml" and resolves its target
/// against `page_url`.
///
/// # Errors
///
/// Returns [`SecondarySourceError`] if `page_url` or the link target is not a
/// valid URL.
pub fn find_xml_link(page: &str, page_url: &str) -> Result<Option<String>, SecondarySourceError> {
    let html = Html::parse_document(page);
    let Some(href) = html
        .select(&ANCHOR_SEL)
        .find(|a| element_text(*a).to_lowercase().contains("xml"))
        .and_then(|a| a.value().attr("href"))
    else {
        return Ok(None);
    };

    let base = url::Url::parse(page_url)
        .map_err(|e| SecondarySourceError::new(page_url, format!("invalid page URL: {e}")))?;
    let resolved = base
        .join(href)
        .map_err(|e| SecondarySourceError::new(page_url, format!("invalid XML link {href}: {e}")))?;

    Ok(Some(resolved.into()))
}

/// Parses a `SnowPilot` XML document fetched from `url`.
///
/// Missing or empty attributes become `None`. Coordinates that are present
/// but not numbers are also dropped.
///
/// # Errors
///
/// Returns [`SecondarySourceError`] if the document is not well-formed XML.
pub fn parse_profile_xml(xml: &str, url: &str) -> Result<SnowProfile, SecondarySourceError> {
    let pit: PitXml = quick_xml::de::from_str(xml)
        .map_err(|e| SecondarySourceError::new(url, format!("malformed XML: {e}")))?;

    let coordinate = |name: &str, value: Option<String>| {
        let value = non_empty(value)?;
        value.parse::<f64>().map_or_else(
            |_| {
                log::debug!("Ignoring non-numeric {name} '{value}' in {url}");
                None
            },
            Some,
        )
    };

    Ok(SnowProfile {
        aspect: to_compass(pit.aspect.as_deref()),
        elevation: non_empty(pit.location.and_then(|l| l.elv)),
        slope_angle: non_empty(pit.incline),
        latitude: coordinate("lat", pit.lat),
        longitude: coordinate("longitude", pit.longitude),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MapFetcher;

    const PIT_PAGE_URL: &str = "https://snowpilot.org/snowpilot-node/41234";
    const PIT_XML_URL: &str = "https://snowpilot.org/snowpilot-xml/41234.xml";

    const PIT_PAGE: &str = r#"
        <html><body>
          <a href="/about">About</a>
          <a href="/snowpilot-xml/41234.xml">Download as XML</a>
        </body></html>
    "#;

    const PIT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <Pit_Observation aspect="135" incline="38" lat="40.6121" longitude="-111.6543" heightOfSnowpack="140">
          <User first="A" last="B" />
          <Location elv="9400" name="Days Fork" />
          <Layer depth="20" />
        </Pit_Observation>"#;

    #[test]
    fn parses_root_attributes_and_location() {
        let profile = parse_profile_xml(PIT_XML, PIT_XML_URL).unwrap();
        assert_eq!(
            profile,
            SnowProfile {
                aspect: Some(Aspect::SE),
                elevation: Some("9400".to_owned()),
                slope_angle: Some("38".to_owned()),
                latitude: Some(40.6121),
                longitude: Some(-111.6543),
            }
        );
    }

    #[test]
    fn missing_attributes_are_absent() {
        let profile = parse_profile_xml(r#"<Pit_Observation aspect="" />"#, PIT_XML_URL).unwrap();
        assert_eq!(profile, SnowProfile::default());
    }

    #[test]
    fn non_numeric_coordinates_are_dropped() {
        let profile = parse_profile_xml(
            r#"<Pit_Observation lat="n/a" longitude="-111.5"><Location elv="8000"/></Pit_Observation>"#,
            PIT_XML_URL,
        )
        .unwrap();
        assert_eq!(profile.latitude, None);
        assert_eq!(profile.longitude, Some(-111.5));
        assert_eq!(profile.elevation.as_deref(), Some("8000"));
    }

    #[test]
    fn malformed_xml_is_an_error_naming_the_url() {
        for xml in ["", r#"<Pit_Observation aspect="90""#] {
            let err = parse_profile_xml(xml, PIT_XML_URL).unwrap_err();
            assert_eq!(err.url, PIT_XML_URL);
        }
    }

    #[test]
    fn xml_link_is_matched_case_insensitively_and_resolved() {
        let link = find_xml_link(PIT_PAGE, PIT_PAGE_URL).unwrap();
        assert_eq!(link.as_deref(), Some(PIT_XML_URL));
    }

    #[test]
    fn page_without_xml_link_has_no_profile() {
        let link = find_xml_link("<a href='/pdf'>PDF</a>", PIT_PAGE_URL).unwrap();
        assert_eq!(link, None);
    }

    #[tokio::test]
    async fn load_follows_xml_link() {
        let fetcher = MapFetcher::new()
            .with_page(PIT_PAGE_URL, PIT_PAGE)
            .with_page(PIT_XML_URL, PIT_XML);

        let profile = SnowPilotClient::new(&fetcher)
            .load(PIT_PAGE_URL)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(profile.aspect, Some(Aspect::SE));
        assert_eq!(fetcher.requests(), vec![PIT_PAGE_URL, PIT_XML_URL]);
    }

    #[tokio::test]
    async fn load_reports_not_available_without_link() {
        let fetcher = MapFetcher::new().with_page(PIT_PAGE_URL, "<p>No pit data</p>");
        let profile = SnowPilotClient::new(&fetcher).load(PIT_PAGE_URL).await.unwrap();
        assert_eq!(profile, None);
    }

    #[tokio::test]
    async fn load_surfaces_fetch_failures() {
        let fetcher = MapFetcher::new().with_page(PIT_PAGE_URL, PIT_PAGE);
        let err = SnowPilotClient::new(&fetcher)
            .load(PIT_PAGE_URL)
            .await
            .unwrap_err();
        assert_eq!(err.url, PIT_XML_URL);

        let err = SnowPilotClient::new(&MapFetcher::new())
            .load(PIT_PAGE_URL)
            .await
            .unwrap_err();
        assert_eq!(err.url, PIT_PAGE_URL);
    }
}
