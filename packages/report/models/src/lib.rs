#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Normalized avalanche report records shared across the workspace.
//!
//! Every report scraped from the forecasting center is reduced to a
//! [`BaseReportInfo`] (location, region, geometry, snow profile) plus one
//! type-specific [`ReportDetail`]. The scraper produces these records and the
//! sink stores them keyed on [`BaseReportInfo::report_id`].

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};

/// An 8-point compass direction, ordered clockwise starting at north.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Aspect {
    /// 0°
    #[strum(to_string = "N", serialize = "North")]
    N,
    /// 45°
    #[strum(to_string = "NE", serialize = "Northeast")]
    NE,
    /// 90°
    #[strum(to_string = "E", serialize = "East")]
    E,
    /// 135°
    #[strum(to_string = "SE", serialize = "Southeast")]
    SE,
    /// 180°
    #[strum(to_string = "S", serialize = "South")]
    S,
    /// 225°
    #[strum(to_string = "SW", serialize = "Southwest")]
    SW,
    /// 270°
    #[strum(to_string = "W", serialize = "West")]
    W,
    /// 315°
    #[strum(to_string = "NW", serialize = "Northwest")]
    NW,
}

impl Aspect {
    /// All directions in clockwise order starting at north. The index of a
    /// direction in this table is its bearing divided by 45°.
    pub const ALL: [Self; 8] = [
        Self::N,
        Self::NE,
        Self::E,
        Self::SE,
        Self::S,
        Self::SW,
        Self::W,
        Self::NW,
    ];

    /// Returns the direction at `index` in [`Aspect::ALL`], wrapping around
    /// past north-west.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    /// Parses a compass word such as `"NE"`, `"north"` or `"South East"`.
    ///
    /// Spaces and hyphens are ignored and matching is case-insensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let compact: String = name
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        compact.parse().ok()
    }
}

/// The forecast regions published by the avalanche center, with their fixed
/// numeric identifiers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
pub enum Region {
    /// Logan area mountains
    Logan = 1,
    /// Ogden area mountains
    Ogden = 2,
    /// Uinta mountains
    Uintas = 3,
    /// Central Wasatch above Salt Lake City
    #[serde(rename = "Salt Lake")]
    #[strum(serialize = "Salt Lake")]
    SaltLake = 4,
    /// Provo area mountains
    Provo = 5,
    /// Wasatch Plateau
    Skyline = 6,
    /// La Sal mountains
    Moab = 7,
    /// Abajo mountains
    Abajos = 8,
    /// Southwest Utah
    Southwest = 9,
}

impl Region {
    /// Every known region, ordered by id.
    pub const ALL: [Self; 9] = [
        Self::Logan,
        Self::Ogden,
        Self::Uintas,
        Self::SaltLake,
        Self::Provo,
        Self::Skyline,
        Self::Moab,
        Self::Abajos,
        Self::Southwest,
    ];

    /// Returns the numeric identifier of this region.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Returns the region name as displayed on report pages.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Looks up a region by its exact (whitespace-trimmed) display name.
    ///
    /// # Errors
    ///
    /// Returns [`RegionNotFoundError`] if the name is not one of the known
    /// regions.
    pub fn from_name(name: &str) -> Result<Self, RegionNotFoundError> {
        let trimmed = name.trim();
        Self::ALL
            .into_iter()
            .find(|region| region.name() == trimmed)
            .ok_or_else(|| RegionNotFoundError {
                region: trimmed.to_owned(),
            })
    }
}

/// Error returned when a region name does not match any [`Region`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionNotFoundError {
    /// The unrecognized region name.
    pub region: String,
}

impl std::fmt::Display for RegionNotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let available: Vec<&str> = Region::ALL.iter().map(|r| r.name()).collect();
        write!(
            f,
            "Region '{}' not found. Available regions: {}",
            self.region,
            available.join(", ")
        )
    }
}

impl std::error::Error for RegionNotFoundError {}

/// The two report types published by the avalanche center. The string form
/// is the first path segment of a report URL.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportKind {
    /// A field observation (snowpack, red flags, danger ratings).
    Observation,
    /// An avalanche incident.
    Avalanche,
}

/// The single calendar day a scrape session covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScrapeDate(NaiveDate);

impl ScrapeDate {
    /// Wraps a calendar date.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Builds a date from a `(day, month, year)` triple of numeric strings,
    /// e.g. `("15", "12", "2024")`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDateError`] if any part is not numeric or the triple
    /// does not name a real calendar day.
    pub fn from_parts(day: &str, month: &str, year: &str) -> Result<Self, InvalidDateError> {
        let invalid = || InvalidDateError {
            input: format!("{day}/{month}/{year}"),
        };
        let d: u32 = day.trim().parse().map_err(|_| invalid())?;
        let m: u32 = month.trim().parse().map_err(|_| invalid())?;
        let y: i32 = year.trim().parse().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(y, m, d).map(Self).ok_or_else(invalid)
    }

    /// Returns the day before today in local time.
    #[must_use]
    pub fn yesterday() -> Self {
        let today = Local::now().date_naive();
        Self(today.pred_opt().unwrap_or(today))
    }

    /// Returns the wrapped calendar date.
    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }

    /// Two-digit, zero-padded day of month.
    #[must_use]
    pub fn day(self) -> String {
        self.0.format("%d").to_string()
    }

    /// Two-digit, zero-padded month.
    #[must_use]
    pub fn month(self) -> String {
        self.0.format("%m").to_string()
    }

    /// Four-digit year.
    #[must_use]
    pub fn year(self) -> String {
        self.0.format("%Y").to_string()
    }
}

impl std::fmt::Display for ScrapeDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Error returned when a `(day, month, year)` triple is not a valid date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDateError {
    /// The rejected input, formatted as `day/month/year`.
    pub input: String,
}

impl std::fmt::Display for InvalidDateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid scrape date {}: expected day/month/year", self.input)
    }
}

impl std::error::Error for InvalidDateError {}

/// Fields common to every report type.
///
/// `report_id` is the trailing path segment of the report URL and is the
/// natural key for idempotent storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseReportInfo {
    /// Stable identifier derived from the report URL.
    pub report_id: String,
    /// Which report type the page was classified as.
    pub kind: ReportKind,
    /// Absolute URL of the report page.
    pub report_url: String,
    /// Numeric state identifier of the provider.
    pub state_id: u16,
    /// State name of the provider (e.g. "Utah").
    pub state_name: String,
    /// The day the report was published under.
    pub observation_date: NaiveDate,
    /// Location name or route as written by the observer.
    pub location_name: String,
    /// Identifier of the parent region, `None` if the name is unrecognized.
    pub region_id: Option<u8>,
    /// Raw parent region name.
    pub region_name: Option<String>,
    /// Sub-region name (equal to the parent for single-level regions).
    pub sub_region_name: Option<String>,
    /// Latitude in decimal degrees (WGS84).
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees (WGS84).
    pub longitude: Option<f64>,
    /// Elevation in feet, as published.
    pub elevation_ft: Option<String>,
    /// Slope aspect.
    pub aspect: Option<Aspect>,
    /// Slope angle in degrees.
    pub slope_angle: Option<f64>,
}

/// Observation-specific fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationDetail {
    /// Same identifier as the owning [`BaseReportInfo`].
    pub report_id: String,
    /// Red flags in page order. `Some(vec![])` when the section is present
    /// but empty, `None` when the page has no red flag section.
    pub red_flags: Option<Vec<String>>,
    pub new_snow_depth: Option<String>,
    pub new_snow_density: Option<String>,
    pub snow_surface_conditions: Option<String>,
    pub avy_problem_1: Option<String>,
    pub avy_problem_1_trend: Option<String>,
    pub avy_problem_2: Option<String>,
    pub avy_problem_2_trend: Option<String>,
    /// Today's observed danger rating.
    pub today_rating: Option<String>,
    /// Tomorrow's estimated danger rating.
    pub tomorrow_rating: Option<String>,
}

/// Avalanche-incident-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvalancheDetail {
    /// Same identifier as the owning [`BaseReportInfo`].
    pub report_id: String,
    /// Day the avalanche occurred. Mandatory for an avalanche record.
    pub avalanche_date: NaiveDate,
    pub trigger: Option<String>,
    pub trigger_additional: Option<String>,
    pub avalanche_type: Option<String>,
    pub problem: Option<String>,
    pub weak_layer: Option<String>,
    pub depth: Option<String>,
    pub width_feet: Option<String>,
    pub vertical_feet: Option<String>,
    pub caught: Option<String>,
    pub carried: Option<String>,
}

/// The type-specific half of a scraped report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportDetail {
    /// Detail of a field observation.
    Observation(ObservationDetail),
    /// Detail of an avalanche incident.
    Avalanche(AvalancheDetail),
}

impl ReportDetail {
    /// Returns the report type of this detail record.
    #[must_use]
    pub const fn kind(&self) -> ReportKind {
        match self {
            Self::Observation(_) => ReportKind::Observation,
            Self::Avalanche(_) => ReportKind::Avalanche,
        }
    }
}

/// One fully normalized report: the base record plus its detail record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedReport {
    /// Fields shared by all report types.
    pub base: BaseReportInfo,
    /// Type-specific fields.
    pub detail: ReportDetail,
}

impl ScrapedReport {
    /// Returns the natural key of this report.
    #[must_use]
    pub fn report_id(&self) -> &str {
        &self.base.report_id
    }

    /// Returns the report type.
    #[must_use]
    pub const fn kind(&self) -> ReportKind {
        self.detail.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_wraps_past_north_west() {
        assert_eq!(Aspect::from_index(0), Aspect::N);
        assert_eq!(Aspect::from_index(7), Aspect::NW);
        assert_eq!(Aspect::from_index(8), Aspect::N);
        assert_eq!(Aspect::from_index(11), Aspect::SE);
    }

    #[test]
    fn aspect_parses_compass_words() {
        assert_eq!(Aspect::from_name("NE"), Some(Aspect::NE));
        assert_eq!(Aspect::from_name("north"), Some(Aspect::N));
        assert_eq!(Aspect::from_name("South East"), Some(Aspect::SE));
        assert_eq!(Aspect::from_name("North-West"), Some(Aspect::NW));
        assert_eq!(Aspect::from_name("steep"), None);
    }

    #[test]
    fn aspect_displays_short_label() {
        assert_eq!(Aspect::SW.to_string(), "SW");
        assert_eq!(Aspect::N.as_ref(), "N");
    }

    #[test]
    fn region_ids_are_fixed() {
        assert_eq!(Region::Logan.id(), 1);
        assert_eq!(Region::SaltLake.id(), 4);
        assert_eq!(Region::Southwest.id(), 9);
        let ids: Vec<u8> = Region::ALL.iter().map(|r| r.id()).collect();
        assert_eq!(ids, (1..=9).collect::<Vec<u8>>());
    }

    #[test]
    fn region_lookup_by_display_name() {
        assert_eq!(Region::from_name("Salt Lake"), Ok(Region::SaltLake));
        assert_eq!(Region::from_name(" Uintas "), Ok(Region::Uintas));
    }

    #[test]
    fn unknown_region_lists_available_names() {
        let err = Region::from_name("Wasatch Back").unwrap_err();
        assert_eq!(err.region, "Wasatch Back");
        let message = err.to_string();
        assert!(message.starts_with("Region 'Wasatch Back' not found"));
        assert!(message.contains("Salt Lake"));
        assert!(message.contains("Southwest"));
    }

    #[test]
    fn report_kind_round_trips_path_segment() {
        assert_eq!("observation".parse(), Ok(ReportKind::Observation));
        assert_eq!("avalanche".parse(), Ok(ReportKind::Avalanche));
        assert!("blog".parse::<ReportKind>().is_err());
        assert_eq!(ReportKind::Avalanche.to_string(), "avalanche");
    }

    #[test]
    fn scrape_date_pads_parts() {
        let date = ScrapeDate::from_parts("5", "1", "2026").unwrap();
        assert_eq!(date.day(), "05");
        assert_eq!(date.month(), "01");
        assert_eq!(date.year(), "2026");
        assert_eq!(date.to_string(), "2026-01-05");
    }

    #[test]
    fn scrape_date_rejects_impossible_day() {
        let err = ScrapeDate::from_parts("31", "02", "2024").unwrap_err();
        assert_eq!(err.input, "31/02/2024");
        assert!(ScrapeDate::from_parts("xx", "02", "2024").is_err());
    }

    #[test]
    fn yesterday_is_before_today() {
        assert!(ScrapeDate::yesterday().date() < Local::now().date_naive());
    }

    #[test]
    fn detail_serializes_with_kind_tag() {
        let detail = ReportDetail::Observation(ObservationDetail {
            report_id: "67890".to_owned(),
            red_flags: Some(vec!["Recent avalanches".to_owned()]),
            ..ObservationDetail::default()
        });
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "observation");
        assert_eq!(json["reportId"], "67890");
        assert_eq!(json["redFlags"][0], "Recent avalanches");
        assert_eq!(detail.kind(), ReportKind::Observation);
    }
}
