//! Report normalization.
//!
//! Turns one fetched report page into a [`ScrapedReport`]. Page fields are
//! read through [`ReportPage`]; coordinates and slope geometry missing from
//! the page are filled from the linked `SnowPilot` profile, which is fetched
//! at most once per report and only when something is actually missing.
//!
//! Page values always win over profile values. A profile that fails to load
//! never fails the report.

use backcountry_report_models::{
    Aspect, AvalancheDetail, BaseReportInfo, ObservationDetail, Region, ReportDetail, ReportKind,
    ScrapeDate, ScrapedReport,
};
use chrono::NaiveDate;

use crate::compass::{first_number, parse_aspect};
use crate::fetch::Fetch;
use crate::fields::ReportPage;
use crate::provider::ProviderConfig;
use crate::snowpilot::{SnowPilotClient, SnowProfile};
use crate::{ScrapeError, SecondarySourceError};

/// Long-form date used by the "Avalanche Date" field, e.g.
/// `Wednesday, January 15, 2025`.
pub const AVALANCHE_DATE_FORMAT: &str = "%A, %B %d, %Y";

/// Separator between parent region and sub-region in the "Region" field.
const REGION_SEPARATOR: char = '»';

const LOCATION_LABEL: &str = "Location Name or Route";
const SNOWPILOT_LABEL: &str = "Snow Pilot URL";

/// Aspect, elevation and slope angle of the observed slope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFields {
    pub aspect: Option<Aspect>,
    pub elevation_ft: Option<String>,
    pub slope_angle: Option<f64>,
}

impl ProfileFields {
    /// Reads the three fields from the report page.
    #[must_use]
    pub fn from_page(page: &ReportPage) -> Self {
        Self {
            aspect: page.value_for("Aspect").as_deref().and_then(parse_aspect),
            elevation_ft: page.value_for("Elevation"),
            slope_angle: page
                .value_for("Slope Angle")
                .as_deref()
                .and_then(parse_slope_angle),
        }
    }

    /// Returns `true` if no field is missing.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.aspect.is_some() && self.elevation_ft.is_some() && self.slope_angle.is_some()
    }

    /// Fills the missing fields from `profile`, keeping every present one.
    #[must_use]
    pub fn fill_from(self, profile: &SnowProfile) -> Self {
        Self {
            aspect: self.aspect.or(profile.aspect),
            elevation_ft: self.elevation_ft.or_else(|| profile.elevation.clone()),
            slope_angle: self.slope_angle.or_else(|| {
                profile
                    .slope_angle
                    .as_deref()
                    .and_then(parse_slope_angle)
            }),
        }
    }
}

/// Parses a slope angle, treating "unknown" as absent.
///
/// Only the leading numeric token is kept, so `"38°"` is `38.0` and a range
/// such as `"35-40"` is `35.0`.
#[must_use]
pub fn parse_slope_angle(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("unknown") {
        return None;
    }
    first_number(text)
}

/// Splits a "Region" value into parent region and sub-region.
///
/// The first segment is the parent and the last is the sub-region, so a
/// value without a separator yields the same name twice.
#[must_use]
pub fn split_region(raw: &str) -> (String, String) {
    let parent = raw.split(REGION_SEPARATOR).next().unwrap_or(raw).trim();
    let sub_region = raw.rsplit(REGION_SEPARATOR).next().unwrap_or(raw).trim();
    (parent.to_owned(), sub_region.to_owned())
}

/// Parses the "Avalanche Date" field.
///
/// # Errors
///
/// Returns [`ScrapeError::DataExtraction`] for `avalanche_date` if the value
/// is missing or not in [`AVALANCHE_DATE_FORMAT`].
pub fn parse_avalanche_date(value: Option<&str>) -> Result<NaiveDate, ScrapeError> {
    let value = value
        .ok_or_else(|| ScrapeError::extraction("avalanche_date", "Avalanche Date label not found"))?;
    NaiveDate::parse_from_str(value.trim(), AVALANCHE_DATE_FORMAT).map_err(|e| {
        ScrapeError::extraction(
            "avalanche_date",
            format!("'{value}' does not match {AVALANCHE_DATE_FORMAT}: {e}"),
        )
    })
}

/// Derives the report id from the last non-empty path segment of its URL.
///
/// # Errors
///
/// Returns [`ScrapeError::DataExtraction`] for `report_id` if the URL has no
/// path segment to use.
pub fn report_id_from_url(report_url: &str) -> Result<String, ScrapeError> {
    let url = url::Url::parse(report_url)
        .map_err(|e| ScrapeError::extraction("report_id", format!("{report_url}: {e}")))?;
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_owned)
        .ok_or_else(|| {
            ScrapeError::extraction("report_id", format!("no path segment in {report_url}"))
        })
}

/// Page fields needed to build the base record, copied out of the parsed
/// document so it can be dropped before any secondary request.
struct BaseFields {
    location_name: String,
    region: Option<String>,
    map_point: Option<(f64, f64)>,
    profile: ProfileFields,
    snowpilot_url: Option<String>,
}

impl BaseFields {
    fn extract(page: &ReportPage) -> Result<Self, ScrapeError> {
        let location_name = page.value_for(LOCATION_LABEL).ok_or_else(|| {
            ScrapeError::extraction("location_name", format!("{LOCATION_LABEL} label not found"))
        })?;

        Ok(Self {
            location_name,
            region: page.value_for("Region"),
            map_point: page.map_point(),
            profile: ProfileFields::from_page(page),
            snowpilot_url: page.value_for(SNOWPILOT_LABEL),
        })
    }
}

/// Lazily loaded `SnowPilot` profile for one report.
struct SecondaryProfile<'a, F: Fetch> {
    client: SnowPilotClient<'a, F>,
    url: Option<String>,
    loaded: Option<Result<Option<SnowProfile>, SecondarySourceError>>,
}

impl<'a, F: Fetch> SecondaryProfile<'a, F> {
    const fn new(fetcher: &'a F, url: Option<String>) -> Self {
        Self {
            client: SnowPilotClient::new(fetcher),
            url,
            loaded: None,
        }
    }

    /// `Ok(None)` when the report has no profile; the error when loading it
    /// failed. The profile is fetched on first call only.
    async fn get(&mut self) -> Result<Option<&SnowProfile>, &SecondarySourceError> {
        let Some(url) = self.url.as_deref() else {
            log::debug!("No SnowPilot URL available");
            return Ok(None);
        };

        if self.loaded.is_none() {
            let result = self.client.load(url).await;
            if let Err(e) = &result {
                log::warn!("Error loading SnowPilot profile: {e}");
            }
            self.loaded = Some(result);
        }

        match &self.loaded {
            Some(Ok(profile)) => Ok(profile.as_ref()),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Builds [`ScrapedReport`]s from report pages for a single scrape date.
pub struct ReportNormalizer<'a, F: Fetch> {
    fetcher: &'a F,
    provider: &'a ProviderConfig,
    date: ScrapeDate,
}

impl<'a, F: Fetch> ReportNormalizer<'a, F> {
    #[must_use]
    pub const fn new(fetcher: &'a F, provider: &'a ProviderConfig, date: ScrapeDate) -> Self {
        Self {
            fetcher,
            provider,
            date,
        }
    }

    /// Normalizes a page of the given report type.
    ///
    /// # Errors
    ///
    /// See [`Self::normalize_observation`] and [`Self::normalize_avalanche`].
    pub async fn normalize(
        &self,
        kind: ReportKind,
        report_url: &str,
        body: &str,
    ) -> Result<ScrapedReport, ScrapeError> {
        match kind {
            ReportKind::Observation => self.normalize_observation(report_url, body).await,
            ReportKind::Avalanche => self.normalize_avalanche(report_url, body).await,
        }
    }

    /// Normalizes a field observation page.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::DataExtraction`] if the location name is
    /// missing or the report URL has no id segment.
    pub async fn normalize_observation(
        &self,
        report_url: &str,
        body: &str,
    ) -> Result<ScrapedReport, ScrapeError> {
        log::debug!("Normalizing observation: {report_url}");
        let report_id = report_id_from_url(report_url)?;

        let (fields, detail) = {
            let page = ReportPage::parse(body);
            let fields = BaseFields::extract(&page)?;
            let problem_1 = page.avalanche_problem(1);
            let problem_2 = page.avalanche_problem(2);
            let detail = ObservationDetail {
                report_id: report_id.clone(),
                red_flags: page.red_flags(),
                new_snow_depth: page.value_for("New Snow Depth"),
                new_snow_density: page.value_for("New Snow Density"),
                snow_surface_conditions: page.value_for("Snow Surface Conditions"),
                avy_problem_1: problem_1.problem,
                avy_problem_1_trend: problem_1.trend,
                avy_problem_2: problem_2.problem,
                avy_problem_2_trend: problem_2.trend,
                today_rating: page.value_for("Today's Observed Danger Rating"),
                tomorrow_rating: page.value_for("Tomorrows Estimated Danger Rating"),
            };
            (fields, detail)
        };

        let base = self
            .base_info(ReportKind::Observation, report_url, report_id, fields)
            .await;

        Ok(ScrapedReport {
            base,
            detail: ReportDetail::Observation(detail),
        })
    }

    /// Normalizes an avalanche incident page.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::DataExtraction`] if the location name or the
    /// avalanche date is missing or malformed, or if the report URL has no
    /// id segment.
    pub async fn normalize_avalanche(
        &self,
        report_url: &str,
        body: &str,
    ) -> Result<ScrapedReport, ScrapeError> {
        log::debug!("Normalizing avalanche report: {report_url}");
        let report_id = report_id_from_url(report_url)?;

        let (fields, detail) = {
            let page = ReportPage::parse(body);
            let fields = BaseFields::extract(&page)?;
            let detail = AvalancheDetail {
                report_id: report_id.clone(),
                avalanche_date: parse_avalanche_date(page.value_for("Avalanche Date").as_deref())?,
                trigger: page.value_for("Trigger"),
                trigger_additional: page.value_for("Trigger: additional info"),
                avalanche_type: page.value_for("Avalanche Type"),
                problem: page.value_for("Avalanche Problem"),
                weak_layer: page.value_for("Weak Layer"),
                depth: page.value_for("Depth"),
                width_feet: page.value_for("Width"),
                vertical_feet: page.value_for("Vertical"),
                caught: page.value_for("Caught"),
                carried: page.value_for("Carried"),
            };
            (fields, detail)
        };

        let base = self
            .base_info(ReportKind::Avalanche, report_url, report_id, fields)
            .await;

        Ok(ScrapedReport {
            base,
            detail: ReportDetail::Avalanche(detail),
        })
    }

    async fn base_info(
        &self,
        kind: ReportKind,
        report_url: &str,
        report_id: String,
        fields: BaseFields,
    ) -> BaseReportInfo {
        let mut secondary = SecondaryProfile::new(self.fetcher, fields.snowpilot_url);

        let (latitude, longitude) = resolve_coordinates(fields.map_point, &mut secondary).await;
        let profile = resolve_profile(fields.profile, &mut secondary).await;
        let (region_id, region_name, sub_region_name) = resolve_region(fields.region.as_deref());

        BaseReportInfo {
            report_id,
            kind,
            report_url: report_url.to_owned(),
            state_id: self.provider.state_id,
            state_name: self.provider.state_name.clone(),
            observation_date: self.date.date(),
            location_name: fields.location_name,
            region_id,
            region_name,
            sub_region_name,
            latitude,
            longitude,
            elevation_ft: profile.elevation_ft,
            aspect: profile.aspect,
            slope_angle: profile.slope_angle,
        }
    }
}

/// Returns `(latitude, longitude)` from the page map, else from the profile.
async fn resolve_coordinates<F: Fetch>(
    map_point: Option<(f64, f64)>,
    secondary: &mut SecondaryProfile<'_, F>,
) -> (Option<f64>, Option<f64>) {
    if let Some((longitude, latitude)) = map_point {
        log::debug!("Extracted coordinates from map: ({longitude}, {latitude})");
        return (Some(latitude), Some(longitude));
    }

    log::debug!("Coordinates not found in map, checking SnowPilot");
    match secondary.get().await {
        Ok(Some(profile)) => (profile.latitude, profile.longitude),
        Ok(None) | Err(_) => (None, None),
    }
}

/// Fills page profile fields from the secondary profile when any is missing.
///
/// A profile that fails to load leaves all three fields absent.
async fn resolve_profile<F: Fetch>(
    page: ProfileFields,
    secondary: &mut SecondaryProfile<'_, F>,
) -> ProfileFields {
    if page.is_complete() {
        return page;
    }

    log::debug!("Some snow profile data missing, checking SnowPilot");
    match secondary.get().await {
        Ok(Some(profile)) => page.fill_from(profile),
        Ok(None) => page,
        Err(_) => ProfileFields::default(),
    }
}

/// Returns `(region_id, region_name, sub_region_name)`.
fn resolve_region(raw: Option<&str>) -> (Option<u8>, Option<String>, Option<String>) {
    let Some(raw) = raw else {
        log::warn!("Region label not found");
        return (None, None, None);
    };

    let (parent, sub_region) = split_region(raw);
    log::debug!("Extracted region: {parent} » {sub_region}");

    let region_id = match Region::from_name(&parent) {
        Ok(region) => Some(region.id()),
        Err(e) => {
            log::warn!("{e}");
            None
        }
    };

    (region_id, Some(parent), Some(sub_region))
}
