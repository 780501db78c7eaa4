//! Bearing-to-compass conversion.

use std::sync::LazyLock;

use backcountry_report_models::Aspect;
use regex::Regex;

/// First unsigned decimal number in a string, e.g. `135` in `"135°"`.
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?|\.\d+").unwrap_or_else(|_| unreachable!()));

/// Returns the first numeric token in `text` as a float.
#[must_use]
pub fn first_number(text: &str) -> Option<f64> {
    NUMBER_RE.find(text)?.as_str().parse().ok()
}

/// Maps a bearing in degrees to the nearest 8-point compass direction.
///
/// Only the first numeric token of the input is used, so `"135°"` and
/// `"Bearing 135 deg"` both map to [`Aspect::SE`]. Returns `None` when the
/// input is absent or contains no number. Ties (22.5°, 67.5°, ...) round to
/// the even sector, and bearings of 337.5° and above wrap back to north.
#[must_use]
pub fn to_compass(bearing: Option<&str>) -> Option<Aspect> {
    let degrees = first_number(bearing?)?;
    let sector = (degrees / 45.0).round_ties_even();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = (sector as u64 % 8) as usize;
    Some(Aspect::from_index(index))
}

/// Normalizes a free-text aspect from a report page.
///
/// Numeric bearings go through [`to_compass`]; otherwise compass words such
/// as `"Northeast"` or `"NE"` are accepted.
#[must_use]
pub fn parse_aspect(text: &str) -> Option<Aspect> {
    to_compass(Some(text)).or_else(|| Aspect::from_name(text))
}
