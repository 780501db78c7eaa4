//! Label/value extraction from report pages.
//!
//! Report pages render each field as a caption element followed by a sibling
//! holding its value:
//!
//! ```html
//! <div class="field-label">Aspect</div>
//! <div class="text_02 mb2">Southeast</div>
//! ```
//!
//! [`ReportPage`] wraps a parsed page and answers "what is the value for this
//! label?" without ever treating a missing label as an error. Labels are
//! matched on their exact trimmed text, so asking for `"Trigger"` never
//! returns the value of `"Trigger: additional info"`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Class carried by every caption element.
const LABEL_CLASS: &str = "field-label";

/// Class carried by value elements in multi-valued and grouped fields.
const VALUE_CLASS: &str = "text_02";

/// Marker identifying the inline script that initializes the page map.
const MAP_SCRIPT_MARKER: &str = "window.Backdrop";

static LABEL_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(&format!("div.{LABEL_CLASS}")).unwrap_or_else(|_| unreachable!())
});

static SCRIPT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").unwrap_or_else(|_| unreachable!()));

/// `POINT (lon lat)` inside the geofield formatter settings of the map
/// script.
static MAP_POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)geofield_formatter"\s*:\s*\{.*?"wkt"\s*:\s*"POINT \(([-\d.]+) ([-\d.]+)\)""#,
    )
    .unwrap_or_else(|_| unreachable!())
});

/// The "Problem" and "Trend" pair of one avalanche-problem fieldset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvalancheProblem {
    /// Problem type (e.g. "Persistent Weak Layer").
    pub problem: Option<String>,
    /// Trend (e.g. "Same", "Increasing Danger").
    pub trend: Option<String>,
}

/// A parsed report page.
pub struct ReportPage {
    html: Html,
}

impl ReportPage {
    /// Parses a report page from its HTML source.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    /// Returns the trimmed value of the field captioned `label`, or `None`
    /// if the label is missing or its value is empty.
    #[must_use]
    pub fn value_for(&self, label: &str) -> Option<String> {
        let Some(caption) = self.find_label(label) else {
            log::debug!("Field label not found: {label}");
            return None;
        };
        next_value(caption, None)
    }

    /// Returns every red flag listed on the page, in page order.
    ///
    /// Collects the value siblings that follow the "Red Flags" caption up to
    /// the next caption, blank ones included. A caption with no values yields
    /// `Some(vec![])`; a page without the caption yields `None`.
    #[must_use]
    pub fn red_flags(&self) -> Option<Vec<String>> {
        let caption = self.find_label("Red Flags")?;

        let mut flags = Vec::new();
        for sibling in caption.next_siblings().filter_map(ElementRef::wrap) {
            if has_class(sibling, LABEL_CLASS) {
                break;
            }
            if has_class(sibling, VALUE_CLASS) {
                flags.push(element_text(sibling));
            }
        }
        Some(flags)
    }

    /// Reads the problem type and trend of avalanche problem `index` (1 or
    /// 2) from its fieldset. A missing fieldset leaves both fields `None`.
    #[must_use]
    pub fn avalanche_problem(&self, index: u8) -> AvalancheProblem {
        let Ok(fieldset_sel) = Selector::parse(&format!("fieldset.group-avy-problem-{index}"))
        else {
            return AvalancheProblem::default();
        };
        let Some(fieldset) = self.html.select(&fieldset_sel).next() else {
            return AvalancheProblem::default();
        };

        let mut values: BTreeMap<String, Option<String>> = BTreeMap::new();
        for caption in fieldset.select(&LABEL_SEL) {
            values.insert(
                element_text(caption),
                next_value(caption, Some(VALUE_CLASS)),
            );
        }

        AvalancheProblem {
            problem: values.remove("Problem").flatten(),
            trend: values.remove("Trend").flatten(),
        }
    }

    /// Returns the `(longitude, latitude)` of the report pin from the map
    /// initialization script, if the page has one.
    #[must_use]
    pub fn map_point(&self) -> Option<(f64, f64)> {
        self.html
            .select(&SCRIPT_SEL)
            .map(|script| script.text().collect::<String>())
            .filter(|source| source.contains(MAP_SCRIPT_MARKER))
            .find_map(|source| {
                let caps = MAP_POINT_RE.captures(&source)?;
                let longitude = caps[1].parse().ok()?;
                let latitude = caps[2].parse().ok()?;
                Some((longitude, latitude))
            })
    }

    fn find_label(&self, label: &str) -> Option<ElementRef<'_>> {
        let wanted = label.trim();
        self.html
            .select(&LABEL_SEL)
            .find(|caption| element_text(*caption) == wanted)
    }
}

/// Returns the text content of an element with each text node trimmed and
/// empty nodes dropped.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

/// Text of the first following `<div>` sibling of `caption`, optionally
/// restricted to siblings carrying `class`.
fn next_value(caption: ElementRef<'_>, class: Option<&str>) -> Option<String> {
    caption
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "div" && class.is_none_or(|c| has_class(*el, c)))
        .map(element_text)
        .filter(|text| !text.is_empty())
}
