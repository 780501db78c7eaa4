//! One scrape run for a single calendar day.
//!
//! A session discovers the day's report links, then visits them strictly in
//! order with a fixed delay before each page request. Per-report extraction
//! failures skip that report; a failed page fetch ends the whole run.

use std::sync::Arc;
use std::time::Duration;

use backcountry_report_models::{ReportKind, ScrapeDate, ScrapedReport};

use crate::ScrapeError;
use crate::discovery::discover;
use crate::fetch::Fetch;
use crate::normalize::ReportNormalizer;
use crate::progress::{ProgressCallback, null_progress};
use crate::provider::ProviderConfig;

/// Where a [`ScrapeSession`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Discovering,
    Fetching,
    Classifying,
    Normalizing,
    Done,
}

/// A report that was fetched but could not be turned into a record.
#[derive(Debug)]
pub struct SkippedReport {
    /// Absolute URL of the report page.
    pub url: String,
    /// Why the report was skipped.
    pub error: ScrapeError,
}

/// Result of a completed session.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    /// Normalized reports in discovery order.
    pub reports: Vec<ScrapedReport>,
    /// Reports dropped because of per-report failures.
    pub skipped: Vec<SkippedReport>,
}

/// Determines the report type from the first path segment of `link`.
///
/// # Errors
///
/// Returns [`ScrapeError::InvalidData`] naming the segment if it is neither
/// `observation` nor `avalanche`.
pub fn classify(link: &str) -> Result<ReportKind, ScrapeError> {
    let path = url::Url::parse(link).map_or_else(|_| link.to_owned(), |url| url.path().to_owned());
    let segment = path.trim_start_matches('/').split('/').next().unwrap_or("");

    match segment {
        "observation" => Ok(ReportKind::Observation),
        "avalanche" => Ok(ReportKind::Avalanche),
        other => Err(ScrapeError::InvalidData {
            field: "report_type".to_owned(),
            value: other.to_owned(),
            reason: "Unsupported report type".to_owned(),
        }),
    }
}

/// Scrapes every report published on one date.
pub struct ScrapeSession<'a, F: Fetch> {
    fetcher: &'a F,
    provider: &'a ProviderConfig,
    date: ScrapeDate,
    delay: Duration,
    progress: Arc<dyn ProgressCallback>,
    state: SessionState,
}

impl<'a, F: Fetch> ScrapeSession<'a, F> {
    /// Creates a session using the provider's politeness delay.
    #[must_use]
    pub fn new(fetcher: &'a F, provider: &'a ProviderConfig, date: ScrapeDate) -> Self {
        Self {
            fetcher,
            provider,
            date,
            delay: Duration::from_millis(provider.request_delay_ms),
            progress: null_progress(),
            state: SessionState::Idle,
        }
    }

    /// Overrides the delay inserted before each report page request.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the progress receiver.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn date(&self) -> ScrapeDate {
        self.date
    }

    /// The date-scoped search URL this session discovers links from.
    #[must_use]
    pub fn search_url(&self) -> String {
        self.provider.search_url(self.date)
    }

    /// Runs the session to completion.
    ///
    /// # Errors
    ///
    /// * [`ScrapeError::Network`] if the search page or any report page
    ///   cannot be fetched
    /// * [`ScrapeError::Parsing`] if the search page has no results table
    pub async fn run(&mut self) -> Result<ScrapeOutcome, ScrapeError> {
        log::info!("Fetching reports for {}", self.date);

        self.state = SessionState::Discovering;
        let links = discover(self.fetcher, &self.search_url()).await?;
        log::info!("Found {} reports to process", links.len());

        self.progress.set_total(links.len() as u64);
        let normalizer = ReportNormalizer::new(self.fetcher, self.provider, self.date);
        let mut outcome = ScrapeOutcome::default();

        for link in &links {
            self.progress.set_message(link.clone());

            let report_url = match self.provider.report_url(link) {
                Ok(url) => String::from(url),
                Err(e) => {
                    log::warn!("Skipping report link {link}: {e}");
                    outcome.skipped.push(SkippedReport {
                        url: link.clone(),
                        error: e,
                    });
                    self.progress.inc(1);
                    continue;
                }
            };

            match self.process(&normalizer, link, &report_url).await {
                Ok(report) => outcome.reports.push(report),
                Err(e) if e.is_fatal() => {
                    log::error!("Failed to fetch {report_url}: {e}");
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("Skipping report {report_url}: {e}");
                    outcome.skipped.push(SkippedReport {
                        url: report_url,
                        error: e,
                    });
                }
            }
            self.progress.inc(1);
        }

        self.state = SessionState::Done;
        log::info!(
            "Successfully processed {} reports ({} skipped)",
            outcome.reports.len(),
            outcome.skipped.len()
        );
        self.progress.finish(format!(
            "Collected {} reports for {}",
            outcome.reports.len(),
            self.date
        ));

        Ok(outcome)
    }

    async fn process(
        &mut self,
        normalizer: &ReportNormalizer<'a, F>,
        link: &str,
        report_url: &str,
    ) -> Result<ScrapedReport, ScrapeError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.state = SessionState::Fetching;
        log::debug!("Processing report: {report_url}");
        let body = self.fetcher.fetch_text(report_url).await?;

        self.state = SessionState::Classifying;
        let kind = classify(link)?;

        self.state = SessionState::Normalizing;
        normalizer.normalize(kind, report_url, &body).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::provider::utah;
    use crate::testing::MapFetcher;

    const BASE: &str = "https://utahavalanchecenter.org";

    fn date() -> ScrapeDate {
        ScrapeDate::from_parts("15", "12", "2024").unwrap()
    }

    fn search_page(links: &[&str]) -> String {
        let rows: String = links
            .iter()
            .map(|l| format!(r#"<tr><td><a href="{l}">report</a></td></tr>"#))
            .collect();
        format!(r#"<div class="view-content"><table><tbody>{rows}</tbody></table></div>"#)
    }

    fn observation_page(location: &str) -> String {
        format!(
            r#"<div class="field-label">Location Name or Route</div><div class="text_02 mb2">{location}</div>
               <div class="field-label">Region</div><div class="text_02 mb2">Ogden » Ben Lomond</div>"#
        )
    }

    fn avalanche_page(location: &str) -> String {
        format!(
            r#"<div class="field-label">Location Name or Route</div><div class="text_02 mb2">{location}</div>
               <div class="field-label">Avalanche Date</div><div class="text_02 mb2">Saturday, December 14, 2024</div>"#
        )
    }

    fn session_fetcher(links: &[&str]) -> MapFetcher {
        MapFetcher::new().with_page(&utah().search_url(date()), &search_page(links))
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressCallback for RecordingProgress {
        fn set_total(&self, total: u64) {
            self.events.lock().unwrap().push(format!("total {total}"));
        }
        fn inc(&self, delta: u64) {
            self.events.lock().unwrap().push(format!("inc {delta}"));
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, _msg: String) {
            self.events.lock().unwrap().push("finish".to_owned());
        }
    }

    #[test]
    fn classifies_by_first_path_segment() {
        assert_eq!(classify("/avalanche/12345").unwrap(), ReportKind::Avalanche);
        assert_eq!(classify("/observation/67890").unwrap(), ReportKind::Observation);
        assert_eq!(
            classify("https://utahavalanchecenter.org/observation/1").unwrap(),
            ReportKind::Observation
        );
        let err = classify("/blog/xyz").unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::InvalidData { ref value, .. } if value == "blog"
        ));
    }

    #[tokio::test]
    async fn collects_reports_in_discovery_order() {
        let fetcher = session_fetcher(&["/observation/1", "/avalanche/2", "/observation/3"])
            .with_page(&format!("{BASE}/observation/1"), &observation_page("One"))
            .with_page(&format!("{BASE}/avalanche/2"), &avalanche_page("Two"))
            .with_page(&format!("{BASE}/observation/3"), &observation_page("Three"));
        let progress = Arc::new(RecordingProgress::default());

        let mut session = ScrapeSession::new(&fetcher, utah(), date())
            .with_delay(Duration::ZERO)
            .with_progress(progress.clone());
        assert_eq!(session.state(), SessionState::Idle);

        let outcome = session.run().await.unwrap();
        assert_eq!(session.state(), SessionState::Done);

        let ids: Vec<_> = outcome.reports.iter().map(ScrapedReport::report_id).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(outcome.reports[1].kind(), ReportKind::Avalanche);
        assert_eq!(outcome.reports[0].base.region_id, Some(2));
        assert!(outcome.skipped.is_empty());
        assert_eq!(
            *progress.events.lock().unwrap(),
            vec!["total 3", "inc 1", "inc 1", "inc 1", "finish"]
        );
    }

    #[tokio::test]
    async fn page_fetch_failure_aborts_session() {
        let fetcher = session_fetcher(&["/observation/1", "/observation/2", "/observation/3"])
            .with_page(&format!("{BASE}/observation/1"), &observation_page("One"))
            .with_page(&format!("{BASE}/observation/3"), &observation_page("Three"));

        let mut session =
            ScrapeSession::new(&fetcher, utah(), date()).with_delay(Duration::ZERO);
        let err = session.run().await.unwrap_err();

        assert!(matches!(
            err,
            ScrapeError::Network { ref url, .. } if url == &format!("{BASE}/observation/2")
        ));
        assert_eq!(session.state(), SessionState::Fetching);
        assert!(
            !fetcher
                .requests()
                .contains(&format!("{BASE}/observation/3"))
        );
    }

    #[tokio::test]
    async fn per_report_failures_are_skipped() {
        let fetcher = session_fetcher(&["/blog/xyz", "/observation/1", "/avalanche/2", "/observation/3"])
            .with_page(&format!("{BASE}/blog/xyz"), "<p>Blog</p>")
            .with_page(&format!("{BASE}/observation/1"), &observation_page("One"))
            .with_page(&format!("{BASE}/avalanche/2"), "<p>No fields</p>")
            .with_page(&format!("{BASE}/observation/3"), &observation_page("Three"));

        let outcome = ScrapeSession::new(&fetcher, utah(), date())
            .with_delay(Duration::ZERO)
            .run()
            .await
            .unwrap();

        let ids: Vec<_> = outcome.reports.iter().map(ScrapedReport::report_id).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(outcome.skipped.len(), 2);
        assert!(matches!(
            outcome.skipped[0].error,
            ScrapeError::InvalidData { ref value, .. } if value == "blog"
        ));
        assert!(matches!(
            outcome.skipped[1].error,
            ScrapeError::DataExtraction { ref field, .. } if field == "location_name"
        ));
    }

    #[tokio::test]
    async fn discovery_failure_aborts_before_any_report() {
        let fetcher = MapFetcher::new().with_page(&utah().search_url(date()), "<p>maintenance</p>");
        let mut session = ScrapeSession::new(&fetcher, utah(), date()).with_delay(Duration::ZERO);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Parsing { .. }));
        assert_eq!(session.state(), SessionState::Discovering);
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn empty_day_is_an_empty_outcome() {
        let fetcher = session_fetcher(&[]);
        let outcome = ScrapeSession::new(&fetcher, utah(), date())
            .run()
            .await
            .unwrap();
        assert!(outcome.reports.is_empty());
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_before_each_report_request() {
        let fetcher = session_fetcher(&["/observation/1", "/observation/2"])
            .with_page(&format!("{BASE}/observation/1"), &observation_page("One"))
            .with_page(&format!("{BASE}/observation/2"), &observation_page("Two"));

        let start = tokio::time::Instant::now();
        ScrapeSession::new(&fetcher, utah(), date())
            .run()
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(2 * utah().request_delay_ms));
    }
}
