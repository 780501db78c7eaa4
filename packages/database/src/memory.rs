//! In-memory report sink.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use backcountry_report_models::ScrapedReport;

use crate::{DbError, InsertOutcome, ReportSink};

/// Keeps reports in a map keyed on `report_id`.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: BTreeMap<String, ScrapedReport>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, report_id: &str) -> Option<&ScrapedReport> {
        self.reports.get(report_id)
    }

    /// Stored reports ordered by `report_id`.
    pub fn reports(&self) -> impl Iterator<Item = &ScrapedReport> {
        self.reports.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl ReportSink for MemorySink {
    fn insert_report(&mut self, report: &ScrapedReport) -> Result<InsertOutcome, DbError> {
        match self.reports.entry(report.report_id().to_owned()) {
            Entry::Occupied(_) => Ok(InsertOutcome::Skipped),
            Entry::Vacant(slot) => {
                slot.insert(report.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use backcountry_report_models::{
        BaseReportInfo, ObservationDetail, ReportDetail, ReportKind,
    };
    use chrono::NaiveDate;

    use super::*;

    fn report(id: &str, location: &str) -> ScrapedReport {
        ScrapedReport {
            base: BaseReportInfo {
                report_id: id.to_owned(),
                kind: ReportKind::Observation,
                report_url: format!("https://utahavalanchecenter.org/observation/{id}"),
                state_id: 45,
                state_name: "Utah".to_owned(),
                observation_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
                location_name: location.to_owned(),
                region_id: None,
                region_name: None,
                sub_region_name: None,
                latitude: None,
                longitude: None,
                elevation_ft: None,
                aspect: None,
                slope_angle: None,
            },
            detail: ReportDetail::Observation(ObservationDetail {
                report_id: id.to_owned(),
                ..ObservationDetail::default()
            }),
        }
    }

    #[test]
    fn first_submission_wins() {
        let mut sink = MemorySink::new();
        assert_eq!(
            sink.insert_report(&report("1", "Days Fork")).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            sink.insert_report(&report("1", "Mill Creek")).unwrap(),
            InsertOutcome::Skipped
        );
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.get("1").unwrap().base.location_name, "Days Fork");
    }

    #[test]
    fn batch_summary_counts() {
        let mut sink = MemorySink::new();
        let summary = sink.insert_reports_batch(&[
            report("2", "A"),
            report("1", "B"),
            report("2", "C"),
        ]);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.to_string(), "2 inserted, 1 already stored, 0 failed");

        let ids: Vec<_> = sink.reports().map(ScrapedReport::report_id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
