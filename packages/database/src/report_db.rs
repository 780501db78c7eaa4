//! `DuckDB`-backed report store.
//!
//! The database file (by default `data/reports.duckdb`) holds three tables
//! keyed on `report_id`:
//!
//! * `reports`: the base record of every report
//! * `observations`: observation detail rows
//! * `avalanches`: avalanche detail rows
//!
//! Inserts use `ON CONFLICT (report_id) DO NOTHING`, and the base row and its
//! detail row are written in one transaction.

use std::path::Path;

use backcountry_report_models::{
    Aspect, AvalancheDetail, BaseReportInfo, ObservationDetail, ReportDetail, ReportKind,
    ScrapedReport,
};
use chrono::NaiveDate;
use duckdb::{Connection, Transaction, params};
use geo::{Distance, Haversine, Point};

use crate::{DbError, InsertOutcome, ReportSink};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_REPORT: &str = "SELECT report_id, kind, report_url, CAST(observation_date AS VARCHAR),
        location_name, region_id, region_name, sub_region_name, latitude, longitude,
        elevation_ft, aspect, slope_angle
    FROM reports";

/// A stored base record, as returned by the read queries.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub report_id: String,
    pub kind: ReportKind,
    pub report_url: String,
    pub observation_date: NaiveDate,
    pub location_name: String,
    pub region_id: Option<u8>,
    pub region_name: Option<String>,
    pub sub_region_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation_ft: Option<String>,
    pub aspect: Option<Aspect>,
    pub slope_angle: Option<f64>,
}

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStatistics {
    pub total_reports: u64,
    pub observations: u64,
    pub avalanches: u64,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
}

/// Report sink backed by a `DuckDB` connection.
pub struct DuckDbSink {
    conn: Connection,
}

impl DuckDbSink {
    /// Opens (or creates) the report store at `path` and ensures the schema
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the data directory, the connection, or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        log::debug!("Opening report store at {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns the reports observed between `start` and `end` (inclusive),
    /// newest first. `end` defaults to `start`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row cannot be decoded.
    pub fn reports_by_date(
        &self,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<StoredReport>, DbError> {
        let end = end.unwrap_or(start);
        let sql = format!(
            "{SELECT_REPORT}
             WHERE observation_date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)
             ORDER BY observation_date DESC, report_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                ReportRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(ReportRow::into_stored).collect()
    }

    /// Returns the reports within `radius_km` of a point, nearest first,
    /// paired with their distance in kilometers. Reports without coordinates
    /// are never returned.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a row cannot be decoded.
    pub fn reports_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> Result<Vec<(StoredReport, f64)>, DbError> {
        let sql =
            format!("{SELECT_REPORT} WHERE latitude IS NOT NULL AND longitude IS NOT NULL");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], ReportRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let origin = Point::new(longitude, latitude);
        let mut nearby = Vec::new();
        for row in rows {
            let report = row.into_stored()?;
            let (Some(lat), Some(lon)) = (report.latitude, report.longitude) else {
                continue;
            };
            let distance = Haversine.distance(origin, Point::new(lon, lat)) / 1_000.0;
            if distance <= radius_km {
                nearby.push((report, distance));
            }
        }

        nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(nearby)
    }

    /// Returns counts by report type and the observed date range.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or a date cannot be decoded.
    pub fn statistics(&self) -> Result<ReportStatistics, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE kind = 'observation'),
                COUNT(*) FILTER (WHERE kind = 'avalanche'),
                CAST(MIN(observation_date) AS VARCHAR),
                CAST(MAX(observation_date) AS VARCHAR)
             FROM reports",
        )?;
        let (total, observations, avalanches, earliest, latest): (
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = stmt.query_row([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?;

        Ok(ReportStatistics {
            total_reports: to_count(total)?,
            observations: to_count(observations)?,
            avalanches: to_count(avalanches)?,
            earliest_date: earliest.as_deref().map(parse_date).transpose()?,
            latest_date: latest.as_deref().map(parse_date).transpose()?,
        })
    }
}

impl ReportSink for DuckDbSink {
    fn insert_report(&mut self, report: &ScrapedReport) -> Result<InsertOutcome, DbError> {
        let tx = self.conn.transaction()?;

        if insert_base(&tx, &report.base)? == 0 {
            tx.rollback()?;
            return Ok(InsertOutcome::Skipped);
        }

        match &report.detail {
            ReportDetail::Observation(detail) => insert_observation(&tx, detail)?,
            ReportDetail::Avalanche(detail) => insert_avalanche(&tx, detail)?,
        }

        tx.commit()?;
        log::debug!("Inserted {} report {}", report.kind(), report.report_id());
        Ok(InsertOutcome::Inserted)
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reports (
            report_id TEXT NOT NULL PRIMARY KEY,
            kind TEXT NOT NULL,
            report_url TEXT NOT NULL,
            state_id INTEGER NOT NULL,
            state_name TEXT NOT NULL,
            observation_date DATE NOT NULL,
            location_name TEXT NOT NULL,
            region_id SMALLINT,
            region_name TEXT,
            sub_region_name TEXT,
            latitude DOUBLE,
            longitude DOUBLE,
            elevation_ft TEXT,
            aspect TEXT,
            slope_angle DOUBLE,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS observations (
            report_id TEXT NOT NULL PRIMARY KEY,
            red_flags TEXT,
            new_snow_depth TEXT,
            new_snow_density TEXT,
            snow_surface_conditions TEXT,
            avy_problem_1 TEXT,
            avy_problem_1_trend TEXT,
            avy_problem_2 TEXT,
            avy_problem_2_trend TEXT,
            today_rating TEXT,
            tomorrow_rating TEXT
        );

        CREATE TABLE IF NOT EXISTS avalanches (
            report_id TEXT NOT NULL PRIMARY KEY,
            avalanche_date DATE NOT NULL,
            \"trigger\" TEXT,
            trigger_additional TEXT,
            avalanche_type TEXT,
            problem TEXT,
            weak_layer TEXT,
            depth TEXT,
            width_feet TEXT,
            vertical_feet TEXT,
            caught TEXT,
            carried TEXT
        );",
    )?;
    Ok(())
}

/// Returns the number of rows written (0 when the id already exists).
fn insert_base(tx: &Transaction<'_>, base: &BaseReportInfo) -> Result<usize, DbError> {
    Ok(tx.execute(
        "INSERT INTO reports (
            report_id, kind, report_url, state_id, state_name, observation_date,
            location_name, region_id, region_name, sub_region_name, latitude, longitude,
            elevation_ft, aspect, slope_angle
        ) VALUES (?, ?, ?, ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (report_id) DO NOTHING",
        params![
            base.report_id,
            base.kind.as_ref(),
            base.report_url,
            i32::from(base.state_id),
            base.state_name,
            base.observation_date.format(DATE_FORMAT).to_string(),
            base.location_name,
            base.region_id.map(i16::from),
            base.region_name.as_deref(),
            base.sub_region_name.as_deref(),
            base.latitude,
            base.longitude,
            base.elevation_ft.as_deref(),
            base.aspect.as_ref().map(AsRef::<str>::as_ref),
            base.slope_angle,
        ],
    )?)
}

fn insert_observation(tx: &Transaction<'_>, detail: &ObservationDetail) -> Result<(), DbError> {
    let red_flags = detail
        .red_flags
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    tx.execute(
        "INSERT INTO observations (
            report_id, red_flags, new_snow_depth, new_snow_density, snow_surface_conditions,
            avy_problem_1, avy_problem_1_trend, avy_problem_2, avy_problem_2_trend,
            today_rating, tomorrow_rating
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (report_id) DO NOTHING",
        params![
            detail.report_id,
            red_flags,
            detail.new_snow_depth.as_deref(),
            detail.new_snow_density.as_deref(),
            detail.snow_surface_conditions.as_deref(),
            detail.avy_problem_1.as_deref(),
            detail.avy_problem_1_trend.as_deref(),
            detail.avy_problem_2.as_deref(),
            detail.avy_problem_2_trend.as_deref(),
            detail.today_rating.as_deref(),
            detail.tomorrow_rating.as_deref(),
        ],
    )?;
    Ok(())
}

fn insert_avalanche(tx: &Transaction<'_>, detail: &AvalancheDetail) -> Result<(), DbError> {
    tx.execute(
        "INSERT INTO avalanches (
            report_id, avalanche_date, \"trigger\", trigger_additional, avalanche_type,
            problem, weak_layer, depth, width_feet, vertical_feet, caught, carried
        ) VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (report_id) DO NOTHING",
        params![
            detail.report_id,
            detail.avalanche_date.format(DATE_FORMAT).to_string(),
            detail.trigger.as_deref(),
            detail.trigger_additional.as_deref(),
            detail.avalanche_type.as_deref(),
            detail.problem.as_deref(),
            detail.weak_layer.as_deref(),
            detail.depth.as_deref(),
            detail.width_feet.as_deref(),
            detail.vertical_feet.as_deref(),
            detail.caught.as_deref(),
            detail.carried.as_deref(),
        ],
    )?;
    Ok(())
}

/// Raw `reports` row before conversion to model types.
struct ReportRow {
    report_id: String,
    kind: String,
    report_url: String,
    observation_date: String,
    location_name: String,
    region_id: Option<i16>,
    region_name: Option<String>,
    sub_region_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    elevation_ft: Option<String>,
    aspect: Option<String>,
    slope_angle: Option<f64>,
}

impl ReportRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            report_id: row.get(0)?,
            kind: row.get(1)?,
            report_url: row.get(2)?,
            observation_date: row.get(3)?,
            location_name: row.get(4)?,
            region_id: row.get(5)?,
            region_name: row.get(6)?,
            sub_region_name: row.get(7)?,
            latitude: row.get(8)?,
            longitude: row.get(9)?,
            elevation_ft: row.get(10)?,
            aspect: row.get(11)?,
            slope_angle: row.get(12)?,
        })
    }

    fn into_stored(self) -> Result<StoredReport, DbError> {
        let kind = self.kind.parse().map_err(|_| DbError::Conversion {
            message: format!("unknown report kind '{}' for {}", self.kind, self.report_id),
        })?;
        let region_id = self
            .region_id
            .map(u8::try_from)
            .transpose()
            .map_err(|e| DbError::Conversion {
                message: format!("region_id out of range for {}: {e}", self.report_id),
            })?;
        let aspect = self
            .aspect
            .as_deref()
            .map(|a| {
                Aspect::from_name(a).ok_or_else(|| DbError::Conversion {
                    message: format!("unknown aspect '{a}' for {}", self.report_id),
                })
            })
            .transpose()?;

        Ok(StoredReport {
            kind,
            observation_date: parse_date(&self.observation_date)?,
            region_id,
            aspect,
            report_id: self.report_id,
            report_url: self.report_url,
            location_name: self.location_name,
            region_name: self.region_name,
            sub_region_name: self.sub_region_name,
            latitude: self.latitude,
            longitude: self.longitude,
            elevation_ft: self.elevation_ft,
            slope_angle: self.slope_angle,
        })
    }
}

fn parse_date(text: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|e| DbError::Conversion {
        message: format!("invalid stored date '{text}': {e}"),
    })
}

fn to_count(value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|e| DbError::Conversion {
        message: format!("negative count {value}: {e}"),
    })
}
