//! Flattening of nested Whoop records into table rows and a strain series.

use crate::{CycleRecord, ScoreState, WorkoutRecord};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// A scalar table value. `Null` marks a field missing from the source record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    fn text<T: ToString>(value: Option<T>) -> Cell {
        value.map_or(Cell::Null, |v| Cell::Text(v.to_string()))
    }

    fn int(value: Option<i64>) -> Cell {
        value.map_or(Cell::Null, Cell::Int)
    }

    fn float(value: Option<f64>) -> Cell {
        value.map_or(Cell::Null, Cell::Float)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One record lifted into a single level of labelled cells, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlatRow {
    cells: Vec<(&'static str, Cell)>,
}

impl FlatRow {
    fn push(&mut self, label: &'static str, cell: Cell) {
        self.cells.push((label, cell));
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.cells.iter().map(|(k, _)| *k)
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.cells.iter().map(|(_, v)| v)
    }

    pub fn get(&self, label: &str) -> Option<&Cell> {
        self.cells.iter().find(|(k, _)| *k == label).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }
}

impl Serialize for FlatRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Table column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: NaiveDateTime,
    pub strain: f64,
}

impl SeriesPoint {
    /// Fractional days since the Unix epoch, used as the chart x value.
    pub fn day_value(&self) -> f64 {
        self.timestamp.and_utc().timestamp() as f64 / 86_400.0
    }
}

/// Format a chart x value produced by [`SeriesPoint::day_value`].
pub fn day_label(value: f64) -> String {
    DateTime::from_timestamp((value * 86_400.0).round() as i64, 0)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| format!("{:.0}", value))
}

/// Everything the dashboard renders for one fetch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Flattened {
    pub rows: Vec<FlatRow>,
    pub columns: Vec<Column>,
    pub series: Vec<SeriesPoint>,
}

/// Records that can be shown as a table row and a strain point.
pub trait StrainRecord {
    fn start(&self) -> Option<&str>;
    /// Offset of the user's timezone when the record was made, e.g. `-05:00`.
    fn timezone_offset(&self) -> Option<&str>;
    fn strain(&self) -> Option<f64>;
    fn flat_row(&self) -> FlatRow;
}

impl StrainRecord for WorkoutRecord {
    fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    fn timezone_offset(&self) -> Option<&str> {
        self.timezone_offset.as_deref()
    }

    fn strain(&self) -> Option<f64> {
        self.score.as_ref().and_then(|s| s.strain)
    }

    fn flat_row(&self) -> FlatRow {
        let score = self.score.as_ref();
        let zones = score.and_then(|s| s.zone_duration.as_ref());
        let mut row = FlatRow::default();
        row.push("ID", Cell::text(self.id.as_ref()));
        row.push("User ID", Cell::text(self.user_id.as_ref()));
        row.push("Created At", Cell::text(self.created_at.as_ref()));
        row.push("Updated At", Cell::text(self.updated_at.as_ref()));
        row.push("Start", Cell::text(self.start.as_ref()));
        row.push("End", Cell::text(self.end.as_ref()));
        row.push("Timezone Offset", Cell::text(self.timezone_offset.as_ref()));
        row.push("Sport ID", Cell::int(self.sport_id));
        row.push("Score State", Cell::text(self.score_state.as_ref().map(ScoreState::as_str)));
        row.push("Strain", Cell::float(score.and_then(|s| s.strain)));
        row.push(
            "Average Heart Rate",
            Cell::float(score.and_then(|s| s.average_heart_rate)),
        );
        row.push("Max Heart Rate", Cell::float(score.and_then(|s| s.max_heart_rate)));
        row.push("Kilojoules", Cell::float(score.and_then(|s| s.kilojoule)));
        row.push(
            "Percent Recorded",
            Cell::float(score.and_then(|s| s.percent_recorded)),
        );
        row.push(
            "Distance (meters)",
            Cell::float(score.and_then(|s| s.distance_meter)),
        );
        row.push(
            "Altitude Gain (meters)",
            Cell::float(score.and_then(|s| s.altitude_gain_meter)),
        );
        row.push(
            "Altitude Change (meters)",
            Cell::float(score.and_then(|s| s.altitude_change_meter)),
        );
        row.push(
            "Zone Zero Duration (ms)",
            Cell::int(zones.and_then(|z| z.zone_zero_milli)),
        );
        row.push(
            "Zone One Duration (ms)",
            Cell::int(zones.and_then(|z| z.zone_one_milli)),
        );
        row.push(
            "Zone Two Duration (ms)",
            Cell::int(zones.and_then(|z| z.zone_two_milli)),
        );
        row.push(
            "Zone Three Duration (ms)",
            Cell::int(zones.and_then(|z| z.zone_three_milli)),
        );
        row.push(
            "Zone Four Duration (ms)",
            Cell::int(zones.and_then(|z| z.zone_four_milli)),
        );
        row.push(
            "Zone Five Duration (ms)",
            Cell::int(zones.and_then(|z| z.zone_five_milli)),
        );
        row
    }
}

impl StrainRecord for CycleRecord {
    fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    fn timezone_offset(&self) -> Option<&str> {
        self.timezone_offset.as_deref()
    }

    fn strain(&self) -> Option<f64> {
        self.score.as_ref().and_then(|s| s.strain)
    }

    fn flat_row(&self) -> FlatRow {
        let score = self.score.as_ref();
        let mut row = FlatRow::default();
        row.push("ID", Cell::text(self.id.as_ref()));
        row.push("User ID", Cell::text(self.user_id.as_ref()));
        row.push("Created At", Cell::text(self.created_at.as_ref()));
        row.push("Updated At", Cell::text(self.updated_at.as_ref()));
        row.push("Start", Cell::text(self.start.as_ref()));
        row.push("End", Cell::text(self.end.as_ref()));
        row.push("Timezone Offset", Cell::text(self.timezone_offset.as_ref()));
        row.push("Score State", Cell::text(self.score_state.as_ref().map(ScoreState::as_str)));
        row.push("Strain", Cell::float(score.and_then(|s| s.strain)));
        row.push("Kilojoules", Cell::float(score.and_then(|s| s.kilojoule)));
        row.push(
            "Average Heart Rate",
            Cell::float(score.and_then(|s| s.average_heart_rate)),
        );
        row.push("Max Heart Rate", Cell::float(score.and_then(|s| s.max_heart_rate)));
        row
    }
}

/// Parse an API timestamp into naive UTC.
///
/// RFC 3339 values (`Z` or an explicit offset) are converted to UTC; values
/// without an offset are taken as already being UTC.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Flatten records into rows, columns and the strain series.
///
/// Records without a strain value get a row but no series point.
pub fn flatten<R: StrainRecord>(records: &[R]) -> Flattened {
    let rows: Vec<FlatRow> = records.iter().map(StrainRecord::flat_row).collect();
    let columns = rows
        .first()
        .map(|row| {
            row.keys()
                .map(|k| Column {
                    name: k.to_string(),
                    id: k.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut series = Vec::new();
    for record in records {
        let Some(strain) = record.strain() else {
            continue;
        };
        match record.start().and_then(parse_timestamp) {
            Some(timestamp) => series.push(SeriesPoint { timestamp, strain }),
            None => log::warn!(
                "Skipping strain point with unparseable start: {:?}",
                record.start()
            ),
        }
    }

    Flattened {
        rows,
        columns,
        series,
    }
}

/// Calendar date the record started on, in the record's own timezone.
///
/// Falls back to the UTC date when the offset is missing or unreadable.
pub fn local_start_date<R: StrainRecord + ?Sized>(record: &R) -> Option<NaiveDate> {
    let utc = record.start().and_then(parse_timestamp)?;
    let offset = record
        .timezone_offset()
        .and_then(|o| o.parse::<FixedOffset>().ok());
    Some(match offset {
        Some(offset) => offset.from_utc_datetime(&utc).date_naive(),
        None => utc.date(),
    })
}

/// Drop records that started on `today` in their own timezone, since their
/// scores are still accumulating. Records with an unparseable start are kept.
pub fn drop_same_day<R: StrainRecord>(records: Vec<R>, today: NaiveDate) -> Vec<R> {
    records
        .into_iter()
        .filter(|r| local_start_date(r).map_or(true, |d| d != today))
        .collect()
}
