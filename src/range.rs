//! Mapping of UI range selections to concrete dates and API boundary strings.

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Format used for date input fields.
pub const DATE_INPUT_FORMAT: &str = "%Y-%m-%d";

/// Format of the boundary strings handed to the API client.
const BOUNDARY_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Relative time windows selectable without entering dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    Last7Days,
    Last14Days,
    Last30Days,
    Last3Months,
    Last6Months,
    AllTime,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::Last7Days,
        Preset::Last14Days,
        Preset::Last30Days,
        Preset::Last3Months,
        Preset::Last6Months,
        Preset::AllTime,
    ];

    /// Number of days subtracted from the evaluation date, `None` for `AllTime`.
    pub fn offset_days(self) -> Option<u64> {
        match self {
            Preset::Last7Days => Some(7),
            Preset::Last14Days => Some(14),
            Preset::Last30Days => Some(30),
            Preset::Last3Months => Some(90),
            Preset::Last6Months => Some(180),
            Preset::AllTime => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Preset::Last7Days => "Last 7 Days",
            Preset::Last14Days => "Last 14 Days",
            Preset::Last30Days => "Last 30 Days",
            Preset::Last3Months => "Last 3 Months",
            Preset::Last6Months => "Last 6 Months",
            Preset::AllTime => "All Time",
        }
    }
}

/// The user's calendar date. Every "today" in the app and the API client
/// comes from here so range ends and same-day filtering agree.
pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Start date used by [`Preset::AllTime`].
pub fn all_time_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// A range selection, decided by the UI before any fetch happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeSelection {
    /// One of the fixed relative windows.
    Preset(Preset),
    /// A single start date typed into the date field.
    Since(NaiveDate),
    /// An explicit start/end pair from the range picker, passed through as is.
    Custom { start: NaiveDate, end: NaiveDate },
}

/// Which iteration of the dashboard layout is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// Date text field with a fetch button.
    SingleDate,
    /// Sidebar with preset ranges and a custom range picker.
    PresetBar,
    /// Preset sidebar with only the strain chart.
    ChartOnly,
}

impl Layout {
    pub const ALL: [Layout; 3] = [Layout::SingleDate, Layout::PresetBar, Layout::ChartOnly];

    pub fn label(self) -> &'static str {
        match self {
            Layout::SingleDate => "Single date",
            Layout::PresetBar => "Preset ranges",
            Layout::ChartOnly => "Chart only",
        }
    }

    /// Selection applied before the user has triggered anything.
    pub fn default_selection(self) -> Option<RangeSelection> {
        match self {
            Layout::SingleDate => None,
            Layout::PresetBar | Layout::ChartOnly => Some(RangeSelection::Preset(Preset::Last7Days)),
        }
    }
}

/// Resolved calendar boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

/// Error returned when a date field does not hold a `YYYY-MM-DD` date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputError {
    pub input: String,
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid date '{}', expected YYYY-MM-DD", self.input)
    }
}

impl std::error::Error for InputError {}

/// Parse a date field strictly as `YYYY-MM-DD`.
pub fn parse_date_input(input: &str) -> Result<NaiveDate, InputError> {
    NaiveDate::parse_from_str(input, DATE_INPUT_FORMAT).map_err(|_| InputError {
        input: input.to_string(),
    })
}

/// Resolve a selection against the evaluation date `today`.
pub fn resolve(selection: &RangeSelection, today: NaiveDate) -> DateRange {
    match *selection {
        RangeSelection::Preset(preset) => {
            let start = match preset.offset_days() {
                Some(days) => today
                    .checked_sub_days(Days::new(days))
                    .unwrap_or(NaiveDate::MIN),
                None => all_time_start(),
            };
            DateRange { start, end: None }
        }
        RangeSelection::Since(start) => DateRange { start, end: None },
        RangeSelection::Custom { start, end } => DateRange {
            start,
            end: Some(end),
        },
    }
}

/// Boundary strings passed to the fetch adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchQuery {
    pub start: String,
    pub end: Option<String>,
}

fn start_of_day(date: NaiveDate) -> String {
    date.and_hms_micro_opt(0, 0, 0, 0)
        .map(|dt| dt.format(BOUNDARY_FORMAT).to_string())
        .unwrap_or_default()
}

fn end_of_day(date: NaiveDate) -> String {
    date.and_hms_micro_opt(23, 59, 59, 999_999)
        .map(|dt| dt.format(BOUNDARY_FORMAT).to_string())
        .unwrap_or_default()
}

/// Build the API boundary strings for a selection.
///
/// A single typed date is sent as the last instant of that day, presets and
/// custom starts as the first instant, and custom ends as the last instant.
pub fn fetch_query(selection: &RangeSelection, today: NaiveDate) -> FetchQuery {
    let range = resolve(selection, today);
    match selection {
        RangeSelection::Since(_) => FetchQuery {
            start: end_of_day(range.start),
            end: None,
        },
        RangeSelection::Preset(_) | RangeSelection::Custom { .. } => FetchQuery {
            start: start_of_day(range.start),
            end: range.end.map(end_of_day),
        },
    }
}
