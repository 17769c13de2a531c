//! The query cycle behind every user action: resolve, fetch, flatten.
//!
//! Every path returns a [`QueryOutcome`] the UI can render, so a bad date or
//! a failed request never leaves stale rows or a crashed window behind.

use crate::fetch::{FetchAdapter, FetchError, Fetched, RecordKind, display_name};
use crate::flatten::{Flattened, StrainRecord, drop_same_day, flatten};
use crate::range::{RangeSelection, fetch_query, parse_date_input};
use crate::{ConfigError, CycleRecord, WorkoutRecord};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;

pub const INVALID_DATE_MESSAGE: &str =
    "Invalid date format. Please enter a date in YYYY-MM-DD format.";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOutcome {
    pub message: String,
    pub view: Flattened,
}

impl QueryOutcome {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            view: Flattened::default(),
        }
    }

    fn fetch_error(kind: RecordKind, details: &dyn std::fmt::Display) -> Self {
        Self::message(format!("Error fetching {}: {details}", kind.noun()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub kind: RecordKind,
    /// Hide records that started today while their scores are still moving.
    pub exclude_today: bool,
}

pub struct Dashboard {
    source: Result<FetchAdapter, ConfigError>,
}

impl Dashboard {
    pub fn new(source: Result<FetchAdapter, ConfigError>) -> Self {
        Self { source }
    }

    /// Handle the single date field: validate, then fetch from that date.
    pub fn submit_date(&self, input: &str, options: QueryOptions, today: NaiveDate) -> QueryOutcome {
        match parse_date_input(input) {
            Ok(date) => self.run(Some(RangeSelection::Since(date)), options, today),
            Err(e) => {
                log::warn!("Rejected date input: {e}");
                QueryOutcome::message(INVALID_DATE_MESSAGE)
            }
        }
    }

    /// Run one fetch-flatten cycle. `None` means nothing was triggered yet.
    pub fn run(
        &self,
        selection: Option<RangeSelection>,
        options: QueryOptions,
        today: NaiveDate,
    ) -> QueryOutcome {
        let Some(selection) = selection else {
            return QueryOutcome::default();
        };
        let adapter = match &self.source {
            Ok(adapter) => adapter,
            Err(e) => return QueryOutcome::fetch_error(options.kind, e),
        };
        match options.kind {
            RecordKind::Workouts => {
                run_kind::<WorkoutRecord>(adapter, &selection, options, today)
            }
            RecordKind::Cycles => run_kind::<CycleRecord>(adapter, &selection, options, today),
        }
    }
}

fn run_kind<R: StrainRecord + DeserializeOwned>(
    adapter: &FetchAdapter,
    selection: &RangeSelection,
    options: QueryOptions,
    today: NaiveDate,
) -> QueryOutcome {
    let query = fetch_query(selection, today);
    let fetched: Result<Fetched<R>, FetchError> = adapter.fetch(options.kind, &query);
    let fetched = match fetched {
        Ok(f) => f,
        Err(e) => {
            log::error!("Fetch failed: {e}");
            return QueryOutcome::fetch_error(options.kind, &e);
        }
    };

    let count = fetched.raw.len();
    let records = if options.exclude_today {
        drop_same_day(fetched.records, today)
    } else {
        fetched.records
    };
    let message = match &fetched.snapshot {
        Some(path) => format!(
            "Found {count} {}. Data saved to {}",
            options.kind.noun(),
            display_name(path)
        ),
        None => format!("Found {count} {}.", options.kind.noun()),
    };
    QueryOutcome {
        message,
        view: flatten(&records),
    }
}
