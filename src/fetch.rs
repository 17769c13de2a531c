//! Fetch adapter: authenticate, pull a collection, snapshot it, parse records.

use crate::export::write_json;
use crate::range::FetchQuery;
use crate::whoop::{ClientError, WhoopClient};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Which Whoop collection to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Workouts,
    Cycles,
}

impl RecordKind {
    /// Plural noun used in status messages.
    pub fn noun(self) -> &'static str {
        match self {
            RecordKind::Workouts => "workouts",
            RecordKind::Cycles => "cycles",
        }
    }

    pub fn snapshot_file(self) -> &'static str {
        match self {
            RecordKind::Workouts => "workouts.json",
            RecordKind::Cycles => "cycles.json",
        }
    }
}

#[derive(Debug)]
pub enum FetchError {
    Client(ClientError),
    /// A returned record did not match the expected shape.
    Record { index: usize, source: serde_json::Error },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Client(e) => write!(f, "{e}"),
            FetchError::Record { index, source } => {
                write!(f, "Malformed response: record {index}: {source}")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Client(e) => Some(e),
            FetchError::Record { source, .. } => Some(source),
        }
    }
}

impl From<ClientError> for FetchError {
    fn from(e: ClientError) -> Self {
        FetchError::Client(e)
    }
}

/// Diagnostic sink that overwrites one JSON file per record kind on every
/// fetch. Nothing reads the files back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSink {
    dir: PathBuf,
}

impl SnapshotSink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(kind.snapshot_file())
    }

    pub fn write(&self, kind: RecordKind, records: &[Value]) -> std::io::Result<PathBuf> {
        let path = self.path_for(kind);
        write_json(records, &path)?;
        Ok(path)
    }
}

/// Result of a successful fetch.
#[derive(Debug)]
pub struct Fetched<R> {
    /// The collection as returned by the API.
    pub raw: Vec<Value>,
    pub records: Vec<R>,
    /// Where the snapshot landed, if it was written.
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FetchAdapter {
    client: WhoopClient,
    snapshot: Option<SnapshotSink>,
}

impl FetchAdapter {
    pub fn new(client: WhoopClient, snapshot: Option<SnapshotSink>) -> Self {
        Self { client, snapshot }
    }

    /// Log in and fetch every record of `kind` starting at `query.start`.
    pub fn fetch<R: DeserializeOwned>(
        &self,
        kind: RecordKind,
        query: &FetchQuery,
    ) -> Result<Fetched<R>, FetchError> {
        log::info!(
            "Fetching {} from {} to {}",
            kind.noun(),
            query.start,
            query.end.as_deref().unwrap_or("now")
        );
        let session = self.client.authenticate()?;
        let raw = match kind {
            RecordKind::Workouts => {
                self.client
                    .get_workout_collection(&session, &query.start, query.end.as_deref())?
            }
            RecordKind::Cycles => {
                self.client
                    .get_cycle_collection(&session, &query.start, query.end.as_deref())?
            }
        };

        let snapshot = self.snapshot.as_ref().and_then(|sink| {
            match sink.write(kind, &raw) {
                Ok(path) => Some(path),
                Err(e) => {
                    log::error!(
                        "Failed to write snapshot {}: {e}",
                        sink.path_for(kind).display()
                    );
                    None
                }
            }
        });

        let records = parse_records(&raw)?;
        log::info!("Fetched {} {}", raw.len(), kind.noun());
        Ok(Fetched {
            raw,
            records,
            snapshot,
        })
    }
}

fn parse_records<R: DeserializeOwned>(raw: &[Value]) -> Result<Vec<R>, FetchError> {
    raw.iter()
        .enumerate()
        .map(|(index, v)| {
            R::deserialize(v).map_err(|source| FetchError::Record { index, source })
        })
        .collect()
}

/// File name part of a snapshot path, for status messages.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whoop::Credentials;
    use crate::{CycleRecord, WorkoutRecord};
    use httpmock::prelude::*;
    use serde_json::json;

    fn adapter(server: &MockServer, snapshot: Option<SnapshotSink>) -> FetchAdapter {
        let creds = Credentials {
            username: "u".into(),
            password: "p".into(),
        };
        FetchAdapter::new(
            WhoopClient::with_urls(creds, &server.base_url(), &server.base_url()),
            snapshot,
        )
    }

    fn mock_login(server: &MockServer) {
        server.mock(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(200)
                .json_body(json!({"access_token": "tok", "user": {"id": 1}}));
        });
    }

    fn query() -> FetchQuery {
        FetchQuery {
            start: "2024-01-01 00:00:00.000000".into(),
            end: Some("2024-01-31 23:59:59.999999".into()),
        }
    }

    #[test]
    fn snapshot_holds_raw_records_verbatim() {
        let server = MockServer::start();
        mock_login(&server);
        let records = json!([
            {"start": "2024-01-01T10:00:00Z", "score": {"strain": 5.2}, "extra": "kept"},
            {"start": "2024-01-02T10:00:00Z", "score": null}
        ]);
        server.mock(|when, then| {
            when.method(GET).path("/v1/activity/workout");
            then.status(200)
                .json_body(json!({"records": records.clone(), "next_token": null}));
        });

        let dir = tempfile::tempdir().unwrap();
        let fetched: Fetched<WorkoutRecord> = adapter(&server, Some(SnapshotSink::new(dir.path())))
            .fetch(RecordKind::Workouts, &query())
            .unwrap();

        assert_eq!(fetched.records.len(), 2);
        let path = fetched.snapshot.unwrap();
        assert_eq!(path, dir.path().join("workouts.json"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'), "snapshot should be pretty printed");
        let on_disk: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(on_disk, records);
    }

    #[test]
    fn snapshot_is_overwritten() {
        let server = MockServer::start();
        mock_login(&server);
        server.mock(|when, then| {
            when.method(GET).path("/v1/cycle");
            then.status(200)
                .json_body(json!({"records": [{"id": 1}], "next_token": null}));
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycles.json");
        std::fs::write(&path, "[\"old\", \"old\", \"old\"]").unwrap();

        let fetched: Fetched<CycleRecord> = adapter(&server, Some(SnapshotSink::new(dir.path())))
            .fetch(RecordKind::Cycles, &query())
            .unwrap();
        assert_eq!(fetched.records.len(), 1);
        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!([{"id": 1}]));
    }

    #[test]
    fn unwritable_snapshot_does_not_fail_fetch() {
        let server = MockServer::start();
        mock_login(&server);
        server.mock(|when, then| {
            when.method(GET).path("/v1/activity/workout");
            then.status(200)
                .json_body(json!({"records": [], "next_token": null}));
        });

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does/not/exist");
        let fetched: Fetched<WorkoutRecord> = adapter(&server, Some(SnapshotSink::new(missing)))
            .fetch(RecordKind::Workouts, &query())
            .unwrap();
        assert!(fetched.snapshot.is_none());
        assert!(fetched.records.is_empty());
    }

    #[test]
    fn login_failure_skips_collection_and_snapshot() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(401).body("nope");
        });
        let collection = server.mock(|when, then| {
            when.method(GET).path("/v1/activity/workout");
            then.status(200).json_body(json!({"records": []}));
        });

        let dir = tempfile::tempdir().unwrap();
        let err = adapter(&server, Some(SnapshotSink::new(dir.path())))
            .fetch::<WorkoutRecord>(RecordKind::Workouts, &query())
            .unwrap_err();
        assert_eq!(err.to_string(), "Credentials rejected: nope");
        assert_eq!(collection.hits(), 0);
        assert!(!dir.path().join("workouts.json").exists());
    }

    #[test]
    fn mistyped_record_is_malformed_response() {
        let server = MockServer::start();
        mock_login(&server);
        server.mock(|when, then| {
            when.method(GET).path("/v1/activity/workout");
            then.status(200)
                .json_body(json!({"records": [{"score": {"strain": "high"}}], "next_token": null}));
        });

        let err = adapter(&server, None)
            .fetch::<WorkoutRecord>(RecordKind::Workouts, &query())
            .unwrap_err();
        assert!(matches!(err, FetchError::Record { index: 0, .. }));
        assert!(err.to_string().starts_with("Malformed response"));
    }

    #[test]
    fn float_heart_rates_load() {
        let server = MockServer::start();
        mock_login(&server);
        server.mock(|when, then| {
            when.method(GET).path("/v1/activity/workout");
            then.status(200).json_body(json!({
                "records": [
                    {"score": {"strain": 8.0, "average_heart_rate": 130.0, "max_heart_rate": 171}},
                    {"score": {"strain": 4.0, "average_heart_rate": 98}}
                ],
                "next_token": null
            }));
        });

        let fetched = adapter(&server, None)
            .fetch::<WorkoutRecord>(RecordKind::Workouts, &query())
            .unwrap();
        assert_eq!(fetched.records.len(), 2);
        let score = fetched.records[0].score.as_ref().unwrap();
        assert_eq!(score.average_heart_rate, Some(130.0));
        assert_eq!(score.max_heart_rate, Some(171.0));
    }

    #[test]
    fn record_kind_names() {
        assert_eq!(RecordKind::Workouts.snapshot_file(), "workouts.json");
        assert_eq!(RecordKind::Cycles.noun(), "cycles");
        assert_eq!(display_name(Path::new("/tmp/x/workouts.json")), "workouts.json");
    }
}
