//! Minimal client for the Whoop API: password login and collection endpoints.

use crate::range::local_today;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Value, json};

const AUTH_URL: &str = "https://api-7.whoop.com";
const API_URL: &str = "https://api.prod.whoop.com/developer";
const WORKOUT_PATH: &str = "/v1/activity/workout";
const CYCLE_PATH: &str = "/v1/cycle";
const PAGE_LIMIT: &str = "25";

/// Username/password pair used for the password grant.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub enum ClientError {
    CredentialsRejected(String),
    Unauthorized(String),
    Status(u16, String),
    InvalidDate(String),
    InvalidRange { start: String, end: String },
    MalformedResponse(String),
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::CredentialsRejected(body) => write!(f, "Credentials rejected: {body}"),
            ClientError::Unauthorized(body) => write!(f, "Unauthorized: {body}"),
            ClientError::Status(code, body) => write!(f, "HTTP {code}: {body}"),
            ClientError::InvalidDate(value) => write!(f, "Invalid date: {value}"),
            ClientError::InvalidRange { start, end } => {
                write!(f, "Start datetime greater than end datetime: {start} > {end}")
            }
            ClientError::MalformedResponse(msg) => write!(f, "Malformed response: {msg}"),
            ClientError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Transport(e) => Some(&**e),
            _ => None,
        }
    }
}

/// Authenticated session returned by [`WhoopClient::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user_id: Value,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    user: Option<TokenUser>,
}

#[derive(Deserialize)]
struct TokenUser {
    #[serde(default)]
    id: Value,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    records: Vec<Value>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WhoopClient {
    credentials: Credentials,
    auth_url: String,
    api_url: String,
}

impl WhoopClient {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_urls(credentials, AUTH_URL, API_URL)
    }

    /// Point the client at other hosts, used by tests against a mock server.
    pub fn with_urls(credentials: Credentials, auth_url: &str, api_url: &str) -> Self {
        Self {
            credentials,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn authenticate(&self) -> Result<Session, ClientError> {
        let url = format!("{}/oauth/token", self.auth_url);
        let response = ureq::post(&url)
            .set("Accept", "application/json")
            .send_json(json!({
                "grant_type": "password",
                "issueRefresh": false,
                "password": self.credentials.password,
                "username": self.credentials.username,
            }));
        let resp = match response {
            Ok(r) if r.status() == 200 => r,
            Ok(r) => {
                let body = r.into_string().unwrap_or_default();
                return Err(ClientError::CredentialsRejected(body));
            }
            Err(ureq::Error::Status(_, r)) => {
                let body = r.into_string().unwrap_or_default();
                return Err(ClientError::CredentialsRejected(body));
            }
            Err(e) => return Err(ClientError::Transport(Box::new(e))),
        };
        let token: TokenResponse = resp
            .into_json()
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        log::debug!("Authenticated against {}", self.auth_url);
        Ok(Session {
            access_token: token.access_token,
            user_id: token.user.map(|u| u.id).unwrap_or(Value::Null),
        })
    }

    pub fn get_workout_collection(
        &self,
        session: &Session,
        start: &str,
        end: Option<&str>,
    ) -> Result<Vec<Value>, ClientError> {
        self.get_collection(session, WORKOUT_PATH, start, end)
    }

    pub fn get_cycle_collection(
        &self,
        session: &Session,
        start: &str,
        end: Option<&str>,
    ) -> Result<Vec<Value>, ClientError> {
        self.get_collection(session, CYCLE_PATH, start, end)
    }

    fn get_collection(
        &self,
        session: &Session,
        path: &str,
        start: &str,
        end: Option<&str>,
    ) -> Result<Vec<Value>, ClientError> {
        let (start, end) = format_dates(start, end, local_today())?;
        let url = format!("{}{}", self.api_url, path);
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self.get_page(&url, session, &start, &end, next_token.as_deref())?;
            records.extend(page.records);
            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        log::debug!("Fetched {} records from {}", records.len(), path);
        Ok(records)
    }

    fn get_page(
        &self,
        url: &str,
        session: &Session,
        start: &str,
        end: &str,
        next_token: Option<&str>,
    ) -> Result<Page, ClientError> {
        let mut req = ureq::get(url)
            .query("start", start)
            .query("end", end)
            .query("limit", PAGE_LIMIT);
        if let Some(token) = next_token {
            req = req.query("nextToken", token);
        }
        let response = req
            .set("Authorization", &format!("Bearer {}", session.access_token))
            .set("Accept", "application/json")
            .call();
        let resp = match response {
            Ok(r) => r,
            Err(ureq::Error::Status(401, r)) => {
                let body = r.into_string().unwrap_or_default();
                return Err(ClientError::Unauthorized(body));
            }
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                return Err(ClientError::Status(code, body));
            }
            Err(e) => return Err(ClientError::Transport(Box::new(e))),
        };
        resp.into_json()
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))
    }
}

fn boundary_date(value: &str) -> Result<NaiveDate, ClientError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|_| ClientError::InvalidDate(value.to_string()))
}

/// Convert boundary strings into the API's `start`/`end` query values.
///
/// Only the date part of each boundary is kept: the start is widened to the
/// beginning of its day and the end to the last second of its day. A missing
/// end means the end of `today`.
fn format_dates(
    start: &str,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<(String, String), ClientError> {
    let start_dt = boundary_date(start)?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ClientError::InvalidDate(start.to_string()))?;
    let end_date = match end {
        Some(end) => boundary_date(end)?,
        None => today,
    };
    let end_dt = end_date
        .and_hms_opt(23, 59, 59)
        .ok_or_else(|| ClientError::InvalidDate(end.unwrap_or_default().to_string()))?;
    let start_s = start_dt.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let end_s = end_dt.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    if start_dt > end_dt {
        return Err(ClientError::InvalidRange {
            start: start_s,
            end: end_s,
        });
    }
    Ok((start_s, end_s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn creds() -> Credentials {
        Credentials {
            username: "rider@example.com".into(),
            password: "hunter2".into(),
        }
    }

    fn session() -> Session {
        Session {
            access_token: "tok".into(),
            user_id: json!(42),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn format_dates_widens_to_whole_days() {
        let (s, e) = format_dates(
            "2022-10-12 23:59:59.999999",
            Some("2022-10-20 00:00:00.000000"),
            today(),
        )
        .unwrap();
        assert_eq!(s, "2022-10-12T00:00:00Z");
        assert_eq!(e, "2022-10-20T23:59:59Z");
    }

    #[test]
    fn format_dates_defaults_end_to_end_of_today() {
        let (_, e) = format_dates("2024-05-01 00:00:00.000000", None, today()).unwrap();
        assert_eq!(e, "2024-06-01T23:59:59Z");
    }

    #[test]
    fn start_on_today_is_a_valid_range() {
        // Ahead of UTC the local date already reads 06-02 while UTC is on 06-01.
        let local = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let (s, e) = format_dates("2024-06-02 23:59:59.999999", None, local).unwrap();
        assert_eq!(s, "2024-06-02T00:00:00Z");
        assert_eq!(e, "2024-06-02T23:59:59Z");
    }

    #[test]
    fn format_dates_rejects_reversed_and_malformed() {
        let err = format_dates("2024-07-01 00:00:00.000000", None, today()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidRange { .. }));

        let err = format_dates("2022-13-40 00:00:00", None, today()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidDate(_)));
    }

    #[test]
    fn debug_hides_password() {
        let text = format!("{:?}", creds());
        assert!(text.contains("rider@example.com"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn authenticate_sends_password_grant() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/oauth/token").json_body(json!({
                "grant_type": "password",
                "issueRefresh": false,
                "password": "hunter2",
                "username": "rider@example.com",
            }));
            then.status(200)
                .json_body(json!({"access_token": "abc", "user": {"id": 42}}));
        });

        let client = WhoopClient::with_urls(creds(), &server.base_url(), &server.base_url());
        let session = client.authenticate().unwrap();
        assert_eq!(session.access_token, "abc");
        assert_eq!(session.user_id, json!(42));
        m.assert();
    }

    #[test]
    fn rejected_credentials_map_to_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(401).body("bad password");
        });

        let client = WhoopClient::with_urls(creds(), &server.base_url(), &server.base_url());
        match client.authenticate().unwrap_err() {
            ClientError::CredentialsRejected(body) => assert_eq!(body, "bad password"),
            e => panic!("unexpected error: {e:?}"),
        }
    }

    #[test]
    fn collection_follows_next_token() {
        let server = MockServer::start();
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/activity/workout")
                .query_param("nextToken", "page2");
            then.status(200)
                .json_body(json!({"records": [{"id": 3}], "next_token": null}));
        });
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/activity/workout")
                .query_param("start", "2024-01-01T00:00:00Z")
                .query_param("limit", "25")
                .header("Authorization", "Bearer tok");
            then.status(200)
                .json_body(json!({"records": [{"id": 1}, {"id": 2}], "next_token": "page2"}));
        });

        let client = WhoopClient::with_urls(creds(), &server.base_url(), &server.base_url());
        let records = client
            .get_workout_collection(
                &session(),
                "2024-01-01 00:00:00.000000",
                Some("2024-01-31 23:59:59.999999"),
            )
            .unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        first.assert();
        second.assert();
    }

    #[test]
    fn cycle_collection_uses_cycle_endpoint() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/v1/cycle");
            then.status(200)
                .json_body(json!({"records": [{"id": 9}], "next_token": ""}));
        });

        let client = WhoopClient::with_urls(creds(), &server.base_url(), &server.base_url());
        let records = client
            .get_cycle_collection(&session(), "2024-01-01 00:00:00.000000", Some("2024-01-02"))
            .unwrap();
        assert_eq!(records.len(), 1);
        m.assert();
    }

    #[test]
    fn maps_401_to_unauthorized() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/activity/workout");
            then.status(401).body("expired");
        });

        let client = WhoopClient::with_urls(creds(), &server.base_url(), &server.base_url());
        let err = client
            .get_workout_collection(&session(), "2024-01-01", Some("2024-01-02"))
            .unwrap_err();
        match err {
            ClientError::Unauthorized(body) => assert_eq!(body, "expired"),
            e => panic!("unexpected error: {e:?}"),
        }
    }

    #[test]
    fn maps_other_status_and_bad_json() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/cycle");
            then.status(500).body("boom");
        });
        server.mock(|when, then| {
            when.method(GET).path("/v1/activity/workout");
            then.status(200).body("not json");
        });

        let client = WhoopClient::with_urls(creds(), &server.base_url(), &server.base_url());
        let err = client
            .get_cycle_collection(&session(), "2024-01-01", Some("2024-01-02"))
            .unwrap_err();
        assert!(matches!(err, ClientError::Status(500, _)));
        assert_eq!(err.to_string(), "HTTP 500: boom");

        let err = client
            .get_workout_collection(&session(), "2024-01-01", Some("2024-01-02"))
            .unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)));
    }
}
