//! Transport-agnostic JSON request handlers.
//!
//! Each handler takes the raw request body (or path parameter) and returns
//! an [`ApiResponse`] carrying an HTTP-style status code and a JSON body.
//! Error bodies are `{"error": "<message>"}`.

use crate::clock::Clock;
use crate::error::SessionError;
use crate::store::SessionStore;
use crate::types::WorkStatus;
use crate::worklog::WorkLog;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

pub const MISSING_REQUIRED_FIELDS: &str = "Missing required fields";
pub const MISSING_ID: &str = "Missing ID";
pub const NOT_FOUND: &str = "Work log not found";
pub const ALREADY_COMPLETED: &str = "Work already completed";
pub const UNAVAILABLE: &str = "Service temporarily unavailable";

/// Structured response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(status_code: u16, body: impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status_code, body },
            Err(e) => Self::error(500, &e.to_string()),
        }
    }

    fn error(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: json!({ "error": message }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The `error` message of an error response.
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

#[derive(Debug, Default, Deserialize)]
struct StartWorkRequest {
    person_name: Option<String>,
    process_id: Option<String>,
    process_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StopWorkRequest {
    id: Option<String>,
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, ApiResponse> {
    serde_json::from_str(body).map_err(|e| ApiResponse::error(400, &format!("Invalid JSON body: {e}")))
}

fn error_response(err: SessionError) -> ApiResponse {
    match err {
        SessionError::Validation(message) => ApiResponse::error(400, &message),
        SessionError::NotFound(_) => ApiResponse::error(404, NOT_FOUND),
        SessionError::Conflict(_) => ApiResponse::error(409, ALREADY_COMPLETED),
        SessionError::TransientStore(message) => {
            error!(error = %message, "Session store unavailable");
            ApiResponse::error(503, UNAVAILABLE)
        }
        other => {
            error!(error = %other, "Request failed");
            ApiResponse::error(500, &other.to_string())
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// `POST /work/start` → 201 with the new session.
pub fn handle_start<S: SessionStore, C: Clock>(worklog: &WorkLog<S, C>, body: &str) -> ApiResponse {
    let request: StartWorkRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if is_blank(&request.person_name) || is_blank(&request.process_id) {
        return ApiResponse::error(400, MISSING_REQUIRED_FIELDS);
    }

    match worklog.start(
        request.person_name.as_deref().unwrap_or_default(),
        request.process_id.as_deref().unwrap_or_default(),
        request.process_name.as_deref(),
    ) {
        Ok(session) => ApiResponse::ok(201, session),
        Err(SessionError::Validation(_)) => ApiResponse::error(400, MISSING_REQUIRED_FIELDS),
        Err(e) => error_response(e),
    }
}

/// `POST /work/stop` → 200 with the completed session.
pub fn handle_stop<S: SessionStore, C: Clock>(worklog: &WorkLog<S, C>, body: &str) -> ApiResponse {
    let request: StopWorkRequest = match parse_body(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if is_blank(&request.id) {
        return ApiResponse::error(400, MISSING_ID);
    }

    match worklog.stop(request.id.as_deref().unwrap_or_default()) {
        Ok(session) => ApiResponse::ok(200, session),
        Err(SessionError::Validation(_)) => ApiResponse::error(400, MISSING_ID),
        Err(e) => error_response(e),
    }
}

/// `GET /work/{id}`.
pub fn handle_get<S: SessionStore, C: Clock>(worklog: &WorkLog<S, C>, id: &str) -> ApiResponse {
    if id.trim().is_empty() {
        return ApiResponse::error(400, MISSING_ID);
    }
    match worklog.get(id) {
        Ok(session) => ApiResponse::ok(200, session),
        Err(e) => error_response(e),
    }
}

/// `GET /work?status=running|completed`.
pub fn handle_list<S: SessionStore, C: Clock>(
    worklog: &WorkLog<S, C>,
    status: Option<&str>,
) -> ApiResponse {
    let filter = match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match WorkStatus::parse(&raw.to_ascii_uppercase()) {
            Some(status) => Some(status),
            None => return ApiResponse::error(400, &format!("Invalid status filter: {raw}")),
        },
    };

    match worklog.list(filter) {
        Ok(sessions) => ApiResponse::ok(200, sessions),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::SessionResult;
    use crate::sqlite::SqliteSessionStore;
    use crate::store::CompleteOutcome;
    use crate::types::{Completion, SessionId, WorkSession};
    use chrono::{TimeZone, Utc};

    fn worklog() -> WorkLog<SqliteSessionStore, FixedClock> {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        WorkLog::with_clock(SqliteSessionStore::in_memory().unwrap(), clock)
    }

    #[test]
    fn start_returns_201_with_running_session() {
        let log = worklog();
        let response = handle_start(
            &log,
            r#"{"person_name": "Ada", "process_id": "p-1", "process_name": "Packing"}"#,
        );

        assert_eq!(response.status_code, 201);
        assert_eq!(response.body["status"], "RUNNING");
        assert_eq!(response.body["process_name"], "Packing");
        assert!(response.body["end_timestamp"].is_null());
        assert!(response.body["duration"].is_null());
    }

    #[test]
    fn start_missing_fields_is_400() {
        let log = worklog();
        for body in [r#"{"person_name": "Ada"}"#, r#"{"person_name": " ", "process_id": "p"}"#, "{}"] {
            let response = handle_start(&log, body);
            assert_eq!(response.status_code, 400, "body {body}");
            assert_eq!(response.error_message(), Some(MISSING_REQUIRED_FIELDS));
        }
    }

    #[test]
    fn malformed_json_is_400() {
        let log = worklog();
        let response = handle_start(&log, "{not json");
        assert_eq!(response.status_code, 400);
        assert!(response.error_message().unwrap().starts_with("Invalid JSON body"));
    }

    #[test]
    fn stop_lifecycle_status_codes() {
        let log = worklog();
        let started = handle_start(&log, r#"{"person_name": "Ada", "process_id": "p-1"}"#);
        let id = started.body["id"].as_str().unwrap().to_string();

        log.clock().advance(chrono::Duration::milliseconds(37_900));
        let stop_body = json!({ "id": id }).to_string();

        let stopped = handle_stop(&log, &stop_body);
        assert_eq!(stopped.status_code, 200);
        assert_eq!(stopped.body["status"], "COMPLETED");
        assert_eq!(stopped.body["duration"], 37);

        let again = handle_stop(&log, &stop_body);
        assert_eq!(again.status_code, 409);
        assert_eq!(again.error_message(), Some(ALREADY_COMPLETED));

        let missing = handle_stop(&log, r#"{"id": "does-not-exist"}"#);
        assert_eq!(missing.status_code, 404);
        assert_eq!(missing.error_message(), Some(NOT_FOUND));

        let no_id = handle_stop(&log, r#"{"person_name": "Ada"}"#);
        assert_eq!(no_id.status_code, 400);
        assert_eq!(no_id.error_message(), Some(MISSING_ID));
    }

    #[test]
    fn get_and_list() {
        let log = worklog();
        let started = handle_start(&log, r#"{"person_name": "Ada", "process_id": "p-1"}"#);
        let id = started.body["id"].as_str().unwrap();

        let fetched = handle_get(&log, id);
        assert_eq!(fetched.status_code, 200);
        assert_eq!(fetched.body, started.body);

        assert_eq!(handle_list(&log, None).body.as_array().unwrap().len(), 1);
        assert_eq!(
            handle_list(&log, Some("completed")).body.as_array().unwrap().len(),
            0
        );
        assert_eq!(handle_list(&log, Some("paused")).status_code, 400);
        assert_eq!(handle_get(&log, "nope").status_code, 404);
    }

    struct BusyStore;

    impl SessionStore for BusyStore {
        fn insert(&self, _session: &WorkSession) -> SessionResult<()> {
            Err(SessionError::TransientStore("database is locked".into()))
        }

        fn get(&self, _id: &SessionId) -> SessionResult<Option<WorkSession>> {
            Err(SessionError::TransientStore("database is locked".into()))
        }

        fn complete_if_running(
            &self,
            _id: &SessionId,
            _completion: Completion,
        ) -> SessionResult<CompleteOutcome> {
            Err(SessionError::TransientStore("database is locked".into()))
        }

        fn list(&self, _status: Option<WorkStatus>) -> SessionResult<Vec<WorkSession>> {
            Err(SessionError::Corrupt("bad row".into()))
        }
    }

    #[test]
    fn store_failures_map_to_503_and_500() {
        let log = WorkLog::new(BusyStore);

        let start = handle_start(&log, r#"{"person_name": "Ada", "process_id": "p-1"}"#);
        assert_eq!(start.status_code, 503);
        assert_eq!(start.error_message(), Some(UNAVAILABLE));

        let stop = handle_stop(&log, r#"{"id": "x"}"#);
        assert_eq!(stop.status_code, 503);

        assert_eq!(handle_list(&log, None).status_code, 500);
    }
}
