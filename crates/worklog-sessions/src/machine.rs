//! Session state machine.
//!
//! Pure transition logic: no I/O, no clock. Callers supply the current
//! record and the instant; persistence is the store's job.
//!
//! ```text
//! start ──▶ RUNNING ──stop──▶ COMPLETED ──stop──▶ Conflict
//! ```

use crate::error::{SessionError, SessionResult};
use crate::types::{Completion, NewWorkSession, SessionId, WorkSession, WorkStatus};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Validates start input. `person_name` and `process_id` must be non-empty
/// after trimming.
pub fn validate_start(
    person_name: &str,
    process_id: &str,
    process_name: Option<&str>,
) -> SessionResult<NewWorkSession> {
    let person_name = person_name.trim();
    let process_id = process_id.trim();

    if person_name.is_empty() || process_id.is_empty() {
        return Err(SessionError::Validation(
            "person_name and process_id are required".into(),
        ));
    }

    Ok(NewWorkSession {
        person_name: person_name.to_string(),
        process_id: process_id.to_string(),
        process_name: process_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
    })
}

/// Validates a stop target id.
pub fn validate_id(id: &str) -> SessionResult<SessionId> {
    let id = id.trim();
    if id.is_empty() {
        return Err(SessionError::Validation("id is required".into()));
    }
    Ok(SessionId::from(id))
}

/// Builds the RUNNING record for a validated start.
pub fn begin(input: NewWorkSession, id: SessionId, now: DateTime<Utc>) -> WorkSession {
    WorkSession {
        id,
        person_name: input.person_name,
        process_id: input.process_id,
        process_name: input.process_name,
        start_timestamp: now,
        end_timestamp: None,
        duration: None,
        status: WorkStatus::Running,
    }
}

/// Computes the completion for a RUNNING session.
///
/// Returns `Conflict` when the session is already completed.
pub fn complete(current: &WorkSession, now: DateTime<Utc>) -> SessionResult<Completion> {
    if current.status != WorkStatus::Running {
        return Err(SessionError::Conflict(current.id.clone()));
    }

    Ok(Completion {
        end_timestamp: now,
        duration: duration_seconds(&current.id, current.start_timestamp, now),
    })
}

/// Applies a completion to a RUNNING record.
pub fn apply(current: &WorkSession, completion: Completion) -> WorkSession {
    WorkSession {
        end_timestamp: Some(completion.end_timestamp),
        duration: Some(completion.duration),
        status: WorkStatus::Completed,
        ..current.clone()
    }
}

/// Whole seconds from `start` to `end`, truncated. Clock skew yields 0.
pub fn duration_seconds(id: &SessionId, start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let seconds = (end - start).num_seconds();
    if seconds < 0 {
        warn!(
            session_id = %id,
            start = %start,
            end = %end,
            "end precedes start, clamping duration to 0"
        );
        return 0;
    }
    seconds as u64
}
