//! Store contracts.
//!
//! [`SessionStore`] is the system of record for work sessions.
//! [`ChangeFeed`] exposes the committed mutations of that store in order.

use crate::error::SessionResult;
use crate::stream::ChangeEnvelope;
use crate::types::{Completion, SessionId, WorkSession, WorkStatus};
use std::sync::Arc;

/// Result of a conditional completion.
#[derive(Debug, Clone, PartialEq)]
pub enum CompleteOutcome {
    /// The row was RUNNING and is now COMPLETED. Holds the post-write row.
    Completed(WorkSession),
    /// No row with this id.
    NotFound,
    /// The row was already COMPLETED. Holds the unchanged row.
    AlreadyCompleted(WorkSession),
}

/// Durable key-value table of work sessions.
pub trait SessionStore: Send + Sync {
    /// Inserts a new session. Fails with `Conflict` when the id already exists.
    fn insert(&self, session: &WorkSession) -> SessionResult<()>;

    /// Point lookup.
    fn get(&self, id: &SessionId) -> SessionResult<Option<WorkSession>>;

    /// Sets end, duration and status only if the stored status is RUNNING.
    fn complete_if_running(
        &self,
        id: &SessionId,
        completion: Completion,
    ) -> SessionResult<CompleteOutcome>;

    /// Lists sessions ordered by start time, optionally filtered by status.
    fn list(&self, status: Option<WorkStatus>) -> SessionResult<Vec<WorkSession>>;
}

/// Ordered feed of committed row mutations with per-consumer positions.
pub trait ChangeFeed: Send + Sync {
    /// Events with a sequence number greater than `after_sequence`, oldest
    /// first, at most `limit` of them.
    fn read_changes(&self, after_sequence: i64, limit: usize)
        -> SessionResult<Vec<ChangeEnvelope>>;

    /// Highest sequence number written so far (0 when empty).
    fn latest_sequence(&self) -> SessionResult<i64>;

    /// Last committed position of `consumer` (0 when it never committed).
    fn consumer_position(&self, consumer: &str) -> SessionResult<i64>;

    /// Records `position` for `consumer`. Positions only move forward;
    /// returns false when the commit was a regression and was ignored.
    fn commit_consumer_position(&self, consumer: &str, position: i64) -> SessionResult<bool>;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn insert(&self, session: &WorkSession) -> SessionResult<()> {
        (**self).insert(session)
    }

    fn get(&self, id: &SessionId) -> SessionResult<Option<WorkSession>> {
        (**self).get(id)
    }

    fn complete_if_running(
        &self,
        id: &SessionId,
        completion: Completion,
    ) -> SessionResult<CompleteOutcome> {
        (**self).complete_if_running(id, completion)
    }

    fn list(&self, status: Option<WorkStatus>) -> SessionResult<Vec<WorkSession>> {
        (**self).list(status)
    }
}

impl<T: ChangeFeed + ?Sized> ChangeFeed for Arc<T> {
    fn read_changes(
        &self,
        after_sequence: i64,
        limit: usize,
    ) -> SessionResult<Vec<ChangeEnvelope>> {
        (**self).read_changes(after_sequence, limit)
    }

    fn latest_sequence(&self) -> SessionResult<i64> {
        (**self).latest_sequence()
    }

    fn consumer_position(&self, consumer: &str) -> SessionResult<i64> {
        (**self).consumer_position(consumer)
    }

    fn commit_consumer_position(&self, consumer: &str, position: i64) -> SessionResult<bool> {
        (**self).commit_consumer_position(consumer, position)
    }
}
