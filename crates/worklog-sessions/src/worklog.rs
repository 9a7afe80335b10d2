//! The work-log service: start and stop over a store and a clock.

use crate::clock::{Clock, SystemClock};
use crate::error::{SessionError, SessionResult};
use crate::machine;
use crate::store::{CompleteOutcome, SessionStore};
use crate::types::{SessionId, WorkSession, WorkStatus};
use tracing::{info, warn};

/// Work-log service.
///
/// Owns the transition rules; the store only ever sees validated writes.
pub struct WorkLog<S: SessionStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
}

impl<S: SessionStore> WorkLog<S, SystemClock> {
    /// Creates a service on the wall clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: SessionStore, C: Clock> WorkLog<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Starts a new RUNNING session.
    pub fn start(
        &self,
        person_name: &str,
        process_id: &str,
        process_name: Option<&str>,
    ) -> SessionResult<WorkSession> {
        let input = machine::validate_start(person_name, process_id, process_name)?;
        let session = machine::begin(input, SessionId::new(), self.clock.now());

        self.store.insert(&session)?;

        info!(
            session_id = %session.id,
            person_name = %session.person_name,
            process_id = %session.process_id,
            "Work session started"
        );
        Ok(session)
    }

    /// Completes a RUNNING session and returns the stored post-write record.
    pub fn stop(&self, id: &str) -> SessionResult<WorkSession> {
        let id = machine::validate_id(id)?;

        let current = self
            .store
            .get(&id)?
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;
        let completion = machine::complete(&current, self.clock.now())?;

        match self.store.complete_if_running(&id, completion)? {
            CompleteOutcome::Completed(session) => {
                info!(
                    session_id = %session.id,
                    duration = session.duration.unwrap_or_default(),
                    "Work session completed"
                );
                Ok(session)
            }
            CompleteOutcome::AlreadyCompleted(_) => {
                warn!(session_id = %id, "Lost completion race, session already completed");
                Err(SessionError::Conflict(id))
            }
            CompleteOutcome::NotFound => Err(SessionError::NotFound(id)),
        }
    }

    /// Point lookup.
    pub fn get(&self, id: &str) -> SessionResult<WorkSession> {
        let id = machine::validate_id(id)?;
        self.store
            .get(&id)?
            .ok_or(SessionError::NotFound(id))
    }

    pub fn list(&self, status: Option<WorkStatus>) -> SessionResult<Vec<WorkSession>> {
        self.store.list(status)
    }
}
