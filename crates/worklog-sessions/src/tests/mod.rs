//! Scenario tests for the work-log service.
//!
//! - `lifecycle.rs`   - start/stop transitions, durations, error kinds
//! - `concurrency.rs` - racing completions on one id
//! - `change_stream.rs` - change records, ordering, consumer positions


use crate::clock::FixedClock;
use crate::sqlite::SqliteSessionStore;
use crate::worklog::WorkLog;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub(crate) fn fixed_worklog() -> (
    WorkLog<Arc<SqliteSessionStore>, FixedClock>,
    Arc<SqliteSessionStore>,
    FixedClock,
) {
    let store = Arc::new(SqliteSessionStore::in_memory().unwrap());
    let clock = FixedClock::new(t0());
    let worklog = WorkLog::with_clock(store.clone(), clock.clone());
    (worklog, store, clock)
}
