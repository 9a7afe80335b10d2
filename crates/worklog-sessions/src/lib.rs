//! # Worklog Sessions
//!
//! SQLite-backed system of record for work sessions.
//!
//! ## Principles
//!
//! - **SQLite is the only durable store** - the session table is the system of record
//! - **Transitions are pure** - [`machine`] validates and computes, the store persists
//! - **Completion is conditional** - RUNNING → COMPLETED happens at most once per id,
//!   enforced by the store's guarded update, not by the caller
//! - **The change stream reflects committed reality** - change records commit in the
//!   same transaction as the mutation they describe
//!
//! ## Architecture
//!
//! ```text
//! WRITE:
//!   request → machine → SQLite (row + change record, one tx)
//!
//! FEED:
//!   change_stream → consumer (position committed after processing)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use worklog_sessions::{ChangeFeed, SqliteSessionStore, WorkLog, WorkStatus};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteSessionStore::in_memory().unwrap());
//! let worklog = WorkLog::new(store.clone());
//!
//! let session = worklog.start("Ada", "proc-7", Some("Packing")).unwrap();
//! assert_eq!(session.status, WorkStatus::Running);
//!
//! let done = worklog.stop(session.id.as_str()).unwrap();
//! assert_eq!(done.status, WorkStatus::Completed);
//!
//! // INSERT + MODIFY
//! assert_eq!(store.latest_sequence().unwrap(), 2);
//! ```

pub mod api;
pub mod clock;
mod error;
pub mod machine;
mod migrations;
mod sqlite;
pub mod store;
pub mod stream;
pub mod types;
mod worklog;

#[cfg(test)]
mod tests;

pub use api::{handle_get, handle_list, handle_start, handle_stop, ApiResponse};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorKind, SessionError, SessionResult};
pub use sqlite::SqliteSessionStore;
pub use store::{ChangeFeed, CompleteOutcome, SessionStore};
pub use stream::{AttributeValue, ChangeEnvelope, EventName, Image, StreamRecord};
pub use types::{
    format_timestamp, parse_timestamp, Completion, NewWorkSession, SessionId, WorkSession,
    WorkStatus,
};
pub use worklog::WorkLog;
