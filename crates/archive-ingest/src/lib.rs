//! # Archive Ingest
//!
//! Loads archived work-session records into an analytical SQLite table.
//!
//! ## Principles
//!
//! - **The checkpoint decides what is new** - an object key is ingested once
//!   its batch commit exists, and never planned again
//! - **Bad records are kept, not dropped** - anything the schema rejects lands
//!   in `<table>_rescued` with its raw payload and reason
//! - **Columns only grow** - unknown top-level fields add nullable columns
//! - **Reset is journaled** - a marker file makes a half-finished reset resume
//!
//! ## Flow
//!
//! ```text
//! ArchiveStore.list ──▶ minus consumed ──▶ read + validate ──▶ offsets/<n>
//!                                                │
//!                                   Warehouse.merge_batch (one tx)
//!                                                │
//!                                           commits/<n>
//! ```

pub mod checkpoint;
pub mod engine;
mod error;
pub mod schema;
pub mod warehouse;

#[cfg(test)]
mod tests;

pub use checkpoint::{Checkpoint, CommitEntry, OffsetEntry};
pub use engine::{IngestConfig, IngestEngine, IngestReport};
pub use error::{IngestError, IngestResult};
pub use schema::{IngestRow, IngestSchema, RescueReason};
pub use warehouse::{MergeStats, RescuedRecord, Staged, Warehouse};
