//! # Session Capture
//!
//! Consumes the work-session change stream and writes one immutable JSON
//! object per completed session into the archive store.
//!
//! ```text
//! change_stream ──▶ StreamTrigger ──▶ CaptureProcessor ──▶ ArchiveStore
//!                   (position,         (decode, filter,     (does-not-exist
//!                    retry, policy)     enrich, key)         writes)
//! ```
//!
//! Delivery is at-least-once: a redelivered completion produces an
//! additional object under a fresh key, never an overwrite.

pub mod archive;
pub mod decode;
mod error;
pub mod processor;
pub mod record;
pub mod trigger;

pub use archive::{
    ArchiveError, ArchiveStore, FsArchiveStore, MemoryArchiveStore, ObjectMeta, WriteOutcome,
    WritePrecondition,
};
pub use error::{CaptureError, CaptureResult, DecodeError};
pub use processor::{CaptureProcessor, CaptureReport};
pub use record::{archive_key, format_ingested_at, ArchiveRecord, CaptureMetadata};
pub use trigger::{compute_backoff, StreamTrigger, TriggerConfig, CONSUMER_NAME};
