//! Capture processor: completion events in, archive objects out.

use crate::archive::{ArchiveStore, WriteOutcome, WritePrecondition};
use crate::decode::{decode_record, decode_session};
use crate::error::{CaptureError, CaptureResult, DecodeError};
use crate::record::{archive_key, ArchiveRecord};
use serde::Serialize;
use tracing::{debug, info};
use worklog_sessions::{ChangeEnvelope, Clock, EventName, WorkStatus};

/// Highest collision suffix tried before giving up on a capture.
const MAX_KEY_SUFFIX: u32 = 1000;

/// Outcome of processing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureReport {
    pub events_seen: usize,
    pub archived: usize,
    pub skipped: usize,
    /// Keys written, in event order.
    pub keys: Vec<String>,
}

impl CaptureReport {
    pub fn absorb(&mut self, other: CaptureReport) {
        self.events_seen += other.events_seen;
        self.archived += other.archived;
        self.skipped += other.skipped;
        self.keys.extend(other.keys);
    }
}

/// Turns completion events into archive records.
///
/// Acts only on `MODIFY` events whose new image is `COMPLETED`. Any decode
/// or write failure aborts the batch and is returned to the caller.
pub struct CaptureProcessor<A: ArchiveStore, C: Clock> {
    archive: A,
    clock: C,
}

impl<A: ArchiveStore, C: Clock> CaptureProcessor<A, C> {
    pub fn new(archive: A, clock: C) -> Self {
        Self { archive, clock }
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn process_batch(&self, batch: &[ChangeEnvelope]) -> CaptureResult<CaptureReport> {
        let mut report = CaptureReport::default();

        for envelope in batch {
            report.events_seen += 1;
            match self.process_event(envelope)? {
                Some(key) => {
                    report.archived += 1;
                    report.keys.push(key);
                }
                None => report.skipped += 1,
            }
        }

        Ok(report)
    }

    /// Returns the written key, or `None` when the event is not a completion.
    pub fn process_event(&self, envelope: &ChangeEnvelope) -> CaptureResult<Option<String>> {
        let sequence = envelope.sequence_number;
        let decode_err = |source| CaptureError::Decode { sequence, source };

        let record = decode_record(envelope).map_err(decode_err)?;
        if record.event_name != EventName::Modify {
            debug!(sequence, event = record.event_name.as_str(), "Ignoring non-MODIFY event");
            return Ok(None);
        }

        let image = record
            .new_image
            .as_ref()
            .ok_or(DecodeError::MissingImage)
            .map_err(decode_err)?;
        let session = decode_session(image).map_err(decode_err)?;
        if session.status != WorkStatus::Completed {
            debug!(sequence, session_id = %session.id, "Ignoring non-completion MODIFY");
            return Ok(None);
        }

        let captured_at = self.clock.now();
        let id = session.id.clone();
        let bytes = ArchiveRecord::new(session, captured_at).to_json_bytes()?;

        for attempt in 0..=MAX_KEY_SUFFIX {
            let key = archive_key(&captured_at, &id, attempt);
            match self
                .archive
                .put(&key, &bytes, WritePrecondition::DoesNotExist)?
            {
                WriteOutcome::Written => {
                    info!(sequence, session_id = %id, key = %key, "Archived completed session");
                    return Ok(Some(key));
                }
                WriteOutcome::PreconditionFailed => {
                    debug!(key = %key, "Archive key taken, trying next suffix");
                }
            }
        }

        Err(CaptureError::KeysExhausted(id.to_string()))
    }
}
