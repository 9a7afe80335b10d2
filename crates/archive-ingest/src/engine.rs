//! Ingestion runs over the archive store.

use crate::checkpoint::{Checkpoint, CommitEntry, OffsetEntry};
use crate::error::{IngestError, IngestResult};
use crate::schema::IngestSchema;
use crate::warehouse::{RescuedRecord, Staged, Warehouse};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use session_capture::ArchiveStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use worklog_config_and_utils::{Config, MergeMode, DEFAULT_TABLE_NAME};

const JSON_SUFFIX: &str = ".json";

/// Settings for one ingestion engine.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub warehouse_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub table_name: String,
    pub merge_mode: MergeMode,
    pub interval: Duration,
}

impl IngestConfig {
    /// Rooted in `dir`, with the default table and append mode.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            warehouse_path: dir.join("warehouse.db"),
            checkpoint_path: dir.join("checkpoint"),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            merge_mode: MergeMode::Append,
            interval: Duration::from_secs(60),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            warehouse_path: config.warehouse_path.clone(),
            checkpoint_path: config.checkpoint_path.clone(),
            table_name: config.table_name.clone(),
            merge_mode: config.merge_mode,
            interval: config.ingest_interval(),
        }
    }

    /// `<checkpoint>.reset`, present only while a reset is in flight.
    pub fn reset_marker(&self) -> PathBuf {
        let mut name = self
            .checkpoint_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".reset");
        self.checkpoint_path.with_file_name(name)
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Last batch merged by this run, if any.
    pub batch_id: Option<u64>,
    pub objects_seen: usize,
    pub rows_merged: usize,
    pub rescued: usize,
    pub skipped_non_json: usize,
    /// Batches planned by an earlier run that were merged again.
    pub replayed_batches: usize,
}

pub struct IngestEngine<A: ArchiveStore> {
    archive: A,
    warehouse: Warehouse,
    checkpoint: Checkpoint,
    schema: IngestSchema,
    config: IngestConfig,
}

impl<A: ArchiveStore> IngestEngine<A> {
    /// Opens the warehouse and checkpoint, finishing an interrupted reset first.
    pub fn open(archive: A, config: IngestConfig) -> IngestResult<Self> {
        let warehouse = Warehouse::open(
            &config.warehouse_path,
            &config.table_name,
            config.merge_mode,
        )?;
        let mut engine = Self {
            archive,
            warehouse,
            checkpoint: Checkpoint::new(&config.checkpoint_path),
            schema: IngestSchema::new(),
            config,
        };

        if engine.config.reset_marker().exists() {
            warn!(
                checkpoint = %engine.config.checkpoint_path.display(),
                "Found interrupted reset, completing it"
            );
            engine.finish_reset()?;
        }
        Ok(engine)
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Merges pending batches, then every unconsumed `.json` object as one new batch.
    pub fn drain_once(&mut self) -> IngestResult<IngestReport> {
        let mut report = IngestReport::default();

        for pending in self.checkpoint.pending()? {
            warn!(
                batch_id = pending.batch_id,
                objects = pending.keys.len(),
                "Re-merging batch planned by an earlier run"
            );
            let staged = self.stage(&pending.keys)?;
            self.merge_and_commit(pending.batch_id, &staged, &mut report)?;
            report.objects_seen += pending.keys.len();
            report.replayed_batches += 1;
        }

        let consumed = self.checkpoint.consumed_keys()?;
        let mut keys = Vec::new();
        for meta in self.archive.list()? {
            if !meta.key.ends_with(JSON_SUFFIX) {
                debug!(key = %meta.key, "Skipping non-JSON object");
                report.skipped_non_json += 1;
            } else if !consumed.contains(&meta.key) {
                keys.push(meta.key);
            }
        }
        keys.sort();

        if keys.is_empty() {
            debug!("No new archive objects");
            return Ok(report);
        }

        // Read everything before the offset exists so an unreadable object
        // leaves the checkpoint untouched.
        let staged = self.stage(&keys)?;
        let batch_id = self.checkpoint.next_batch_id()?;
        report.objects_seen += keys.len();
        self.checkpoint.write_offset(&OffsetEntry {
            batch_id,
            keys,
            planned_at: now(),
        })?;
        self.merge_and_commit(batch_id, &staged, &mut report)?;

        Ok(report)
    }

    fn stage(&self, keys: &[String]) -> IngestResult<Vec<Staged>> {
        let mut staged = Vec::with_capacity(keys.len());
        for key in keys {
            let bytes = self.archive.get(key)?;
            match self.schema.validate(&bytes) {
                Ok(row) => staged.push(Staged::Row {
                    key: key.clone(),
                    row,
                }),
                Err(reason) => {
                    warn!(key = %key, reason = %reason, "Rescuing record");
                    staged.push(Staged::Rescued(RescuedRecord {
                        object_key: key.clone(),
                        raw_payload: String::from_utf8_lossy(&bytes).into_owned(),
                        reason: reason.to_string(),
                        rescued_at: now(),
                    }));
                }
            }
        }
        Ok(staged)
    }

    fn merge_and_commit(
        &mut self,
        batch_id: u64,
        staged: &[Staged],
        report: &mut IngestReport,
    ) -> IngestResult<()> {
        let stats = self.warehouse.merge_batch(batch_id, staged)?;
        self.checkpoint.write_commit(&CommitEntry {
            batch_id,
            committed_at: now(),
            rows: stats.rows,
            rescued: stats.rescued,
        })?;

        info!(
            batch_id,
            rows = stats.rows,
            rescued = stats.rescued,
            columns_added = stats.columns_added,
            table = %self.warehouse.table(),
            "Batch ingested"
        );
        report.batch_id = Some(batch_id);
        report.rows_merged += stats.rows;
        report.rescued += stats.rescued;
        Ok(())
    }

    /// Drains on every tick until `shutdown` flips. Errors are logged and
    /// the next tick tries again.
    pub async fn run_continuous(
        &mut self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> IngestResult<()> {
        let mut ticker = interval(period);
        info!(
            table = %self.warehouse.table(),
            interval_secs = period.as_secs(),
            "Continuous ingestion started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.drain_once() {
                        Ok(report) if report.objects_seen > 0 => {
                            info!(
                                objects = report.objects_seen,
                                rows = report.rows_merged,
                                rescued = report.rescued,
                                "Ingestion pass complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Ingestion pass failed, retrying next tick"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Continuous ingestion stopped");
        Ok(())
    }

    /// Drops the tables and the checkpoint so the next drain starts from
    /// scratch. Journaled by a marker file; a crash mid-reset is completed
    /// on the next open.
    pub fn reset(&mut self) -> IngestResult<()> {
        let marker = self.config.reset_marker();
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent).map_err(IngestError::io(parent))?;
        }
        fs::write(&marker, now()).map_err(IngestError::io(&marker))?;
        debug!(marker = %marker.display(), "Reset marker written");
        self.finish_reset()
    }

    fn finish_reset(&mut self) -> IngestResult<()> {
        let dropped = self.warehouse.drop_tables()?;
        let cleared = self.checkpoint.clear()?;

        let marker = self.config.reset_marker();
        match fs::remove_file(&marker) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(IngestError::io(&marker)(e)),
        }

        info!(
            table = %self.warehouse.table(),
            tables_dropped = dropped,
            checkpoint_cleared = cleared,
            "Ingestion state reset"
        );
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
