//! Capture and ingestion commands.

use super::{shutdown_on_ctrl_c, Context};
use crate::output::print_json;
use anyhow::{bail, Result};
use archive_ingest::{IngestConfig, IngestEngine};
use session_capture::{CaptureProcessor, FsArchiveStore, StreamTrigger, TriggerConfig};
use tracing::info;
use worklog_sessions::{SqliteSessionStore, SystemClock};

fn open_engine(ctx: &Context) -> Result<IngestEngine<FsArchiveStore>> {
    let archive = FsArchiveStore::open(&ctx.config.archive_store_path)?;
    Ok(IngestEngine::open(
        archive,
        IngestConfig::from_config(&ctx.config),
    )?)
}

/// Drains the change stream into the archive, or follows it until Ctrl-C.
pub async fn capture(ctx: &Context, follow: bool) -> Result<()> {
    let feed = SqliteSessionStore::open(&ctx.config.session_store_path)?;
    let archive = FsArchiveStore::open(&ctx.config.archive_store_path)?;
    let trigger = StreamTrigger::new(
        feed,
        CaptureProcessor::new(archive, SystemClock),
        TriggerConfig::from_config(&ctx.config),
    );

    if follow {
        trigger.run(shutdown_on_ctrl_c()).await?;
    } else {
        let report = trigger.drain_once().await?;
        info!(
            events = report.events_seen,
            archived = report.archived,
            "Capture drained"
        );
        print_json(&report);
    }
    Ok(())
}

/// Ingests new archive objects once, or on every interval until Ctrl-C.
pub async fn ingest(ctx: &Context, continuous: bool) -> Result<()> {
    let mut engine = open_engine(ctx)?;

    if continuous {
        let period = engine.config().interval;
        engine.run_continuous(period, shutdown_on_ctrl_c()).await?;
    } else {
        print_json(&engine.drain_once()?);
    }
    Ok(())
}

pub fn reset(ctx: &Context, yes: bool) -> Result<()> {
    if !yes {
        bail!("Reset drops the warehouse tables and the checkpoint; rerun with --yes");
    }
    let mut engine = open_engine(ctx)?;
    engine.reset()?;
    print_json(&serde_json::json!({
        "reset": true,
        "table": engine.warehouse().table(),
    }));
    Ok(())
}

/// Prints the table (or its rescue table) as JSON lines.
///
/// Opens through the engine so an interrupted reset is finished first.
pub fn table(ctx: &Context, rescued: bool) -> Result<()> {
    let engine = open_engine(ctx)?;
    let warehouse = engine.warehouse();
    let rows = if rescued {
        warehouse.rescued_rows()?
    } else {
        warehouse.rows()?
    };
    for row in &rows {
        print_json(row);
    }
    Ok(())
}
