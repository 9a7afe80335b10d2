//! CLI command implementations.

mod pipeline;
mod sessions;

pub use pipeline::{capture, ingest, reset, table};
pub use sessions::{get, list, start, stop};

use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};
use worklog_config_and_utils::{init_logging_for_service, Config, Paths};

/// Resolved paths and validated configuration for one invocation.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
}

impl Context {
    pub fn load(base_dir: Option<PathBuf>, log_level: Option<&str>) -> Result<Self> {
        let paths = match base_dir {
            Some(dir) => Paths::with_base_dir(dir),
            None => Paths::new()?,
        };
        let mut config = Config::load(&paths)?;
        if let Some(level) = log_level {
            config.log_level = level.to_string();
        }
        Ok(Self { paths, config })
    }

    pub fn init_logging(&self, service_name: &str) {
        init_logging_for_service(
            service_name,
            &self.config.log_level,
            Some(self.paths.log_file()),
        );
    }
}

/// Flips to `true` on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                // Hold the sender: a dropped sender reads as shutdown.
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}
