//! Worklog CLI - record work sessions and run the capture and ingestion pipeline.

mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use commands::Context;
use std::path::PathBuf;

/// Worklog - track work sessions and feed completed ones to the warehouse.
#[derive(Parser)]
#[command(name = "worklog")]
#[command(about = "Work-session tracking with completion capture and archive ingestion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, stores and logs (default ~/.worklog)
    #[arg(long, global = true, env = "WORKLOG_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a work session
    Start {
        #[arg(long)]
        person_name: String,
        #[arg(long)]
        process_id: String,
        #[arg(long)]
        process_name: Option<String>,
    },

    /// Complete a running work session
    Stop {
        #[arg(long)]
        id: String,
    },

    /// Show one work session
    Get {
        #[arg(long)]
        id: String,
    },

    /// List work sessions
    List {
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
    },

    /// Archive completed sessions from the change stream
    Capture {
        /// Keep polling until Ctrl-C
        #[arg(long)]
        follow: bool,
    },

    /// Load archived records into the warehouse table
    Ingest {
        /// Keep polling until Ctrl-C
        #[arg(long)]
        continuous: bool,
    },

    /// Drop the warehouse tables and the ingestion checkpoint
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Print warehouse rows as JSON lines
    Table {
        /// Print the rescued records instead
        #[arg(long)]
        rescued: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusFilter {
    Running,
    Completed,
}

impl StatusFilter {
    fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

impl Commands {
    /// Service name in the central log stream.
    fn service_name(&self) -> &'static str {
        match self {
            Commands::Capture { .. } => "capture",
            Commands::Ingest { .. } | Commands::Reset { .. } | Commands::Table { .. } => "ingest",
            _ => "worklog",
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let ctx = Context::load(cli.base_dir, cli.log_level.as_deref())?;
    ctx.init_logging(cli.command.service_name());

    match cli.command {
        Commands::Start {
            person_name,
            process_id,
            process_name,
        } => {
            let response =
                commands::start(&ctx, &person_name, &process_id, process_name.as_deref())?;
            Ok(output::print_response(&response))
        }
        Commands::Stop { id } => Ok(output::print_response(&commands::stop(&ctx, &id)?)),
        Commands::Get { id } => Ok(output::print_response(&commands::get(&ctx, &id)?)),
        Commands::List { status } => {
            let response = commands::list(&ctx, status.map(StatusFilter::as_str))?;
            Ok(output::print_response(&response))
        }
        Commands::Capture { follow } => commands::capture(&ctx, follow).await.map(|_| 0),
        Commands::Ingest { continuous } => commands::ingest(&ctx, continuous).await.map(|_| 0),
        Commands::Reset { yes } => commands::reset(&ctx, yes).map(|_| 0),
        Commands::Table { rescued } => commands::table(&ctx, rescued).map(|_| 0),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}
