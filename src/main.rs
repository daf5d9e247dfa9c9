mod command;
mod config;
mod engine;
mod inventory;
mod recorder;
mod session;
mod transport;

#[cfg(test)]
mod testing;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use cmdfleet_shared::OutputFormat;
use config::{Fleet, INVENTORY_ENV};
use engine::{BulkEngine, DispatchRequest, RequestMode};
use inventory::Inventory;
use recorder::{CollectingNotifier, HistorySink, JsonlHistory, OutcomeRecorder, TracingNotifier};
use session::CliSessionFactory;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Run show and configuration commands across many network devices
#[derive(Parser, Debug)]
#[command(name = "cmdfleet", version)]
struct Cli {
    /// Fleet file with the engine settings, devices and groups
    #[arg(long, global = true, env = "CMDFLEET_INVENTORY")]
    inventory: Option<PathBuf>,

    /// History file (overrides the fleet file)
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    /// Concurrent sessions for parallel runs (overrides the fleet file)
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Targets {
    /// Device name or id; repeatable
    #[arg(short, long = "device")]
    devices: Vec<String>,

    /// Device group name; repeatable
    #[arg(short, long = "group")]
    groups: Vec<String>,

    /// Run on one device at a time
    #[arg(long)]
    sequential: bool,

    /// Recorded as the actor of every history entry
    #[arg(long, env = "USER")]
    actor: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one show command
    Show {
        command: String,
        /// Ask for structured output and pretty-print it
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        targets: Targets,
    },
    /// Run several show commands, one after another
    Batch {
        #[arg(required = true)]
        commands: Vec<String>,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        targets: Targets,
    },
    /// Apply configuration lines
    Config {
        lines: Vec<String>,
        /// Read configuration lines from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Leave the running configuration unsaved
        #[arg(long)]
        no_save: bool,
        #[command(flatten)]
        targets: Targets,
    },
    /// Capture the running configuration
    Backup {
        #[command(flatten)]
        targets: Targets,
    },
    /// List recorded executions, newest first
    History {
        /// Only this device (name or id)
        #[arg(short, long)]
        device: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn format(json: bool) -> OutputFormat {
    if json {
        OutputFormat::Json
    } else {
        OutputFormat::Raw
    }
}

fn request(targets: Targets, mode: RequestMode) -> DispatchRequest {
    DispatchRequest {
        devices: targets.devices,
        groups: targets.groups,
        mode,
        parallel: !targets.sequential,
        actor: targets.actor,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so the JSON on stdout stays machine readable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let Some(path) = cli.inventory.as_deref() else {
        bail!("No fleet file given; pass --inventory or set {}", INVENTORY_ENV);
    };
    let Fleet {
        engine: mut settings,
        inventory,
    } = Fleet::load(path)?;
    if let Some(history) = cli.history {
        settings.history_path = history;
    }
    if let Some(workers) = cli.workers {
        settings.workers = workers;
    }

    info!(
        "Fleet loaded from {}: {} device(s), {} group(s)",
        path.display(),
        inventory.devices().len(),
        inventory.groups().len()
    );

    let inventory = Arc::new(inventory);
    let history = Arc::new(JsonlHistory::new(&settings.history_path));

    let mode = match cli.command {
        Command::History { device, limit } => {
            let entries = match device {
                Some(ident) => {
                    let Some(device) = inventory.device(&ident) else {
                        bail!("Unknown device: {}", ident);
                    };
                    history.for_device(device.id, limit).await
                }
                None => history.recent(limit).await,
            }
            .with_context(|| format!("Failed to read {}", history.path().display()))?;

            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Show {
            command,
            json,
            targets,
        } => request(
            targets,
            RequestMode::Show {
                command,
                format: format(json),
            },
        ),
        Command::Batch {
            commands,
            json,
            targets,
        } => request(
            targets,
            RequestMode::ShowBatch {
                commands,
                format: format(json),
            },
        ),
        Command::Config {
            mut lines,
            file,
            no_save,
            targets,
        } => {
            if let Some(file) = file {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                lines.push(text);
            }
            request(
                targets,
                RequestMode::Config {
                    lines,
                    save: !no_save,
                },
            )
        }
        Command::Backup { targets } => request(targets, RequestMode::Backup),
    };

    let notifications = Arc::new(CollectingNotifier::new());
    let recorder = OutcomeRecorder::new(history)
        .with_notifier(notifications.clone())
        .with_notifier(Arc::new(TracingNotifier));
    let factory = Arc::new(CliSessionFactory::new(
        settings.connect_timeout,
        settings.read_timeout,
    ));
    let engine = BulkEngine::new(inventory, factory, recorder, settings.workers);

    let response = match engine.execute(mode).await {
        Ok(response) => response,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    for notification in notifications.take() {
        eprintln!("[{}] {}", notification.level, notification.message);
    }

    if response.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}
