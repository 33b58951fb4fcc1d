//! mechd - Mechanism orchestrator daemon
//!
//! Entry point: loads the adapter configuration, probes the switch
//! fleet, then consumes line-delimited JSON lifecycle events on stdin
//! and dispatches them to the drivers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use fabric_common::AdapterConfig;
use fabric_mechd::{MechanismEvent, MechanismOrchestrator};

#[derive(Debug, Parser)]
#[command(name = "mechd", about = "Fabric mechanism orchestrator daemon")]
struct Args {
    /// Path to the adapter configuration file.
    #[arg(long, default_value = "/etc/fabric/mechd.yaml")]
    config: PathBuf,
}

/// Initializes tracing/logging subsystem
fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    info!("--- Starting mechd ---");

    let config = match AdapterConfig::from_yaml_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "Cannot load configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut orchestrator = match MechanismOrchestrator::new(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!(error = %e, "Cannot build orchestrator");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = orchestrator.bootstrap().await {
        error!(error = %e, "Fleet probe failed");
        return ExitCode::FAILURE;
    }

    info!("mechd ready, consuming events on stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let event: MechanismEvent = match serde_json::from_str(line) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Dropping unparseable event");
                        continue;
                    }
                };
                if let Err(e) = orchestrator.handle(event).await {
                    error!(error = %e, "Event failed");
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Cannot read event input");
                return ExitCode::FAILURE;
            }
        }
    }

    info!("Event input closed, shutting down");
    ExitCode::SUCCESS
}
