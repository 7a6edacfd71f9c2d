//! harvester CLI and daemon entry point.

mod args;
mod daemon;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use harvester_core::config::validate_region;
use harvester_core::motion::RegionWatcher;
use harvester_core::protocol::{Command, Request};
use tracing::{error, info};
use uuid::Uuid;

use crate::args::{Cli, Commands, RunArgs};
use crate::daemon::devices::{Devices, EnigoPointer, Minimap};
use crate::daemon::paths::DaemonPaths;
use crate::daemon::{Controller, DaemonClient, DaemonServer};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let paths = DaemonPaths::resolve(cli.instance.as_deref());

    let result = match cli.command {
        Commands::Run(args) => run_daemon(paths, args),
        command => run_client_command(paths, command),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Convert a client subcommand to a protocol Command.
fn to_command(command: Commands) -> anyhow::Result<Command> {
    Ok(match command {
        Commands::Targets(args) => Command::UpdateTargets {
            targets: args.targets,
        },
        Commands::Screenshot(args) => {
            // The daemon may run from another directory.
            let path = std::path::absolute(&args.path)
                .with_context(|| format!("Invalid screenshot path {:?}", args.path))?;
            Command::UpdateScreenshot {
                path: path.to_string_lossy().into_owned(),
            }
        }
        Commands::Status => Command::Status,
        Commands::History(args) => Command::History { limit: args.limit },
        Commands::Start => Command::Start,
        Commands::Stop => Command::Stop,
        Commands::Shutdown => Command::Shutdown,
        Commands::Run(_) => unreachable!("Run command handled separately"),
    })
}

/// Run a client command by connecting to the daemon.
fn run_client_command(paths: DaemonPaths, command: Commands) -> anyhow::Result<()> {
    let command = to_command(command)?;
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let mut client = DaemonClient::connect(&paths).await?;

        let request = Request {
            id: Uuid::new_v4().to_string(),
            command,
        };

        let response = client.request(request).await?;

        if response.success {
            if let Some(data) = response.data {
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
        } else if let Some(err) = response.error {
            eprintln!("Error: {}", err);
            if let Some(suggestion) = err.suggestion {
                eprintln!("  {}", suggestion);
            }
            std::process::exit(1);
        }

        Ok(())
    })
}

/// Build the controller from the command line.
fn build_controller(args: &RunArgs) -> anyhow::Result<Controller> {
    let config = args.controller_config()?;
    config.validate()?;

    let readout = args
        .readout
        .unwrap_or_else(|| config.default_readout_region());
    validate_region("Readout", &readout, &config.window)?;
    validate_region("Minimap", &args.minimap, &config.window)?;

    let devices = Devices {
        pointer: Box::new(EnigoPointer::new()?),
        motion: Box::new(RegionWatcher::new(readout)),
        explorer: Box::new(Minimap::new(args.minimap, config.window)),
    };
    info!(
        "Window {}x{} at {}, readout {},{},{},{}, minimap {},{},{},{}",
        config.window.width,
        config.window.height,
        config.window.offset,
        readout.x,
        readout.y,
        readout.width,
        readout.height,
        args.minimap.x,
        args.minimap.y,
        args.minimap.width,
        args.minimap.height,
    );
    Ok(Controller::new(config, devices))
}

/// Run the daemon server and controller with graceful signal handling.
///
/// Handles SIGINT (Ctrl+C) and SIGTERM for clean shutdown. The controller
/// is stopped before the server is dropped so no click lands after exit.
fn run_daemon(paths: DaemonPaths, args: RunArgs) -> anyhow::Result<()> {
    let controller = Arc::new(build_controller(&args)?);
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let server = DaemonServer::bind_to(paths, Arc::clone(&controller))
            .await
            .context("Failed to start daemon")?;

        if args.paused {
            info!("Controller paused; send 'harvester start' to begin");
        } else {
            controller.start().await?;
        }

        let result = tokio::select! {
            result = server.run() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down gracefully");
                Ok(())
            }
            _ = sigterm() => {
                info!("Received SIGTERM, shutting down gracefully");
                Ok(())
            }
        };

        controller.shutdown().await;
        // Server is dropped here, triggering cleanup of socket and PID files
        result
    })
}

/// Wait for SIGTERM signal (Unix only).
///
/// If signal registration fails, logs a warning and waits indefinitely.
#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(
                "Failed to register SIGTERM handler: {}, daemon will only respond to SIGINT",
                e
            );
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
