//! code-exec-rs binary
//!
//! Run with: cargo run
//!
//! For help: cargo run -- --help

use clap::Parser;
use code_exec::{cli::Cli, run_with_cli, shutdown_otel};
use std::io::IsTerminal;
use tokio::signal;

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let sigterm = async {
        #[cfg(unix)]
        {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    eprintln!("Failed to register SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => eprintln!("Received SIGINT, shutting down..."),
        () = sigterm => eprintln!("Received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Sessions are torn down inside the runner on every exit path
    let result = run_with_cli(&cli, shutdown_signal()).await;

    // Shutdown OpenTelemetry to flush all pending spans
    shutdown_otel();

    if let Err(e) = result {
        // stdout carries responses, errors go to stderr
        eprintln!("Error: {e}");

        if std::io::stdin().is_terminal() {
            eprintln!("\nFor debugging, run with --diagnostic to log to a file.");
            eprintln!("Or use -v/-vv for more verbose logging.");
        }

        std::process::exit(1);
    }

    Ok(())
}
