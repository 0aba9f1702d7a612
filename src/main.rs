//! Main entry point for the batch-generator CLI

use batch_generator::cancel::CancellationCoordinator;
use batch_generator::cli::{Cli, Commands};
use batch_generator::metrics;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("batch_generator=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = metrics::init_metrics(addr).await {
            error!("Failed to start metrics exporter on {}: {}", addr, e);
            std::process::exit(1);
        }
    }

    // Ctrl+C stops new task starts; in-flight tasks finish
    let signal = CancellationCoordinator::shared();
    tokio::spawn({
        let signal = signal.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing in-flight tasks...");
                signal.request_cancel();
            }
        }
    });

    let result = match cli.command {
        Commands::Run(ref args) => args.execute(&cli, signal.clone()).await,
        Commands::Plan(ref args) => args.execute(cli.output_format),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
