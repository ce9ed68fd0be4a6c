//! Command-line interface for protopeek
//!
//! # Usage Examples
//!
//! ```bash
//! # Print every new record of two topics
//! protopeek -p ./protos \
//!   -T '{"orders":"shop.Order","payments":"billing.Payment"}' \
//!   -k kafka1:9092,kafka2:9092
//!
//! # Read from the start of the retained log, with record headers
//! protopeek -p ./protos -F shop/order.proto \
//!   -T '{"orders":"shop.Order"}' -k localhost:9092 --rewind -v
//! ```
//!
//! Every flag can also be set through a `PROTOPEEK_*` environment variable.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use protopeek::{Args, Config, Printer, Verbosity};
use protopeek_kafka::KafkaBroker;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Verbosity::from_count(args.verbose).log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::try_from(args)?;
    let broker = KafkaBroker::new(config.consumer.clone()).context("Failed to create Kafka client")?;
    let printer = Arc::new(Printer::stdout(config.verbosity));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt signal (Ctrl+C)");
                interrupt.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {e}"),
        }
    });

    protopeek::run(&config, Arc::new(broker), printer, &cancel).await
}
