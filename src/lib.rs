//! protopeek: inspect Kafka topics whose payloads are protobuf messages.
//!
//! `.proto` files are loaded at startup, every partition of every mapped topic
//! is consumed concurrently, and each record is decoded with the message type
//! mapped to its topic and printed as indented JSON.
//!
//! ```bash
//! protopeek -p ./protos -T '{"orders":"shop.Order"}' -k localhost:9092 --rewind -v
//! ```

pub mod config;
pub mod inspect;
pub mod printer;

use std::sync::Arc;

use anyhow::Context;
use protopeek_kafka::{BrokerClient, Coordinator, ProtoDecoder, ProtoParser, ProtoSchema};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use config::{Args, Config, TopicMap};
pub use inspect::Inspector;
pub use printer::{Printer, Verbosity};

/// Build the schema catalog described by `config`.
pub fn load_catalog(config: &Config) -> anyhow::Result<ProtoSchema> {
    let schema = ProtoParser::new(&config.proto_root)
        .files(&config.proto_files)
        .parse()
        .with_context(|| format!("Failed to load .proto files from {:?}", config.proto_root))?;
    info!(
        "Loaded {} message type(s) from {:?}",
        schema.message_count(),
        config.proto_root
    );
    Ok(schema)
}

/// Decode and print every record of the mapped topics until `cancel` fires
/// or the first error.
pub async fn run(
    config: &Config,
    broker: Arc<dyn BrokerClient>,
    printer: Arc<Printer>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let schema = load_catalog(config)?;
    let decoder = ProtoDecoder::new(Arc::new(schema));
    let inspector = Inspector::new(config.topic_map.clone(), decoder, printer)?;

    let topics = config.topic_map.topics();
    info!(
        "Inspecting {} topic(s) with policy {}: {}",
        topics.len(),
        config.policy,
        topics.join(", ")
    );

    Coordinator::new(broker, config.policy)
        .start(cancel, &topics, inspector)
        .await
        .context("Consumption stopped")?;
    Ok(())
}
