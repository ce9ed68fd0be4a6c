//! Record handler that decodes each payload and prints it.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use chrono::SecondsFormat;
use protopeek_kafka::{ProtoDecoder, RecordEvent, RecordHandler};
use tracing::debug;

use crate::config::TopicMap;
use crate::printer::{Printer, Verbosity};

/// Decodes every record with the message type mapped to its topic and
/// prints the JSON rendering.
///
/// Output per record, by verbosity:
/// - `Verbose`: a header line with position, timestamp and key
/// - `VeryVerbose`: payload size
/// - `Chatty`: raw payload (base64)
/// - always: the decoded message as indented JSON
pub struct Inspector {
    topics: TopicMap,
    decoder: ProtoDecoder,
    printer: Arc<Printer>,
}

impl Inspector {
    /// Fails if a mapped message type is not in the decoder's catalog.
    pub fn new(topics: TopicMap, decoder: ProtoDecoder, printer: Arc<Printer>) -> anyhow::Result<Self> {
        for (topic, message_type) in topics.iter() {
            decoder.schema().resolve(message_type).with_context(|| {
                format!("Topic {topic} is mapped to a message type that is not in the schema")
            })?;
        }
        Ok(Self {
            topics,
            decoder,
            printer,
        })
    }

    /// Decode `event` and print its block of output lines.
    pub async fn inspect(&self, event: &RecordEvent) -> anyhow::Result<()> {
        let message_type = self
            .topics
            .message_type(&event.topic)
            .with_context(|| format!("No message type is mapped to topic {}", event.topic))?;

        let message = self
            .decoder
            .decode_named(message_type, &event.value)
            .with_context(|| format!("Failed to decode {} as {}", event.position(), message_type))?;
        let json = message.render()?;
        debug!("Decoded {} as {}", event.position(), message_type);

        let mut lines = Vec::with_capacity(4);
        if self.printer.enabled(Verbosity::Verbose) {
            let timestamp = event
                .timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_else(|| "-".to_string());
            let key = String::from_utf8_lossy(&event.key);
            lines.push((
                Verbosity::Verbose,
                format!("{} timestamp={} key={:?}", event.position(), timestamp, key),
            ));
        }
        lines.push((
            Verbosity::VeryVerbose,
            format!("{} bytes", event.value.len()),
        ));
        if self.printer.enabled(Verbosity::Chatty) {
            let raw = base64::engine::general_purpose::STANDARD.encode(&event.value);
            lines.push((Verbosity::Chatty, format!("raw={raw}")));
        }
        lines.push((Verbosity::Quiet, json));

        self.printer
            .write_lines(lines)
            .await
            .with_context(|| format!("Failed to print {}", event.position()))
    }
}

#[async_trait]
impl RecordHandler for Inspector {
    async fn handle(&self, event: RecordEvent) -> anyhow::Result<()> {
        self.inspect(&event).await
    }
}
