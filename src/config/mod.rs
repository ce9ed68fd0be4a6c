//! Command-line options and the validated configuration built from them.

mod duration;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser};
use protopeek_kafka::{ConsumerConfig, OffsetPolicy};

pub use duration::parse_duration;

use crate::printer::Verbosity;

/// Inspect Kafka topics by decoding protobuf payloads with `.proto` files
/// loaded at runtime.
#[derive(Debug, Clone, Parser)]
#[command(name = "protopeek", version)]
#[command(about = "Decode protobuf messages from Kafka topics using .proto files loaded at runtime")]
pub struct Args {
    /// The path to the folder where your *.proto files live
    #[arg(short = 'p', long, default_value = ".", env = "PROTOPEEK_PROTO_ROOT")]
    pub proto_root: PathBuf,

    /// Proto files to load, relative to --proto-root (default: every file under it)
    #[arg(
        short = 'F',
        long,
        value_delimiter = ',',
        env = "PROTOPEEK_PROTO_FILES"
    )]
    pub proto_files: Vec<String>,

    /// The topic to message type map, e.g. '{"TopicA":"Namespace.MessageTypeA"}'
    #[arg(short = 'T', long, env = "PROTOPEEK_TOPIC_MAP")]
    pub topic_map: String,

    /// Comma separated list of Kafka endpoints in server:port format
    #[arg(
        short = 'k',
        long,
        value_delimiter = ',',
        required = true,
        env = "PROTOPEEK_KAFKA_ENDPOINTS"
    )]
    pub kafka_endpoints: Vec<String>,

    /// Kafka cluster version
    #[arg(long, default_value = "1.0.0", env = "PROTOPEEK_KAFKA_VERSION")]
    pub kafka_version: String,

    /// Read every partition from the beginning of its retained log
    #[arg(long, env = "PROTOPEEK_REWIND")]
    pub rewind: bool,

    /// Reset the stored offsets
    #[arg(short = 'r', long, env = "PROTOPEEK_RESET_OFFSETS")]
    pub reset_offsets: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Consumer group used to store offsets
    #[arg(long, default_value = "protopeek", env = "PROTOPEEK_GROUP_ID")]
    pub group_id: String,

    /// How long a fetch waits for new records (e.g. "500ms", "2s")
    #[arg(long, default_value = "500ms", env = "PROTOPEEK_POLL_INTERVAL")]
    pub poll_interval: String,
}

/// Topic name to fully-qualified message type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicMap(BTreeMap<String, String>);

impl TopicMap {
    /// Parse a JSON object of topic -> message type.
    pub fn parse(json: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).context("Topic map is not valid JSON")?;
        let object = value
            .as_object()
            .context("Topic map must be a JSON object like {\"topic\":\"pkg.Type\"}")?;

        let mut map = BTreeMap::new();
        for (topic, message_type) in object {
            let message_type = message_type
                .as_str()
                .with_context(|| format!("Message type for topic {topic} must be a string"))?
                .trim();
            if topic.trim().is_empty() {
                anyhow::bail!("Topic map contains an empty topic name");
            }
            if message_type.is_empty() {
                anyhow::bail!("The message type for topic {topic} cannot be empty");
            }
            map.insert(topic.trim().to_string(), message_type.to_string());
        }
        if map.is_empty() {
            anyhow::bail!("Topic map must name at least one topic");
        }
        Ok(Self(map))
    }

    pub fn message_type(&self, topic: &str) -> Option<&str> {
        self.0.get(topic).map(String::as_str)
    }

    /// Topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(t, m)| (t.as_str(), m.as_str()))
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub proto_root: PathBuf,
    pub proto_files: Vec<String>,
    pub topic_map: TopicMap,
    pub consumer: ConsumerConfig,
    pub policy: OffsetPolicy,
    pub verbosity: Verbosity,
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> anyhow::Result<Self> {
        let endpoints: Vec<String> = args
            .kafka_endpoints
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if endpoints.is_empty() {
            anyhow::bail!("At least one Kafka endpoint is required");
        }

        let topic_map = TopicMap::parse(&args.topic_map)?;
        let poll_interval = parse_duration(&args.poll_interval)
            .with_context(|| format!("Invalid --poll-interval {:?}", args.poll_interval))?;

        let consumer = ConsumerConfig {
            brokers: endpoints.join(","),
            group_id: args.group_id,
            kafka_version: args.kafka_version,
            poll_interval,
            ..ConsumerConfig::default()
        };

        Ok(Self {
            proto_root: args.proto_root,
            proto_files: args
                .proto_files
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            topic_map,
            consumer,
            policy: OffsetPolicy::from_flags(args.rewind, args.reset_offsets),
            verbosity: Verbosity::from_count(args.verbose),
        })
    }
}
