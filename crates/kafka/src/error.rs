use std::path::PathBuf;

use kafka_types::KafkaTypesError;
use thiserror::Error;

/// Failures while building the schema catalog. All of them are fatal at
/// startup; no partial catalog is ever returned.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No .proto files found under {0}")]
    NoFiles(PathBuf),

    #[error("Schema file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("{file}:{line}:{column}: {message}")]
    Parse {
        file: String,
        line: u32,
        column: u32,
        message: String,
    },

    #[error("{file}: import \"{import}\" was not found")]
    UnresolvedImport { file: String, import: String },

    #[error("Import cycle: {}", .0.join(" -> "))]
    ImportCycle(Vec<String>),

    #[error("Protobuf type check failed: {0}")]
    Typecheck(String),

    #[error("Type {name} is declared in both {first} and {second}")]
    DuplicateType {
        name: String,
        first: String,
        second: String,
    },

    #[error("Field {message}.{field} references unknown type {type_name}")]
    DanglingReference {
        message: String,
        field: String,
        type_name: String,
    },

    #[error("Field number {number} is used more than once in {message}")]
    DuplicateFieldNumber { message: String, number: u32 },
}

/// Failures while decoding a payload against a descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated payload for {message} at byte {position}")]
    Truncated { message: String, position: u64 },

    #[error(
        "Wire type mismatch for {message}.{field}: expected {expected}, found {actual}"
    )]
    WireTypeMismatch {
        message: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Malformed payload for {message}: {reason}")]
    Malformed { message: String, reason: String },
}

/// Errors reported by a [`crate::BrokerClient`].
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Offset {offset} is out of range for {topic}/{partition}")]
    OffsetOutOfRange {
        topic: String,
        partition: i32,
        offset: i64,
    },

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Types(#[from] KafkaTypesError),

    #[error("Broker error on topic {topic}: {source}")]
    Broker {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Error returned by a record handler, kept as-is so callers can
    /// downcast it.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),

    #[error("Consumer task failed: {0}")]
    TaskFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn broker(topic: &str, source: BrokerError) -> Self {
        match source {
            BrokerError::UnknownTopic(topic) => Error::UnknownTopic(topic),
            source => Error::Broker {
                topic: topic.to_string(),
                source,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
