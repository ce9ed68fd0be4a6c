//! Kafka consumption library for `protopeek`: reads every partition of a set of
//! topics concurrently and decodes protobuf payloads against `.proto` files
//! loaded at runtime.
//!
//! Features:
//!
//! - Runtime Protobuf Support: Parse `.proto` files at runtime and decode messages without code generation
//! - Multi-topic Consumption: One task per partition, fail-fast on the first error
//! - Offset Policies: Resume, rewind to earliest, or reset the stored offsets

/// Broker abstraction shared by the Kafka client and the in-memory test broker
pub mod broker;

/// rdkafka-backed [`broker::BrokerClient`]
pub mod client;

/// Multi-topic consumption with first-error cancellation
pub mod coordinator;
pub mod error;
pub mod offset;
pub mod partition;
pub mod proto;

/// In-memory broker for tests and demos
pub mod testing;
pub mod topic;

// Re-export main types for easy access
pub use broker::{BrokerClient, BrokerResult, RawRecord, Watermarks};
pub use client::{ConsumerConfig, KafkaBroker};
pub use coordinator::{Coordinator, RecordHandler};
pub use error::{BrokerError, DecodeError, Error, Result, SchemaError};
pub use kafka_types::{
    EnumId, FieldKind, MessageId, ProtoEnumDescriptor, ProtoFieldDescriptor, ProtoFieldValue,
    ProtoMessage, ProtoMessageDescriptor, ProtoSchema, ProtoType, RecordEvent, UnknownField,
    UnknownValue,
};
pub use offset::{OffsetPolicy, ResetTarget};
pub use partition::{PartitionConsumer, PartitionState};
pub use proto::decoder::ProtoDecoder;
pub use proto::parser::ProtoParser;
pub use testing::{FetchFailure, MemoryBroker};
pub use topic::TopicConsumerGroup;
