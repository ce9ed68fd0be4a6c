//! Shared types for protopeek.
//!
//! This crate defines the schema catalog data model, the decoded value tree,
//! and the record event handed to record handlers. The kafka crate builds and
//! fills these; the application crate renders and prints them.
//!
//! # Modules
//!
//! - [`proto`] - descriptors, [`ProtoSchema`] catalog, decoded values
//! - [`message`] - [`RecordEvent`]
//! - [`render`] - deterministic JSON rendering of decoded messages
//! - [`error`] - error types

pub mod error;
pub mod message;
pub mod proto;
pub mod render;

// Re-export main types for convenient access
pub use error::{KafkaTypesError, Result};
pub use message::{timestamp_from_millis, RecordEvent};
pub use proto::{
    EnumId, FieldKind, MessageId, ProtoEnumDescriptor, ProtoFieldDescriptor, ProtoFieldValue,
    ProtoMessage, ProtoMessageDescriptor, ProtoSchema, ProtoType, UnknownField, UnknownValue,
    WireType,
};
