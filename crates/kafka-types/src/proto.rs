//! Protobuf schema descriptors and decoded values.
//!
//! These are the shared data structures of the catalog and the decoder.
//! The kafka crate builds a [`ProtoSchema`] from `.proto` files and fills
//! [`ProtoMessage`] values from binary payloads; this crate only defines them
//! and renders them (see [`crate::render`]).
//!
//! ## Dependency Flow
//!
//! ```text
//! kafka-types (this crate):
//!   - Defines: ProtoSchema, ProtoMessageDescriptor, ProtoFieldValue, ProtoMessage, ...
//!   - NO dependency on the kafka crate
//!
//! kafka (consumer crate):
//!   - Depends on: kafka-types
//!   - Provides: ProtoParser (catalog builder), ProtoDecoder, consumers
//! ```

use std::collections::HashMap;

pub use protobuf::rt::WireType;

use crate::error::{KafkaTypesError, Result};

/// Index of a message descriptor inside its [`ProtoSchema`].
///
/// References between messages go through this index instead of owning the
/// referenced descriptor, so self-referencing and mutually recursive types
/// need no copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub usize);

/// Index of an enum descriptor inside its [`ProtoSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub usize);

/// Protobuf field value type.
///
/// All 15 scalar types plus references to message and enum descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message(MessageId),
    Enum(EnumId),
}

impl std::fmt::Display for ProtoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl ProtoType {
    /// Get the human-readable type name.
    pub fn type_name(&self) -> String {
        match self {
            ProtoType::Double => "double".to_string(),
            ProtoType::Float => "float".to_string(),
            ProtoType::Int32 => "int32".to_string(),
            ProtoType::Int64 => "int64".to_string(),
            ProtoType::Uint32 => "uint32".to_string(),
            ProtoType::Uint64 => "uint64".to_string(),
            ProtoType::Sint32 => "sint32".to_string(),
            ProtoType::Sint64 => "sint64".to_string(),
            ProtoType::Fixed32 => "fixed32".to_string(),
            ProtoType::Fixed64 => "fixed64".to_string(),
            ProtoType::Sfixed32 => "sfixed32".to_string(),
            ProtoType::Sfixed64 => "sfixed64".to_string(),
            ProtoType::Bool => "bool".to_string(),
            ProtoType::String => "string".to_string(),
            ProtoType::Bytes => "bytes".to_string(),
            ProtoType::Message(id) => format!("message#{}", id.0),
            ProtoType::Enum(id) => format!("enum#{}", id.0),
        }
    }

    /// The wire type a single value of this type is encoded with.
    pub fn wire_type(&self) -> WireType {
        match self {
            ProtoType::Double | ProtoType::Fixed64 | ProtoType::Sfixed64 => WireType::Fixed64,
            ProtoType::Float | ProtoType::Fixed32 | ProtoType::Sfixed32 => WireType::Fixed32,
            ProtoType::String | ProtoType::Bytes | ProtoType::Message(_) => {
                WireType::LengthDelimited
            }
            ProtoType::Int32
            | ProtoType::Int64
            | ProtoType::Uint32
            | ProtoType::Uint64
            | ProtoType::Sint32
            | ProtoType::Sint64
            | ProtoType::Bool
            | ProtoType::Enum(_) => WireType::Varint,
        }
    }

    /// Whether repeated values of this type may use the packed encoding.
    pub fn is_packable(&self) -> bool {
        self.wire_type() != WireType::LengthDelimited
    }
}

/// Shape of a field: the closed set of field kinds the decoder dispatches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// At most one value (proto3 implicit, `optional`, or proto2 `required`).
    Singular(ProtoType),
    /// Zero or more values, packed or unpacked on the wire.
    Repeated(ProtoType),
    /// `map<key, value>`, encoded as repeated entry messages with fields 1 and 2.
    Map { key: ProtoType, value: ProtoType },
}

/// Describes a single field in a protobuf message.
#[derive(Debug, Clone)]
pub struct ProtoFieldDescriptor {
    /// Field name as declared
    pub name: String,
    /// Field number (tag)
    pub number: u32,
    /// Field shape and value type
    pub kind: FieldKind,
}

/// Describes a protobuf message type.
#[derive(Debug, Clone)]
pub struct ProtoMessageDescriptor {
    /// Fully qualified message name (e.g., "mypackage.Outer.Inner")
    pub name: String,
    /// File the message was declared in, relative to the schema root
    pub file: String,
    /// Fields in declaration order
    pub fields: Vec<ProtoFieldDescriptor>,
    by_number: HashMap<u32, usize>,
}

impl ProtoMessageDescriptor {
    /// Create a descriptor. Field numbers must be unique.
    pub fn new(name: String, file: String, fields: Vec<ProtoFieldDescriptor>) -> Self {
        let by_number = fields
            .iter()
            .enumerate()
            .map(|(index, field)| (field.number, index))
            .collect();
        Self {
            name,
            file,
            fields,
            by_number,
        }
    }

    /// Get a field descriptor by name.
    pub fn get_field(&self, name: &str) -> Option<&ProtoFieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of the field with the given number in [`Self::fields`].
    pub fn field_index(&self, number: u32) -> Option<usize> {
        self.by_number.get(&number).copied()
    }

    /// List all field names in definition order.
    pub fn list_fields(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Describes a protobuf enum type.
#[derive(Debug, Clone)]
pub struct ProtoEnumDescriptor {
    /// Fully qualified enum name
    pub name: String,
    /// Declared values as (name, number), in declaration order
    pub values: Vec<(String, i32)>,
}

impl ProtoEnumDescriptor {
    /// Name of the first value declared with `number`.
    pub fn value_name(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| name.as_str())
    }
}

/// The schema catalog: every message and enum loaded from a schema root.
///
/// Built once before consumption starts and read-only afterwards, so it can
/// be shared behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct ProtoSchema {
    messages: Vec<ProtoMessageDescriptor>,
    enums: Vec<ProtoEnumDescriptor>,
    message_index: HashMap<String, MessageId>,
    enum_index: HashMap<String, EnumId>,
}

impl ProtoSchema {
    /// Assemble a catalog from fully linked descriptors.
    ///
    /// Names must already be unique; the parser checks this before calling.
    pub fn from_parts(
        messages: Vec<ProtoMessageDescriptor>,
        enums: Vec<ProtoEnumDescriptor>,
    ) -> Self {
        let message_index = messages
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), MessageId(i)))
            .collect();
        let enum_index = enums
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), EnumId(i)))
            .collect();
        Self {
            messages,
            enums,
            message_index,
            enum_index,
        }
    }

    /// Look up a message descriptor by its fully qualified name.
    pub fn resolve(&self, name: &str) -> Result<&ProtoMessageDescriptor> {
        let name = name.strip_prefix('.').unwrap_or(name);
        self.message_index
            .get(name)
            .map(|id| &self.messages[id.0])
            .ok_or_else(|| KafkaTypesError::MessageTypeNotFound(name.to_string()))
    }

    /// Get a message descriptor by index.
    pub fn message(&self, id: MessageId) -> &ProtoMessageDescriptor {
        &self.messages[id.0]
    }

    /// Get an enum descriptor by index.
    pub fn enumeration(&self, id: EnumId) -> &ProtoEnumDescriptor {
        &self.enums[id.0]
    }

    /// Look up an enum descriptor by its fully qualified name.
    pub fn get_enum(&self, name: &str) -> Option<&ProtoEnumDescriptor> {
        let name = name.strip_prefix('.').unwrap_or(name);
        self.enum_index.get(name).map(|id| &self.enums[id.0])
    }

    /// All fully qualified message names, sorted.
    pub fn list_messages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.message_index.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Represents a field value in a decoded protobuf message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoFieldValue {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Enum number, with the declared value name when the schema knows it
    Enum { number: i32, name: Option<String> },
    Message(Box<ProtoMessage>),
    Repeated(Vec<ProtoFieldValue>),
    /// Map entries in wire order, duplicate keys already collapsed
    Map(Vec<(ProtoFieldValue, ProtoFieldValue)>),
}

/// Raw value of a field the descriptor does not declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnknownValue {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    LengthDelimited(Vec<u8>),
}

impl UnknownValue {
    pub fn wire_type(&self) -> WireType {
        match self {
            UnknownValue::Varint(_) => WireType::Varint,
            UnknownValue::Fixed32(_) => WireType::Fixed32,
            UnknownValue::Fixed64(_) => WireType::Fixed64,
            UnknownValue::LengthDelimited(_) => WireType::LengthDelimited,
        }
    }
}

/// A field present in the payload but absent from the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownField {
    pub number: u32,
    pub value: UnknownValue,
}

/// Represents a decoded protobuf message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoMessage {
    /// Fully qualified message type name (e.g., "mypackage.MyMessage")
    pub message_type: String,
    /// Present fields, in descriptor declaration order
    pub fields: Vec<(String, ProtoFieldValue)>,
    /// Fields the descriptor does not know about, in wire order
    pub unknown_fields: Vec<UnknownField>,
}

impl ProtoMessage {
    /// Get a decoded field value by name.
    pub fn get(&self, name: &str) -> Option<&ProtoFieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}
