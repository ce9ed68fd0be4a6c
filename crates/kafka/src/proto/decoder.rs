//! Protobuf decoder implementation.
//!
//! Walks a binary payload tag by tag against a [`ProtoMessageDescriptor`] from
//! the catalog and produces a [`ProtoMessage`]. Field handling is dispatched
//! once per field on its [`FieldKind`]. Fields the descriptor does not declare
//! are kept as [`UnknownField`]s.

use std::sync::Arc;

use kafka_types::{
    FieldKind, MessageId, ProtoFieldDescriptor, ProtoFieldValue, ProtoMessage,
    ProtoMessageDescriptor, ProtoSchema, ProtoType, UnknownField, UnknownValue, WireType,
};
use protobuf::CodedInputStream;

use crate::error::{DecodeError, Result};

/// Maximum message nesting accepted before a payload is considered malformed.
pub const MAX_DEPTH: usize = 100;

const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;

const MAX_VARINT_LEN: u64 = 10;

type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Runtime protobuf decoder.
///
/// Cheap to clone; the catalog is shared.
#[derive(Debug, Clone)]
pub struct ProtoDecoder {
    schema: Arc<ProtoSchema>,
}

impl ProtoDecoder {
    /// Create a new decoder from a schema.
    pub fn new(schema: Arc<ProtoSchema>) -> Self {
        Self { schema }
    }

    /// Get a reference to the schema.
    pub fn schema(&self) -> &ProtoSchema {
        &self.schema
    }

    /// Resolve `message_type` in the catalog and decode `data` with it.
    pub fn decode_named(&self, message_type: &str, data: &[u8]) -> Result<ProtoMessage> {
        let descriptor = self.schema.resolve(message_type)?;
        Ok(self.decode(descriptor, data)?)
    }

    /// Decode a protobuf message from bytes.
    pub fn decode(
        &self,
        descriptor: &ProtoMessageDescriptor,
        data: &[u8],
    ) -> DecodeResult<ProtoMessage> {
        let mut input = CodedInputStream::from_bytes(data);
        input
            .push_limit(data.len() as u64)
            .map_err(|e| DecodeError::Malformed {
                message: descriptor.name.clone(),
                reason: e.to_string(),
            })?;
        let mut reader = Reader {
            input,
            data,
            schema: &self.schema,
        };
        reader.message(descriptor, None, 0)
    }
}

/// Accumulated value of one declared field while its message is decoded.
enum Slot {
    Empty,
    Value(ProtoFieldValue),
    Values(Vec<ProtoFieldValue>),
    Entries(Vec<(ProtoFieldValue, ProtoFieldValue)>),
}

impl Slot {
    /// Slot continuing from a value decoded by an earlier occurrence.
    fn resume(value: ProtoFieldValue) -> Self {
        match value {
            ProtoFieldValue::Repeated(values) => Slot::Values(values),
            ProtoFieldValue::Map(entries) => Slot::Entries(entries),
            value => Slot::Value(value),
        }
    }

    fn finish(self) -> Option<ProtoFieldValue> {
        match self {
            Slot::Empty => None,
            Slot::Value(value) => Some(value),
            Slot::Values(values) if values.is_empty() => None,
            Slot::Values(values) => Some(ProtoFieldValue::Repeated(values)),
            Slot::Entries(entries) if entries.is_empty() => None,
            Slot::Entries(entries) => Some(ProtoFieldValue::Map(entries)),
        }
    }
}

struct Reader<'a> {
    input: CodedInputStream<'a>,
    /// Bytes behind `input`, indexed by its position
    data: &'a [u8],
    schema: &'a ProtoSchema,
}

impl<'a> Reader<'a> {
    /// Decode one message up to the current limit. Fields from `earlier`, a
    /// previous occurrence of the same message, are merged with the new ones.
    fn message(
        &mut self,
        descriptor: &ProtoMessageDescriptor,
        earlier: Option<ProtoMessage>,
        depth: usize,
    ) -> DecodeResult<ProtoMessage> {
        let owner = descriptor.name.as_str();
        if depth > MAX_DEPTH {
            return Err(malformed(
                owner,
                format!("nesting deeper than {MAX_DEPTH} levels"),
            ));
        }

        let mut slots: Vec<Slot> = descriptor.fields.iter().map(|_| Slot::Empty).collect();
        let mut unknown_fields = Vec::new();
        if let Some(earlier) = earlier {
            for (name, value) in earlier.fields {
                if let Some(index) = descriptor.fields.iter().position(|f| f.name == name) {
                    slots[index] = Slot::resume(value);
                }
            }
            unknown_fields = earlier.unknown_fields;
        }

        while self.input.bytes_until_limit() > 0 {
            let (number, wire) = self.tag(owner)?;
            match descriptor.field_index(number) {
                Some(index) => {
                    let field = &descriptor.fields[index];
                    self.field(owner, field, wire, &mut slots[index], depth)?;
                }
                None => {
                    let value = self.unknown(owner, wire)?;
                    unknown_fields.push(UnknownField { number, value });
                }
            }
        }

        let fields = descriptor
            .fields
            .iter()
            .zip(slots)
            .filter_map(|(field, slot)| slot.finish().map(|value| (field.name.clone(), value)))
            .collect();

        Ok(ProtoMessage {
            message_type: descriptor.name.clone(),
            fields,
            unknown_fields,
        })
    }

    fn field(
        &mut self,
        owner: &str,
        field: &ProtoFieldDescriptor,
        wire: WireType,
        slot: &mut Slot,
        depth: usize,
    ) -> DecodeResult<()> {
        match &field.kind {
            FieldKind::Singular(ProtoType::Message(id)) => {
                expect_wire(owner, &field.name, WireType::LengthDelimited, wire)?;
                // Repeated occurrences of a message field merge
                let earlier = match std::mem::replace(slot, Slot::Empty) {
                    Slot::Value(ProtoFieldValue::Message(earlier)) => Some(*earlier),
                    _ => None,
                };
                let nested = self.nested(owner, *id, earlier, depth)?;
                *slot = Slot::Value(ProtoFieldValue::Message(Box::new(nested)));
            }
            FieldKind::Singular(ty) => {
                expect_wire(owner, &field.name, ty.wire_type(), wire)?;
                *slot = Slot::Value(self.value(owner, *ty, depth)?);
            }
            FieldKind::Repeated(ty) => {
                let mut values = match std::mem::replace(slot, Slot::Empty) {
                    Slot::Values(values) => values,
                    _ => Vec::new(),
                };
                if wire == WireType::LengthDelimited && ty.is_packable() {
                    let len = self.length(owner)?;
                    let old_limit = self.push_limit(owner, len)?;
                    while self.input.bytes_until_limit() > 0 {
                        values.push(self.value(owner, *ty, depth)?);
                    }
                    self.input.pop_limit(old_limit);
                } else {
                    expect_wire(owner, &field.name, ty.wire_type(), wire)?;
                    values.push(self.value(owner, *ty, depth)?);
                }
                *slot = Slot::Values(values);
            }
            FieldKind::Map { key, value } => {
                expect_wire(owner, &field.name, WireType::LengthDelimited, wire)?;
                let mut entries = match std::mem::replace(slot, Slot::Empty) {
                    Slot::Entries(entries) => entries,
                    _ => Vec::new(),
                };
                let (k, v) = self.map_entry(owner, field, *key, *value, depth)?;
                // Duplicate keys: last value wins, first position is kept
                match entries.iter_mut().find(|(existing, _)| *existing == k) {
                    Some(entry) => entry.1 = v,
                    None => entries.push((k, v)),
                }
                *slot = Slot::Entries(entries);
            }
        }
        Ok(())
    }

    fn map_entry(
        &mut self,
        owner: &str,
        field: &ProtoFieldDescriptor,
        key_type: ProtoType,
        value_type: ProtoType,
        depth: usize,
    ) -> DecodeResult<(ProtoFieldValue, ProtoFieldValue)> {
        let len = self.length(owner)?;
        let old_limit = self.push_limit(owner, len)?;

        let mut key = None;
        let mut value = None;
        while self.input.bytes_until_limit() > 0 {
            let (number, wire) = self.tag(owner)?;
            match number {
                1 => {
                    expect_wire(owner, &field.name, key_type.wire_type(), wire)?;
                    key = Some(self.value(owner, key_type, depth)?);
                }
                2 => {
                    expect_wire(owner, &field.name, value_type.wire_type(), wire)?;
                    value = Some(self.value(owner, value_type, depth)?);
                }
                _ => {
                    self.unknown(owner, wire)?;
                }
            }
        }
        self.input.pop_limit(old_limit);

        let key = key.unwrap_or_else(|| self.default_value(key_type));
        let value = value.unwrap_or_else(|| self.default_value(value_type));
        Ok((key, value))
    }

    fn value(&mut self, owner: &str, ty: ProtoType, depth: usize) -> DecodeResult<ProtoFieldValue> {
        use protobuf::CodedInputStream as In;

        Ok(match ty {
            ProtoType::Double => ProtoFieldValue::Double(self.fixed(owner, 8, In::read_double)?),
            ProtoType::Float => ProtoFieldValue::Float(self.fixed(owner, 4, In::read_float)?),
            ProtoType::Int32 => ProtoFieldValue::Int32(self.varint_as(owner, In::read_int32)?),
            ProtoType::Int64 => ProtoFieldValue::Int64(self.varint_as(owner, In::read_int64)?),
            ProtoType::Uint32 => ProtoFieldValue::Uint32(self.varint_as(owner, In::read_uint32)?),
            ProtoType::Uint64 => ProtoFieldValue::Uint64(self.varint_as(owner, In::read_uint64)?),
            ProtoType::Sint32 => ProtoFieldValue::Int32(self.varint_as(owner, In::read_sint32)?),
            ProtoType::Sint64 => ProtoFieldValue::Int64(self.varint_as(owner, In::read_sint64)?),
            ProtoType::Fixed32 => ProtoFieldValue::Uint32(self.fixed(owner, 4, In::read_fixed32)?),
            ProtoType::Fixed64 => ProtoFieldValue::Uint64(self.fixed(owner, 8, In::read_fixed64)?),
            ProtoType::Sfixed32 => {
                ProtoFieldValue::Int32(self.fixed(owner, 4, In::read_sfixed32)?)
            }
            ProtoType::Sfixed64 => {
                ProtoFieldValue::Int64(self.fixed(owner, 8, In::read_sfixed64)?)
            }
            ProtoType::Bool => ProtoFieldValue::Bool(self.varint_as(owner, In::read_bool)?),
            ProtoType::String => {
                let bytes = self.length_delimited(owner)?;
                let text = String::from_utf8(bytes)
                    .map_err(|e| malformed(owner, format!("invalid UTF-8 in string: {e}")))?;
                ProtoFieldValue::String(text)
            }
            ProtoType::Bytes => ProtoFieldValue::Bytes(self.length_delimited(owner)?),
            ProtoType::Message(id) => {
                ProtoFieldValue::Message(Box::new(self.nested(owner, id, None, depth)?))
            }
            ProtoType::Enum(id) => {
                let number = self.varint_as(owner, In::read_int32)?;
                let name = self
                    .schema
                    .enumeration(id)
                    .value_name(number)
                    .map(str::to_string);
                ProtoFieldValue::Enum { number, name }
            }
        })
    }

    /// Length-delimited message of type `id`, one level below `owner`.
    fn nested(
        &mut self,
        owner: &str,
        id: MessageId,
        earlier: Option<ProtoMessage>,
        depth: usize,
    ) -> DecodeResult<ProtoMessage> {
        let schema = self.schema;
        let len = self.length(owner)?;
        let old_limit = self.push_limit(owner, len)?;
        let nested = self.message(schema.message(id), earlier, depth + 1)?;
        self.input.pop_limit(old_limit);
        Ok(nested)
    }

    /// Value a map entry gets when its key or value is absent on the wire.
    fn default_value(&self, ty: ProtoType) -> ProtoFieldValue {
        match ty {
            ProtoType::Double => ProtoFieldValue::Double(0.0),
            ProtoType::Float => ProtoFieldValue::Float(0.0),
            ProtoType::Int32 | ProtoType::Sint32 | ProtoType::Sfixed32 => {
                ProtoFieldValue::Int32(0)
            }
            ProtoType::Int64 | ProtoType::Sint64 | ProtoType::Sfixed64 => {
                ProtoFieldValue::Int64(0)
            }
            ProtoType::Uint32 | ProtoType::Fixed32 => ProtoFieldValue::Uint32(0),
            ProtoType::Uint64 | ProtoType::Fixed64 => ProtoFieldValue::Uint64(0),
            ProtoType::Bool => ProtoFieldValue::Bool(false),
            ProtoType::String => ProtoFieldValue::String(String::new()),
            ProtoType::Bytes => ProtoFieldValue::Bytes(Vec::new()),
            ProtoType::Message(id) => ProtoFieldValue::Message(Box::new(ProtoMessage {
                message_type: self.schema.message(id).name.clone(),
                fields: Vec::new(),
                unknown_fields: Vec::new(),
            })),
            ProtoType::Enum(id) => ProtoFieldValue::Enum {
                number: 0,
                name: self
                    .schema
                    .enumeration(id)
                    .value_name(0)
                    .map(str::to_string),
            },
        }
    }

    fn unknown(&mut self, owner: &str, wire: WireType) -> DecodeResult<UnknownValue> {
        Ok(match wire {
            WireType::Varint => UnknownValue::Varint(self.varint(owner)?),
            WireType::Fixed32 => {
                UnknownValue::Fixed32(self.fixed(owner, 4, CodedInputStream::read_fixed32)?)
            }
            WireType::Fixed64 => {
                UnknownValue::Fixed64(self.fixed(owner, 8, CodedInputStream::read_fixed64)?)
            }
            WireType::LengthDelimited => UnknownValue::LengthDelimited(self.length_delimited(owner)?),
            WireType::StartGroup | WireType::EndGroup => {
                return Err(malformed(owner, "group wire types are not supported"))
            }
        })
    }

    fn tag(&mut self, owner: &str) -> DecodeResult<(u32, WireType)> {
        let tag = self.varint(owner)?;
        let number = tag >> 3;
        if number == 0 || number > MAX_FIELD_NUMBER {
            return Err(malformed(owner, format!("invalid field number {number}")));
        }
        let wire = WireType::new((tag & 0x7) as u32)
            .ok_or_else(|| malformed(owner, format!("invalid wire type {}", tag & 0x7)))?;
        if matches!(wire, WireType::StartGroup | WireType::EndGroup) {
            return Err(malformed(owner, "group wire types are not supported"));
        }
        Ok((number as u32, wire))
    }

    fn varint(&mut self, owner: &str) -> DecodeResult<u64> {
        self.varint_as(owner, CodedInputStream::read_raw_varint64)
    }

    /// Read a varint-encoded value once a complete varint is known to be there.
    fn varint_as<T>(
        &mut self,
        owner: &str,
        read: impl FnOnce(&mut CodedInputStream<'a>) -> protobuf::Result<T>,
    ) -> DecodeResult<T> {
        self.require_varint(owner)?;
        read(&mut self.input).map_err(|e| malformed(owner, e.to_string()))
    }

    /// Read a fixed-width value of `width` bytes.
    fn fixed<T>(
        &mut self,
        owner: &str,
        width: u64,
        read: impl FnOnce(&mut CodedInputStream<'a>) -> protobuf::Result<T>,
    ) -> DecodeResult<T> {
        self.require(owner, width)?;
        read(&mut self.input).map_err(|e| malformed(owner, e.to_string()))
    }

    /// Length prefix of a length-delimited value, checked against what is left.
    fn length(&mut self, owner: &str) -> DecodeResult<u64> {
        let len = self.varint(owner)?;
        self.require(owner, len)?;
        Ok(len)
    }

    fn length_delimited(&mut self, owner: &str) -> DecodeResult<Vec<u8>> {
        let len = self.length(owner)?;
        let len = u32::try_from(len)
            .map_err(|_| malformed(owner, format!("length {len} does not fit in 32 bits")))?;
        self.input
            .read_raw_bytes(len)
            .map_err(|e| malformed(owner, e.to_string()))
    }

    fn push_limit(&mut self, owner: &str, len: u64) -> DecodeResult<u64> {
        self.input
            .push_limit(len)
            .map_err(|e| malformed(owner, e.to_string()))
    }

    /// A varint ends with the first byte below 0x80, at most 10 bytes in.
    fn require_varint(&self, owner: &str) -> DecodeResult<()> {
        let start = self.input.pos();
        let available = self.input.bytes_until_limit().min(MAX_VARINT_LEN);
        let window = usize::try_from(start)
            .ok()
            .and_then(|start| self.data.get(start..start + available as usize))
            .ok_or_else(|| malformed(owner, format!("position {start} is past the payload")))?;
        if window.iter().any(|byte| byte & 0x80 == 0) {
            return Ok(());
        }
        if available == MAX_VARINT_LEN {
            return Err(malformed(owner, "varint is longer than 10 bytes"));
        }
        Err(DecodeError::Truncated {
            message: owner.to_string(),
            position: start + available,
        })
    }

    fn require(&self, owner: &str, needed: u64) -> DecodeResult<()> {
        if self.input.bytes_until_limit() < needed {
            return Err(DecodeError::Truncated {
                message: owner.to_string(),
                position: self.input.pos(),
            });
        }
        Ok(())
    }
}

fn expect_wire(owner: &str, field: &str, expected: WireType, actual: WireType) -> DecodeResult<()> {
    if expected != actual {
        return Err(DecodeError::WireTypeMismatch {
            message: owner.to_string(),
            field: field.to_string(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        });
    }
    Ok(())
}

fn malformed(owner: &str, reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed {
        message: owner.to_string(),
        reason: reason.into(),
    }
}
