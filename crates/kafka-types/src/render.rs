//! JSON rendering of decoded messages.
//!
//! Output is deterministic: declared fields come out in descriptor
//! declaration order (the order [`ProtoMessage::fields`] already carries),
//! followed by unknown fields keyed by their field number. Unknown values are
//! tagged with their wire type, e.g. `{"varint": 300}`. `serde_json` is
//! built with `preserve_order`, so object keys keep insertion order.

use base64::Engine;
use serde_json::{Map, Number, Value};

use crate::error::Result;
use crate::proto::{ProtoFieldValue, ProtoMessage, UnknownValue};

impl ProtoMessage {
    /// Convert into a JSON value.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.to_json());
        }
        for unknown in &self.unknown_fields {
            let key = unknown.number.to_string();
            let value = unknown.value.to_json();
            match object.get_mut(&key) {
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    object.insert(key, value);
                }
            }
        }
        Value::Object(object)
    }

    /// Render as indented JSON text (two-space indent).
    pub fn render(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }
}

impl ProtoFieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            ProtoFieldValue::Double(v) => float_to_json(*v),
            // Go through the shortest f32 representation so 0.1f32 stays 0.1
            ProtoFieldValue::Float(v) => match v.to_string().parse::<f64>() {
                Ok(widened) => float_to_json(widened),
                Err(_) => float_to_json(f64::from(*v)),
            },
            ProtoFieldValue::Int32(v) => Value::from(*v),
            ProtoFieldValue::Int64(v) => Value::from(*v),
            ProtoFieldValue::Uint32(v) => Value::from(*v),
            ProtoFieldValue::Uint64(v) => Value::from(*v),
            ProtoFieldValue::Bool(v) => Value::Bool(*v),
            ProtoFieldValue::String(v) => Value::String(v.clone()),
            ProtoFieldValue::Bytes(v) => Value::String(encode_bytes(v)),
            ProtoFieldValue::Enum { number, name } => match name {
                Some(name) => Value::String(name.clone()),
                None => Value::from(*number),
            },
            ProtoFieldValue::Message(message) => message.to_json(),
            ProtoFieldValue::Repeated(values) => {
                Value::Array(values.iter().map(ProtoFieldValue::to_json).collect())
            }
            ProtoFieldValue::Map(entries) => {
                let mut object = Map::new();
                for (key, value) in entries {
                    object.insert(map_key(key), value.to_json());
                }
                Value::Object(object)
            }
        }
    }
}

impl UnknownValue {
    /// Single-key object naming the wire type.
    pub fn to_json(&self) -> Value {
        let (wire, value) = match self {
            UnknownValue::Varint(v) => ("varint", Value::from(*v)),
            UnknownValue::Fixed32(v) => ("fixed32", Value::from(*v)),
            UnknownValue::Fixed64(v) => ("fixed64", Value::from(*v)),
            UnknownValue::LengthDelimited(bytes) => ("bytes", Value::String(encode_bytes(bytes))),
        };
        let mut object = Map::new();
        object.insert(wire.to_string(), value);
        Value::Object(object)
    }
}

fn encode_bytes(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn float_to_json(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::String("NaN".to_string()),
        None if v.is_sign_positive() => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}

fn map_key(key: &ProtoFieldValue) -> String {
    match key {
        ProtoFieldValue::String(s) => s.clone(),
        ProtoFieldValue::Int32(v) => v.to_string(),
        ProtoFieldValue::Int64(v) => v.to_string(),
        ProtoFieldValue::Uint32(v) => v.to_string(),
        ProtoFieldValue::Uint64(v) => v.to_string(),
        ProtoFieldValue::Bool(v) => v.to_string(),
        other => other.to_json().to_string(),
    }
}
