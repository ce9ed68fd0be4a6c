//! Runtime protobuf support: `.proto` catalog loading and payload decoding.

pub mod decoder;
pub mod parser;
