//! Kafka record types.
//!
//! The kafka crate builds one [`RecordEvent`] per consumed record and hands it
//! to the record handler. Keeping the type here lets the application crate
//! name it without depending on rdkafka.

use chrono::{DateTime, TimeZone, Utc};

/// One consumed record with its Kafka metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEvent {
    /// Kafka topic name
    pub topic: String,
    /// Kafka partition number
    pub partition: i32,
    /// Kafka offset within the partition
    pub offset: i64,
    /// Broker-assigned timestamp (if available)
    pub timestamp: Option<DateTime<Utc>>,
    /// Message key, empty when the record has none
    pub key: Vec<u8>,
    /// Raw payload bytes
    pub value: Vec<u8>,
}

impl RecordEvent {
    /// `topic/partition@offset`, used in log lines and record headers.
    pub fn position(&self) -> String {
        format!("{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

/// Convert a Kafka timestamp in milliseconds since epoch.
pub fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
