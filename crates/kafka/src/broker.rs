//! Broker client abstraction.
//!
//! The consumption engine only talks to the broker through [`BrokerClient`].
//! [`crate::client::KafkaBroker`] implements it on top of rdkafka and
//! [`crate::testing::MemoryBroker`] implements it in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kafka_types::RecordEvent;

use crate::error::BrokerError;

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// A record as returned by a fetch, before it is tagged with its topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub partition: i32,
    pub offset: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl RawRecord {
    pub fn into_event(self, topic: &str) -> RecordEvent {
        RecordEvent {
            topic: topic.to_string(),
            partition: self.partition,
            offset: self.offset,
            timestamp: self.timestamp,
            key: self.key,
            value: self.value,
        }
    }
}

/// Offsets bounding a partition's retained log.
///
/// `low` is the first retained offset, `high` the offset the next produced
/// record will get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub low: i64,
    pub high: i64,
}

#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Partition ids of `topic`, as currently known to the cluster.
    async fn partitions(&self, topic: &str) -> BrokerResult<Vec<i32>>;

    async fn watermarks(&self, topic: &str, partition: i32) -> BrokerResult<Watermarks>;

    /// Offset stored for the consumer group, if any.
    async fn stored_offset(&self, topic: &str, partition: i32) -> BrokerResult<Option<i64>>;

    /// Store `next_offset` as the position the group resumes from.
    async fn store_offset(&self, topic: &str, partition: i32, next_offset: i64)
        -> BrokerResult<()>;

    /// Records at or after `from_offset`, in ascending offset order.
    ///
    /// Returns an empty batch when nothing arrives within the poll interval.
    async fn fetch(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
    ) -> BrokerResult<Vec<RawRecord>>;
}
