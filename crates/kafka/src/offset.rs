//! Starting-offset policy.

use std::fmt;

use tracing::debug;

use crate::broker::{BrokerClient, BrokerResult};

/// Where a reset moves the stored offset to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    Earliest,
    Latest,
}

/// How a partition consumer picks its first offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetPolicy {
    /// Continue from the group's stored offset, or the earliest retained
    /// offset when nothing is stored.
    #[default]
    Resume,
    /// Start from the earliest retained offset and ignore the stored one.
    Earliest,
    /// Overwrite the stored offset with the target and start there.
    Reset(ResetTarget),
}

impl OffsetPolicy {
    /// Map the `--rewind` / `--reset-offsets` flags to a policy.
    pub fn from_flags(rewind: bool, reset: bool) -> Self {
        match (rewind, reset) {
            (false, false) => OffsetPolicy::Resume,
            (true, false) => OffsetPolicy::Earliest,
            (false, true) => OffsetPolicy::Reset(ResetTarget::Latest),
            (true, true) => OffsetPolicy::Reset(ResetTarget::Earliest),
        }
    }

    /// Offset of the first record to fetch from `topic`/`partition`.
    pub async fn resolve(
        &self,
        broker: &dyn BrokerClient,
        topic: &str,
        partition: i32,
    ) -> BrokerResult<i64> {
        let offset = match self {
            OffsetPolicy::Earliest => broker.watermarks(topic, partition).await?.low,
            OffsetPolicy::Resume => match broker.stored_offset(topic, partition).await? {
                Some(stored) => stored,
                None => {
                    debug!("No stored offset for {topic}/{partition}, starting from earliest");
                    broker.watermarks(topic, partition).await?.low
                }
            },
            OffsetPolicy::Reset(target) => {
                let watermarks = broker.watermarks(topic, partition).await?;
                let offset = match target {
                    ResetTarget::Earliest => watermarks.low,
                    ResetTarget::Latest => watermarks.high,
                };
                broker.store_offset(topic, partition, offset).await?;
                offset
            }
        };
        Ok(offset)
    }
}

impl fmt::Display for OffsetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetPolicy::Resume => write!(f, "resume"),
            OffsetPolicy::Earliest => write!(f, "earliest"),
            OffsetPolicy::Reset(ResetTarget::Earliest) => write!(f, "reset to earliest"),
            OffsetPolicy::Reset(ResetTarget::Latest) => write!(f, "reset to latest"),
        }
    }
}
