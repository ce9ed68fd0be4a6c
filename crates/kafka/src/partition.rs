//! Single-partition consumer.
//!
//! ```text
//! Idle -> Positioning -> Fetching -> Stopped
//!              ^             |
//!              +-------------+  offset out of range
//! ```
//!
//! `Positioning` resolves the start offset through the [`OffsetPolicy`].
//! `Fetching` hands every record to the handler in offset order and commits
//! the offset after the last handled record once per fetched batch. A fetch
//! reporting that the offset is out of range goes back to `Positioning` with
//! the earliest policy; any other error or a handler failure stops the
//! consumer. Cancellation stops it without delivering further records.
//!
//! Whatever was handled but not yet committed when the consumer stops is
//! committed on the way out, bounded by [`FINAL_COMMIT_TIMEOUT`]. A record
//! whose handler failed is never committed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::BrokerClient;
use crate::coordinator::RecordHandler;
use crate::error::{BrokerError, Error, Result};
use crate::offset::OffsetPolicy;

/// How long a stopping consumer waits for its last commit.
pub const FINAL_COMMIT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Idle,
    Positioning,
    Fetching,
    Stopped,
}

pub struct PartitionConsumer {
    broker: Arc<dyn BrokerClient>,
    topic: String,
    partition: i32,
    policy: OffsetPolicy,
    state: watch::Sender<PartitionState>,
}

impl PartitionConsumer {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        topic: impl Into<String>,
        partition: i32,
        policy: OffsetPolicy,
    ) -> Self {
        let (state, _) = watch::channel(PartitionState::Idle);
        Self {
            broker,
            topic: topic.into(),
            partition,
            policy,
            state,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn state(&self) -> PartitionState {
        *self.state.borrow()
    }

    /// Receiver that observes state transitions.
    pub fn watch_state(&self) -> watch::Receiver<PartitionState> {
        self.state.subscribe()
    }

    /// Consume until cancelled or until an error stops the partition.
    ///
    /// Returns `Ok(())` on cancellation.
    pub async fn run<H>(&self, handler: &H, cancel: &CancellationToken) -> Result<()>
    where
        H: RecordHandler + ?Sized,
    {
        let result = self.consume(handler, cancel).await;
        self.state.send_replace(PartitionState::Stopped);
        match &result {
            Ok(()) => debug!("{}/{} stopped", self.topic, self.partition),
            Err(e) => error!("{}/{} stopped: {}", self.topic, self.partition, e),
        }
        result
    }

    async fn consume<H>(&self, handler: &H, cancel: &CancellationToken) -> Result<()>
    where
        H: RecordHandler + ?Sized,
    {
        let mut pending = None;
        let result = self.deliver(handler, cancel, &mut pending).await;
        if let Some(next_offset) = pending {
            let commit = self
                .broker
                .store_offset(&self.topic, self.partition, next_offset);
            match tokio::time::timeout(FINAL_COMMIT_TIMEOUT, commit).await {
                Ok(Ok(())) => debug!(
                    "Committed offset {} for {}/{} on stop",
                    next_offset, self.topic, self.partition
                ),
                Ok(Err(e)) => warn!(
                    "Failed to commit offset {} for {}/{}: {}",
                    next_offset, self.topic, self.partition, e
                ),
                Err(_) => warn!(
                    "Gave up committing offset {} for {}/{} after {:?}",
                    next_offset, self.topic, self.partition, FINAL_COMMIT_TIMEOUT
                ),
            }
        }
        result
    }

    /// Fetch and hand out records. `pending` holds the next offset once a
    /// record was handled and its progress is not committed yet.
    async fn deliver<H>(
        &self,
        handler: &H,
        cancel: &CancellationToken,
        pending: &mut Option<i64>,
    ) -> Result<()>
    where
        H: RecordHandler + ?Sized,
    {
        let mut policy = self.policy;

        'positioning: loop {
            self.state.send_replace(PartitionState::Positioning);
            let resolved = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                resolved = policy.resolve(self.broker.as_ref(), &self.topic, self.partition) => resolved,
            };
            let mut position = resolved.map_err(|e| Error::broker(&self.topic, e))?;
            info!(
                "Consuming {}/{} from offset {} ({})",
                self.topic, self.partition, position, policy
            );

            self.state.send_replace(PartitionState::Fetching);
            loop {
                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(()),
                    fetched = self.broker.fetch(&self.topic, self.partition, position) => fetched,
                };
                let records = match fetched {
                    Ok(records) => records,
                    Err(BrokerError::OffsetOutOfRange { offset, .. }) => {
                        warn!(
                            "Offset {} of {}/{} is no longer retained, re-positioning at earliest",
                            offset, self.topic, self.partition
                        );
                        policy = OffsetPolicy::Earliest;
                        continue 'positioning;
                    }
                    Err(e) => return Err(Error::broker(&self.topic, e)),
                };
                if !records.is_empty() {
                    debug!(
                        "Fetched {} record(s) from {}/{} at {}",
                        records.len(),
                        self.topic,
                        self.partition,
                        position
                    );
                }

                for record in records {
                    if record.offset < position {
                        continue;
                    }
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    let offset = record.offset;
                    let event = record.into_event(&self.topic);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        handled = handler.handle(event) => handled.map_err(Error::Handler)?,
                    }
                    position = offset + 1;
                    *pending = Some(position);
                }

                if let Some(next_offset) = *pending {
                    let stored = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        stored = self.broker.store_offset(&self.topic, self.partition, next_offset) => stored,
                    };
                    match stored {
                        Ok(()) => *pending = None,
                        // Kept pending, the next batch or the stop retries it
                        Err(e) => warn!(
                            "Failed to commit offset {} for {}/{}: {}",
                            next_offset, self.topic, self.partition, e
                        ),
                    }
                }
            }
        }
    }
}
