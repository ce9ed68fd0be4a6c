//! Consumption coordinator.
//!
//! Runs one [`TopicConsumerGroup`] per requested topic, each partition on its
//! own tokio task. Records from all partitions go to one [`RecordHandler`];
//! calls for the same partition are sequential, calls for different partitions
//! run concurrently.
//!
//! The first error from any partition (handler failure, broker failure or a
//! panicking task) is kept and cancels every other partition. [`Coordinator::start`]
//! returns it once all tasks have stopped.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use kafka_types::RecordEvent;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broker::BrokerClient;
use crate::error::{Error, Result};
use crate::offset::OffsetPolicy;
use crate::topic::TopicConsumerGroup;

/// Per-record callback.
///
/// Implemented for any `Fn(RecordEvent) -> impl Future<Output = anyhow::Result<()>>`.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle(&self, event: RecordEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> RecordHandler for F
where
    F: Fn(RecordEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: RecordEvent) -> anyhow::Result<()> {
        (self)(event).await
    }
}

/// Single-assignment error slot shared by all partition tasks.
#[derive(Debug, Default)]
pub(crate) struct FirstError {
    slot: Mutex<Option<Error>>,
}

impl FirstError {
    /// Keep `error` unless an earlier one is already recorded.
    /// Returns whether it was kept.
    pub(crate) fn record(&self, error: Error) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            debug!("Dropping error after the first one: {}", error);
            return false;
        }
        *slot = Some(error);
        true
    }

    pub(crate) fn take(&self) -> Option<Error> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Wait for every task, turning panics into errors, and return the first error.
pub(crate) async fn supervise(
    mut tasks: JoinSet<()>,
    first_error: &FirstError,
    cancel: &CancellationToken,
) -> Result<()> {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if first_error.record(Error::TaskFailed(e.to_string())) {
                cancel.cancel();
            }
        }
    }
    match first_error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

pub struct Coordinator {
    broker: Arc<dyn BrokerClient>,
    policy: OffsetPolicy,
}

impl Coordinator {
    pub fn new(broker: Arc<dyn BrokerClient>, policy: OffsetPolicy) -> Self {
        Self { broker, policy }
    }

    pub fn policy(&self) -> OffsetPolicy {
        self.policy
    }

    /// Consume `topics` until `cancel` fires or something fails.
    ///
    /// Cancelling `cancel` stops every partition and makes this return
    /// `Ok(())`. A failure cancels only the coordinator's own child token,
    /// never the caller's.
    pub async fn start<H>(
        &self,
        cancel: &CancellationToken,
        topics: &[String],
        handler: H,
    ) -> Result<()>
    where
        H: RecordHandler + 'static,
    {
        let token = cancel.child_token();

        let mut groups = Vec::with_capacity(topics.len());
        for topic in topics {
            let group = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(()),
                group = TopicConsumerGroup::discover(Arc::clone(&self.broker), topic, self.policy) => group?,
            };
            groups.push(group);
        }

        let partitions: usize = groups.iter().map(|g| g.consumers().len()).sum();
        info!(
            "Starting {} partition consumer(s) across {} topic(s)",
            partitions,
            groups.len()
        );

        let handler = Arc::new(handler);
        let first_error = Arc::new(FirstError::default());
        let mut tasks = JoinSet::new();
        for group in groups {
            group.spawn(
                &mut tasks,
                Arc::clone(&handler),
                token.clone(),
                Arc::clone(&first_error),
            );
        }

        let result = supervise(tasks, &first_error, &token).await;
        info!("All partition consumers stopped");
        result
    }
}
