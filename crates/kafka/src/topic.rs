//! Per-topic group of partition consumers.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::BrokerClient;
use crate::coordinator::{supervise, FirstError, RecordHandler};
use crate::error::{Error, Result};
use crate::offset::OffsetPolicy;
use crate::partition::PartitionConsumer;

/// One [`PartitionConsumer`] per partition of a topic.
///
/// The partition set is read once by [`TopicConsumerGroup::discover`];
/// partitions added later are not picked up.
pub struct TopicConsumerGroup {
    topic: String,
    consumers: Vec<PartitionConsumer>,
}

impl TopicConsumerGroup {
    pub async fn discover(
        broker: Arc<dyn BrokerClient>,
        topic: &str,
        policy: OffsetPolicy,
    ) -> Result<Self> {
        let partitions = broker
            .partitions(topic)
            .await
            .map_err(|e| Error::broker(topic, e))?;
        if partitions.is_empty() {
            return Err(Error::UnknownTopic(topic.to_string()));
        }
        info!(
            "Topic {} has {} partition(s): {:?}",
            topic,
            partitions.len(),
            partitions
        );

        let consumers = partitions
            .into_iter()
            .map(|partition| PartitionConsumer::new(Arc::clone(&broker), topic, partition, policy))
            .collect();
        Ok(Self {
            topic: topic.to_string(),
            consumers,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partitions(&self) -> Vec<i32> {
        self.consumers.iter().map(|c| c.partition()).collect()
    }

    pub fn consumers(&self) -> &[PartitionConsumer] {
        &self.consumers
    }

    /// Spawn one task per partition into `tasks`.
    ///
    /// A failing partition records its error in `first_error` and cancels
    /// `cancel`, which stops every task sharing the token.
    pub(crate) fn spawn<H>(
        self,
        tasks: &mut JoinSet<()>,
        handler: Arc<H>,
        cancel: CancellationToken,
        first_error: Arc<FirstError>,
    ) where
        H: RecordHandler + 'static,
    {
        for consumer in self.consumers {
            let handler = Arc::clone(&handler);
            let cancel = cancel.clone();
            let first_error = Arc::clone(&first_error);
            tasks.spawn(async move {
                if let Err(e) = consumer.run(handler.as_ref(), &cancel).await {
                    first_error.record(e);
                    cancel.cancel();
                }
            });
        }
    }

    /// Consume this topic alone until cancelled or until a partition fails.
    pub async fn run<H>(self, handler: H, cancel: &CancellationToken) -> Result<()>
    where
        H: RecordHandler + 'static,
    {
        let token = cancel.child_token();
        let first_error = Arc::new(FirstError::default());
        let mut tasks = JoinSet::new();
        self.spawn(
            &mut tasks,
            Arc::new(handler),
            token.clone(),
            Arc::clone(&first_error),
        );
        supervise(tasks, &first_error, &token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBroker;
    use kafka_types::RecordEvent;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_discover_lists_partitions_once() {
        let broker = Arc::new(MemoryBroker::new());
        broker.create_topic("orders", 3);

        let group = TopicConsumerGroup::discover(broker.clone(), "orders", OffsetPolicy::Resume)
            .await
            .unwrap();
        assert_eq!(group.topic(), "orders");
        assert_eq!(group.partitions(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_topic() {
        let broker = Arc::new(MemoryBroker::new());
        let err = TopicConsumerGroup::discover(broker, "nope", OffsetPolicy::Resume)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownTopic(topic) if topic == "nope"));
    }

    #[tokio::test]
    async fn test_run_consumes_every_partition() {
        let broker = Arc::new(MemoryBroker::new());
        broker.create_topic("orders", 2);
        broker.append("orders", 0, b"a".to_vec());
        broker.append("orders", 1, b"b".to_vec());
        broker.append("orders", 1, b"c".to_vec());

        let group = TopicConsumerGroup::discover(broker.clone(), "orders", OffsetPolicy::Resume)
            .await
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let handler = {
            let seen = Arc::clone(&seen);
            let cancel = cancel.clone();
            move |event: RecordEvent| {
                let seen = Arc::clone(&seen);
                let cancel = cancel.clone();
                async move {
                    let mut seen = seen.lock().unwrap();
                    seen.push((event.partition, event.offset, event.value));
                    if seen.len() == 3 {
                        cancel.cancel();
                    }
                    Ok::<(), anyhow::Error>(())
                }
            }
        };

        group.run(handler, &cancel).await.unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                (0, 0, b"a".to_vec()),
                (1, 0, b"b".to_vec()),
                (1, 1, b"c".to_vec()),
            ]
        );
    }
}
