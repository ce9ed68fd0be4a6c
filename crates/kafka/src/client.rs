//! rdkafka-backed [`BrokerClient`].
//!
//! A single control consumer answers metadata, watermark and committed-offset
//! queries and commits offsets. Every partition gets its own assigned
//! consumer for fetching, created on first use, so partitions never share a
//! fetch queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kafka_types::timestamp_from_millis;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message as RdkafkaMessage};
use rdkafka::{Offset, TopicPartitionList};
use tracing::debug;

use crate::broker::{BrokerClient, BrokerResult, RawRecord, Watermarks};
use crate::error::BrokerError;

/// Configuration for the Kafka consumers
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID used for stored offsets
    pub group_id: String,
    /// Broker version assumed for clusters that cannot report it
    /// (`broker.version.fallback`)
    pub kafka_version: String,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// How long a fetch waits for the first record before returning empty
    pub poll_interval: Duration,
    /// Maximum records returned by one fetch
    pub max_batch: usize,
    /// Timeout for metadata, watermark and committed-offset requests
    pub request_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "protopeek".to_string(),
            kafka_version: "1.0.0".to_string(),
            session_timeout_ms: "6000".to_string(),
            poll_interval: Duration::from_millis(500),
            max_batch: 100,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ConsumerConfig {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("broker.version.fallback", &self.kafka_version)
            .set("session.timeout.ms", &self.session_timeout_ms)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            // Trimmed offsets must surface as errors so they can be re-positioned
            .set("auto.offset.reset", "error")
            .set("enable.partition.eof", "false");
        config
    }
}

/// Fetch consumer dedicated to one partition.
struct PartitionReader {
    consumer: StreamConsumer,
    /// Offset the next `recv` will return, `None` until assigned.
    position: tokio::sync::Mutex<Option<i64>>,
}

/// [`BrokerClient`] talking to a Kafka cluster through librdkafka.
pub struct KafkaBroker {
    config: ConsumerConfig,
    control: Arc<StreamConsumer>,
    readers: Mutex<HashMap<(String, i32), Arc<PartitionReader>>>,
}

impl KafkaBroker {
    pub fn new(config: ConsumerConfig) -> BrokerResult<Self> {
        let control: StreamConsumer = config.client_config().create()?;
        Ok(Self {
            config,
            control: Arc::new(control),
            readers: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    fn reader(&self, topic: &str, partition: i32) -> BrokerResult<Arc<PartitionReader>> {
        let mut readers = self
            .readers
            .lock()
            .map_err(|_| BrokerError::Unavailable("partition reader registry poisoned".into()))?;
        if let Some(reader) = readers.get(&(topic.to_string(), partition)) {
            return Ok(Arc::clone(reader));
        }
        let consumer: StreamConsumer = self.config.client_config().create()?;
        let reader = Arc::new(PartitionReader {
            consumer,
            position: tokio::sync::Mutex::new(None),
        });
        readers.insert((topic.to_string(), partition), Arc::clone(&reader));
        Ok(reader)
    }

    /// Run a blocking librdkafka call against the control consumer.
    async fn blocking<T, F>(&self, f: F) -> BrokerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&StreamConsumer, Duration) -> BrokerResult<T> + Send + 'static,
    {
        let control = Arc::clone(&self.control);
        let timeout = self.config.request_timeout;
        tokio::task::spawn_blocking(move || f(&control, timeout))
            .await
            .map_err(|e| BrokerError::Unavailable(format!("blocking Kafka call failed: {e}")))?
    }
}

fn classify(error: KafkaError, topic: &str, partition: i32, offset: i64) -> BrokerError {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::OffsetOutOfRange | RDKafkaErrorCode::AutoOffsetReset) => {
            BrokerError::OffsetOutOfRange {
                topic: topic.to_string(),
                partition,
                offset,
            }
        }
        Some(RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic) => {
            BrokerError::UnknownTopic(topic.to_string())
        }
        _ => BrokerError::Kafka(error),
    }
}

fn raw_record(msg: &BorrowedMessage<'_>) -> RawRecord {
    RawRecord {
        partition: msg.partition(),
        offset: msg.offset(),
        timestamp: msg.timestamp().to_millis().and_then(timestamp_from_millis),
        key: msg.key().map(<[u8]>::to_vec).unwrap_or_default(),
        value: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

#[async_trait]
impl BrokerClient for KafkaBroker {
    async fn partitions(&self, topic: &str) -> BrokerResult<Vec<i32>> {
        let name = topic.to_string();
        self.blocking(move |control, timeout| {
            let metadata = control.fetch_metadata(Some(name.as_str()), timeout)?;
            let entry = metadata
                .topics()
                .iter()
                .find(|t| t.name() == name)
                .ok_or_else(|| BrokerError::UnknownTopic(name.clone()))?;
            if let Some(err) = entry.error() {
                return Err(match RDKafkaErrorCode::from(err) {
                    RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
                        BrokerError::UnknownTopic(name.clone())
                    }
                    code => BrokerError::Unavailable(format!("metadata for {name}: {code}")),
                });
            }
            let mut ids: Vec<i32> = entry.partitions().iter().map(|p| p.id()).collect();
            ids.sort_unstable();
            Ok(ids)
        })
        .await
    }

    async fn watermarks(&self, topic: &str, partition: i32) -> BrokerResult<Watermarks> {
        let name = topic.to_string();
        self.blocking(move |control, timeout| {
            let (low, high) = control
                .fetch_watermarks(&name, partition, timeout)
                .map_err(|e| classify(e, &name, partition, -1))?;
            Ok(Watermarks { low, high })
        })
        .await
    }

    async fn stored_offset(&self, topic: &str, partition: i32) -> BrokerResult<Option<i64>> {
        let name = topic.to_string();
        self.blocking(move |control, timeout| {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition(&name, partition);
            let committed = control.committed_offsets(tpl, timeout)?;
            let offset = committed
                .find_partition(&name, partition)
                .map(|elem| elem.offset());
            Ok(match offset {
                Some(Offset::Offset(n)) if n >= 0 => Some(n),
                _ => None,
            })
        })
        .await
    }

    async fn store_offset(
        &self,
        topic: &str,
        partition: i32,
        next_offset: i64,
    ) -> BrokerResult<()> {
        let name = topic.to_string();
        self.blocking(move |control, _| {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition_offset(&name, partition, Offset::Offset(next_offset))?;
            control.commit(&tpl, CommitMode::Sync)?;
            Ok(())
        })
        .await
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
    ) -> BrokerResult<Vec<RawRecord>> {
        let reader = self.reader(topic, partition)?;
        let mut position = reader.position.lock().await;

        if *position != Some(from_offset) {
            debug!("Assigning {}/{} at offset {}", topic, partition, from_offset);
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition_offset(topic, partition, Offset::Offset(from_offset))?;
            reader.consumer.assign(&tpl)?;
            *position = Some(from_offset);
        }

        let mut records = Vec::new();
        match tokio::time::timeout(self.config.poll_interval, reader.consumer.recv()).await {
            Ok(Ok(msg)) => records.push(raw_record(&msg)),
            Ok(Err(e)) => {
                // Force a fresh assignment on the next fetch
                *position = None;
                return Err(classify(e, topic, partition, from_offset));
            }
            Err(_) => return Ok(records), // Timeout, no records available right now
        }

        // Try to fetch more with a short timeout
        while records.len() < self.config.max_batch {
            match tokio::time::timeout(Duration::from_millis(10), reader.consumer.recv()).await {
                Ok(Ok(msg)) => records.push(raw_record(&msg)),
                _ => break,
            }
        }

        if let Some(last) = records.last() {
            *position = Some(last.offset + 1);
        }
        Ok(records)
    }
}
