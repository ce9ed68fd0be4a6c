//! In-memory [`BrokerClient`] for tests.
//!
//! Topics are vectors of records per partition. Retention is simulated with
//! [`MemoryBroker::trim`], slow or failing brokers with
//! [`MemoryBroker::set_fetch_latency`] and [`MemoryBroker::fail_next_fetch`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::broker::{BrokerClient, BrokerResult, RawRecord, Watermarks};
use crate::error::BrokerError;

/// Failure injected into the next fetch of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    OffsetOutOfRange,
    Unavailable(String),
}

#[derive(Debug, Default)]
struct PartitionLog {
    /// First retained offset
    low: i64,
    /// Retained records, `records[i].offset == low + i`
    records: Vec<RawRecord>,
}

impl PartitionLog {
    fn high(&self) -> i64 {
        self.low + self.records.len() as i64
    }
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Vec<PartitionLog>>,
    stored: HashMap<(String, i32), i64>,
    latency: HashMap<String, Duration>,
    failures: HashMap<(String, i32), VecDeque<FetchFailure>>,
    fetches: HashMap<(String, i32), usize>,
    commits: HashMap<(String, i32), usize>,
}

pub struct MemoryBroker {
    state: Mutex<State>,
    poll_interval: Duration,
    max_batch: usize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            poll_interval: Duration::from_millis(20),
            max_batch: 10,
        }
    }

    /// Records returned per fetch at most.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// How long an empty fetch waits before returning.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_topic(&self, topic: &str, partitions: i32) {
        let logs = (0..partitions).map(|_| PartitionLog::default()).collect();
        self.lock().topics.insert(topic.to_string(), logs);
    }

    /// Append a record without key. Returns its offset.
    pub fn append(&self, topic: &str, partition: i32, value: Vec<u8>) -> i64 {
        self.append_with_key(topic, partition, Vec::new(), value)
    }

    /// Append a record. Returns its offset.
    ///
    /// Panics if the topic or partition was not created.
    pub fn append_with_key(&self, topic: &str, partition: i32, key: Vec<u8>, value: Vec<u8>) -> i64 {
        let mut state = self.lock();
        let log = state
            .topics
            .get_mut(topic)
            .and_then(|logs| logs.get_mut(partition as usize))
            .unwrap_or_else(|| panic!("no partition {topic}/{partition}"));
        let offset = log.high();
        log.records.push(RawRecord {
            partition,
            offset,
            timestamp: Some(Utc::now()),
            key,
            value,
        });
        offset
    }

    /// Drop every record below `new_low`, as retention would.
    pub fn trim(&self, topic: &str, partition: i32, new_low: i64) {
        let mut state = self.lock();
        if let Some(log) = state
            .topics
            .get_mut(topic)
            .and_then(|logs| logs.get_mut(partition as usize))
        {
            let new_low = new_low.clamp(log.low, log.high());
            let dropped = (new_low - log.low) as usize;
            log.records.drain(..dropped);
            log.low = new_low;
        }
    }

    pub fn set_stored_offset(&self, topic: &str, partition: i32, offset: i64) {
        self.lock()
            .stored
            .insert((topic.to_string(), partition), offset);
    }

    pub fn stored(&self, topic: &str, partition: i32) -> Option<i64> {
        self.lock()
            .stored
            .get(&(topic.to_string(), partition))
            .copied()
    }

    /// Delay applied to every fetch on `topic`.
    pub fn set_fetch_latency(&self, topic: &str, latency: Duration) {
        self.lock().latency.insert(topic.to_string(), latency);
    }

    pub fn fail_next_fetch(&self, topic: &str, partition: i32, failure: FetchFailure) {
        self.lock()
            .failures
            .entry((topic.to_string(), partition))
            .or_default()
            .push_back(failure);
    }

    /// Number of fetches issued against a partition so far.
    pub fn fetch_count(&self, topic: &str, partition: i32) -> usize {
        self.lock()
            .fetches
            .get(&(topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    /// Number of offset commits issued against a partition so far.
    pub fn commit_count(&self, topic: &str, partition: i32) -> usize {
        self.lock()
            .commits
            .get(&(topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    fn watermarks_of(&self, topic: &str, partition: i32) -> BrokerResult<Watermarks> {
        let state = self.lock();
        let log = partition_log(&state, topic, partition)?;
        Ok(Watermarks {
            low: log.low,
            high: log.high(),
        })
    }
}

fn partition_log<'a>(state: &'a State, topic: &str, partition: i32) -> BrokerResult<&'a PartitionLog> {
    state
        .topics
        .get(topic)
        .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?
        .get(partition as usize)
        .ok_or_else(|| BrokerError::Unavailable(format!("no partition {topic}/{partition}")))
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn partitions(&self, topic: &str) -> BrokerResult<Vec<i32>> {
        let state = self.lock();
        let logs = state
            .topics
            .get(topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        Ok((0..logs.len() as i32).collect())
    }

    async fn watermarks(&self, topic: &str, partition: i32) -> BrokerResult<Watermarks> {
        self.watermarks_of(topic, partition)
    }

    async fn stored_offset(&self, topic: &str, partition: i32) -> BrokerResult<Option<i64>> {
        Ok(self.stored(topic, partition))
    }

    async fn store_offset(
        &self,
        topic: &str,
        partition: i32,
        next_offset: i64,
    ) -> BrokerResult<()> {
        let mut state = self.lock();
        let key = (topic.to_string(), partition);
        *state.commits.entry(key.clone()).or_default() += 1;
        state.stored.insert(key, next_offset);
        Ok(())
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
    ) -> BrokerResult<Vec<RawRecord>> {
        let (latency, failure) = {
            let mut state = self.lock();
            let key = (topic.to_string(), partition);
            *state.fetches.entry(key.clone()).or_default() += 1;
            let failure = state.failures.get_mut(&key).and_then(VecDeque::pop_front);
            (state.latency.get(topic).copied(), failure)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(FetchFailure::OffsetOutOfRange) => {
                return Err(BrokerError::OffsetOutOfRange {
                    topic: topic.to_string(),
                    partition,
                    offset: from_offset,
                })
            }
            Some(FetchFailure::Unavailable(reason)) => {
                return Err(BrokerError::Unavailable(reason))
            }
            None => {}
        }

        let records: Vec<RawRecord> = {
            let state = self.lock();
            let log = partition_log(&state, topic, partition)?;
            if from_offset < log.low || from_offset > log.high() {
                return Err(BrokerError::OffsetOutOfRange {
                    topic: topic.to_string(),
                    partition,
                    offset: from_offset,
                });
            }
            let start = (from_offset - log.low) as usize;
            log.records[start..]
                .iter()
                .take(self.max_batch)
                .cloned()
                .collect()
        };

        if records.is_empty() {
            // Nothing new: behave like a broker long poll
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(records)
    }
}
