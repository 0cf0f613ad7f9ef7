//! The producer publish pipeline.
//!
//! Records sent through a [`ProducerPipeline`] are grouped by destination
//! (topic, partition) into batches. A batch leaves when it is full (bytes or
//! record count) or when the linger timer of its first record expires,
//! whichever comes first.
//!
//! Ordering: every (topic, partition) has at most one batch in flight. A
//! later batch for the same partition waits until the earlier one resolves,
//! including through all of its retries, so per-partition record order
//! survives leader changes. Batches for different partitions proceed
//! independently, and nothing in the retry path takes a lock that spans
//! topics: a topic being deleted only ever fails its own batches.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, error, warn};

use crate::backoff::Backoff;
use crate::metadata::ClusterMetadata;
use crate::protocol::error::{Error as ProtocolError, ErrorClass};
use crate::record::Record;
use crate::throttle::throttle_duration;

use super::{
    ProducerConfig,
    broker::ProduceOutcome,
    error::Error as ClientError,
    metadata_cache::MetadataCache,
    partitioner::PartitionSelector,
    pool::BrokerProvider,
};

/// Error returned by [`ProducerPipeline::send`].
#[derive(Debug, Error, Clone)]
pub enum ProduceError {
    /// A retriable failure persisted through every allowed attempt; this is
    /// the last error observed.
    #[error("Produce failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        attempts: usize,
        last_error: Arc<ClientError>,
    },

    /// A permanent or fatal failure, surfaced without retry.
    #[error("Client error: {0}")]
    Client(#[from] Arc<ClientError>),

    /// The pipeline has been closed.
    #[error("Producer pipeline is closed")]
    Closed,

    /// The flush machinery resolved without reporting a result.
    #[error("Batch flush failed: {0}")]
    Flush(String),
}

pub type Result<T, E = ProduceError> = std::result::Result<T, E>;

/// A record addressed to a topic, with an optional explicit partition.
#[derive(Debug, Clone)]
pub struct ProducerRecord {
    pub topic: String,

    /// Explicit destination partition; when absent the pipeline selects one
    /// from the record key or round robin.
    pub partition: Option<i32>,

    pub record: Record,
}

impl ProducerRecord {
    pub fn new(topic: impl Into<String>, record: Record) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            record,
        }
    }

    pub fn to_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }
}

type SendResult = Result<i64>;

#[derive(Default)]
struct SlotQueue {
    records: Vec<Record>,
    bytes: usize,
    waiters: Vec<oneshot::Sender<SendResult>>,

    /// Bumped on every drain. A linger task only flushes the batch it was
    /// armed for; when the epoch moved on, a size-triggered flush already
    /// took that batch and the linger is spurious.
    epoch: u64,
}

/// Per-(topic, partition) state.
struct PartitionSlot {
    topic: String,
    partition: i32,

    /// Records accumulating for the next batch.
    queue: Mutex<SlotQueue>,

    /// Held for the full produce+retry of one batch. This is what serializes
    /// batches per partition: drains happen under the gate, in order, and
    /// the next batch cannot leave before the previous one resolved.
    flush_gate: AsyncMutex<()>,
}

enum FlushTrigger {
    /// The batch hit a size threshold; flush right away.
    Now,

    /// First record of a fresh batch; flush after the linger expires.
    Linger { epoch: u64 },

    /// Someone else is already responsible for this batch.
    None,
}

struct PipelineInner {
    provider: Arc<dyn BrokerProvider>,
    config: ProducerConfig,
    metadata: MetadataCache,
    selector: PartitionSelector,
    slots: Mutex<HashMap<(String, i32), Arc<PartitionSlot>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for PipelineInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineInner")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Multi-topic batching producer with at-least-once delivery.
#[derive(Debug)]
pub struct ProducerPipeline {
    inner: Arc<PipelineInner>,
}

impl ProducerPipeline {
    pub fn new(provider: Arc<dyn BrokerProvider>, config: ProducerConfig) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                provider,
                config,
                metadata: MetadataCache::default(),
                selector: PartitionSelector::default(),
                slots: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Send one record, returning its assigned offset once the containing
    /// batch is acknowledged.
    ///
    /// The record is copied into the pipeline; the caller keeps nothing the
    /// retry path depends on. With acks=0 the returned offset is -1, as no
    /// acknowledgement ever carries one.
    pub async fn send(&self, item: ProducerRecord) -> Result<i64> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(ProduceError::Closed);
        }

        // Resolve destination before queueing; an unknown topic or invalid
        // explicit partition fails the send, not the batch.
        let metadata = inner.topic_metadata(&item.topic).await.map_err(Arc::new)?;
        let topic = metadata
            .topic(&item.topic)
            .ok_or_else(|| Arc::new(unknown_topic(&item.topic)))?;
        let partition = inner
            .selector
            .select(topic, item.partition, item.record.key.as_deref())
            .map_err(|e| Arc::new(ClientError::from(e)))?;

        let slot = inner.slot(&item.topic, partition);
        let (rx, trigger) = {
            let mut queue = slot.queue.lock();
            let (tx, rx) = oneshot::channel();

            queue.bytes += item.record.approximate_size();
            queue.records.push(item.record);
            queue.waiters.push(tx);

            let trigger = if queue.records.len() >= inner.config.max_batch_records
                || queue.bytes >= inner.config.max_batch_bytes
            {
                FlushTrigger::Now
            } else if queue.records.len() == 1 {
                FlushTrigger::Linger { epoch: queue.epoch }
            } else {
                FlushTrigger::None
            };
            (rx, trigger)
        };

        match trigger {
            FlushTrigger::Now => {
                debug!(topic = %slot.topic, partition, "batch full, flushing");
                let inner = Arc::clone(inner);
                let slot = Arc::clone(&slot);
                tokio::spawn(async move {
                    inner.flush_slot(&slot, None).await;
                });
            }
            FlushTrigger::Linger { epoch } => {
                let inner = Arc::clone(inner);
                let slot = Arc::clone(&slot);
                let linger = inner.config.linger;
                tokio::spawn(async move {
                    tokio::time::sleep(linger).await;
                    inner.flush_slot(&slot, Some(epoch)).await;
                });
            }
            FlushTrigger::None => {}
        }

        rx.await
            .map_err(|_| ProduceError::Flush("flush task dropped without result".to_owned()))?
    }

    /// Flush all pending batches and wait for them to resolve.
    ///
    /// Individual outcomes (including failures) are reported through the
    /// corresponding [`send`](Self::send) calls.
    pub async fn flush(&self) {
        let slots: Vec<Arc<PartitionSlot>> =
            self.inner.slots.lock().values().map(Arc::clone).collect();

        debug!(slots = slots.len(), "manual flush");
        let flushes = slots
            .iter()
            .map(|slot| self.inner.flush_slot(slot, None));
        futures::future::join_all(flushes).await;
    }

    /// Flush everything and reject subsequent sends.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.flush().await;
    }
}

impl PipelineInner {
    fn slot(&self, topic: &str, partition: i32) -> Arc<PartitionSlot> {
        let mut slots = self.slots.lock();
        let slot = slots
            .entry((topic.to_owned(), partition))
            .or_insert_with(|| {
                Arc::new(PartitionSlot {
                    topic: topic.to_owned(),
                    partition,
                    queue: Mutex::new(SlotQueue::default()),
                    flush_gate: AsyncMutex::new(()),
                })
            });
        Arc::clone(slot)
    }

    /// The current topology, refreshed when the cached snapshot is stale or
    /// does not know `topic`.
    async fn topic_metadata(&self, topic: &str) -> Result<Arc<ClusterMetadata>, ClientError> {
        if let Some(metadata) = self.metadata.get(self.config.metadata_max_age) {
            if metadata.topic(topic).is_some() {
                return Ok(metadata);
            }
            debug!(topic, "cached metadata does not know topic, refreshing");
        }

        let broker = self.provider.any().await?;
        let fresh = broker.metadata(None).await?;
        Ok(self.metadata.update(fresh))
    }

    /// Drain and produce one batch for `slot`.
    ///
    /// With `expected_epoch` set this is a linger-driven flush and becomes a
    /// no-op if the armed batch already left.
    async fn flush_slot(&self, slot: &PartitionSlot, expected_epoch: Option<u64>) {
        let _gate = slot.flush_gate.lock().await;

        let (records, waiters) = {
            let mut queue = slot.queue.lock();

            if let Some(epoch) = expected_epoch {
                if queue.epoch != epoch {
                    debug!(topic = %slot.topic, partition = slot.partition, "spurious linger flush");
                    return;
                }
            }
            if queue.records.is_empty() {
                return;
            }

            queue.epoch = queue.epoch.wrapping_add(1);
            queue.bytes = 0;
            (
                std::mem::take(&mut queue.records),
                std::mem::take(&mut queue.waiters),
            )
        };

        match self.produce_with_retry(slot, &records).await {
            Ok(outcome) => {
                // acks=0 carries no offsets
                let base_offset = outcome.as_ref().map(|o| o.base_offset).unwrap_or(-1);
                for (index, waiter) in waiters.into_iter().enumerate() {
                    let offset = if base_offset < 0 {
                        -1
                    } else {
                        base_offset + index as i64
                    };
                    waiter.send(Ok(offset)).ok();
                }

                if let Some(delay) = outcome.and_then(|o| throttle_duration(o.throttle_time_ms)) {
                    // keep the gate while waiting out the quota so the next
                    // batch for this partition does not pile on
                    warn!(
                        topic = %slot.topic,
                        partition = slot.partition,
                        ?delay,
                        "broker throttled produce"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                error!(
                    topic = %slot.topic,
                    partition = slot.partition,
                    error = %e,
                    "failed to produce batch"
                );
                for waiter in waiters {
                    waiter.send(Err(e.clone())).ok();
                }
            }
        }
    }

    async fn produce_with_retry(
        &self,
        slot: &PartitionSlot,
        records: &[Record],
    ) -> Result<Option<ProduceOutcome>> {
        let retry = &self.config.retry;
        let mut backoff = Backoff::new(&retry.backoff);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let error = match self.produce_once(slot, records).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };

            match error.class(&retry.classifier) {
                ErrorClass::Retriable if attempts < retry.max_attempts => {
                    // the leader may have moved or the topic may be mid
                    // (re-)creation; re-resolve the topology first
                    self.metadata.invalidate();
                    let delay = backoff.next();
                    warn!(
                        topic = %slot.topic,
                        partition = slot.partition,
                        attempts,
                        ?delay,
                        error = %error,
                        "retriable produce error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                ErrorClass::Retriable => {
                    return Err(ProduceError::Exhausted {
                        attempts,
                        last_error: Arc::new(error),
                    });
                }
                ErrorClass::Permanent | ErrorClass::Fatal => {
                    return Err(ProduceError::Client(Arc::new(error)));
                }
            }
        }
    }

    /// One produce attempt: resolve the leader, obtain its connection from
    /// the pool, and issue the batch.
    ///
    /// The same record sequence is handed to the broker client on every
    /// attempt; the wire batch is rebuilt there, records are never mutated.
    async fn produce_once(
        &self,
        slot: &PartitionSlot,
        records: &[Record],
    ) -> Result<Option<ProduceOutcome>, ClientError> {
        let metadata = self.topic_metadata(&slot.topic).await?;
        let topic = metadata
            .topic(&slot.topic)
            .ok_or_else(|| unknown_topic(&slot.topic))?;
        let partition = topic.partition(slot.partition).ok_or_else(|| {
            ClientError::ServerError(
                ProtocolError::UnknownTopicOrPartition,
                format!(
                    "partition {} of topic \"{}\" is not in cluster metadata",
                    slot.partition, slot.topic
                ),
            )
        })?;

        if !partition.has_leader() {
            let e = partition.error.unwrap_or(ProtocolError::LeaderNotAvailable);
            return Err(ClientError::ServerError(
                e,
                format!(
                    "no leader for partition {} of topic \"{}\"",
                    slot.partition, slot.topic
                ),
            ));
        }

        let node = metadata.broker(partition.leader_id).ok_or_else(|| {
            ClientError::ServerError(
                ProtocolError::LeaderNotAvailable,
                format!(
                    "leader {} of partition {} of topic \"{}\" is not in the broker list",
                    partition.leader_id, slot.partition, slot.topic
                ),
            )
        })?;

        let broker = self.provider.node(node).await?;
        let result = broker
            .produce(
                &slot.topic,
                slot.partition,
                records.to_vec(),
                self.config.acks,
                self.config.produce_timeout_ms,
            )
            .await;

        if let Err(e) = &result {
            if connection_lost(e) {
                self.provider.invalidate(node.node_id).await;
            }
        }

        result
    }
}

fn connection_lost(e: &ClientError) -> bool {
    match e {
        ClientError::Request(e) => e.is_connection_lost(),
        ClientError::Connect(_) | ClientError::NotConnected | ClientError::Timeout { .. } => true,
        _ => false,
    }
}

fn unknown_topic(topic: &str) -> ClientError {
    ClientError::ServerError(
        ProtocolError::UnknownTopicOrPartition,
        format!("topic \"{topic}\" is not in cluster metadata"),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures::stream::{FuturesOrdered, StreamExt};

    use crate::backoff::BackoffConfig;
    use crate::client::RetryConfig;
    use crate::client::broker::Acks;
    use crate::client::pool::BrokerApi;
    use crate::metadata::{BrokerNode, PartitionMetadata, TopicMetadata};

    use super::*;

    #[derive(Debug, Default)]
    struct MockState {
        /// topic name -> partition count
        topics: Vec<(String, i32)>,
        next_offset: i64,
        batches: Vec<Vec<Record>>,
        produce_errors: VecDeque<ProtocolError>,
        metadata_calls: usize,
    }

    #[derive(Debug)]
    struct MockCluster {
        state: Arc<Mutex<MockState>>,
    }

    impl MockCluster {
        fn new(topics: &[(&str, i32)]) -> Self {
            Self {
                state: Arc::new(Mutex::new(MockState {
                    topics: topics
                        .iter()
                        .map(|(name, partitions)| ((*name).to_owned(), *partitions))
                        .collect(),
                    ..Default::default()
                })),
            }
        }

        fn node() -> BrokerNode {
            BrokerNode {
                node_id: 1,
                host: "mock".to_owned(),
                port: 9092,
            }
        }
    }

    #[async_trait]
    impl BrokerApi for MockCluster {
        async fn metadata(
            &self,
            _topics: Option<Vec<String>>,
        ) -> Result<ClusterMetadata, ClientError> {
            let mut state = self.state.lock();
            state.metadata_calls += 1;
            Ok(ClusterMetadata {
                brokers: vec![Self::node()],
                controller_id: Some(1),
                topics: state
                    .topics
                    .iter()
                    .map(|(name, partitions)| TopicMetadata {
                        name: name.clone(),
                        error: None,
                        partitions: (0..*partitions)
                            .map(|partition_id| PartitionMetadata {
                                partition_id,
                                leader_id: 1,
                                replica_nodes: vec![1],
                                error: None,
                            })
                            .collect(),
                    })
                    .collect(),
            })
        }

        async fn produce(
            &self,
            topic: &str,
            partition: i32,
            records: Vec<Record>,
            _acks: Acks,
            _timeout_ms: i32,
        ) -> Result<Option<ProduceOutcome>, ClientError> {
            let mut state = self.state.lock();

            if let Some(e) = state.produce_errors.pop_front() {
                return Err(ClientError::ServerError(
                    e,
                    format!("partition {partition} of topic \"{topic}\""),
                ));
            }

            let base_offset = state.next_offset;
            state.next_offset += records.len() as i64;
            state.batches.push(records);
            Ok(Some(ProduceOutcome {
                base_offset,
                log_append_time_ms: -1,
                throttle_time_ms: 0,
            }))
        }
    }

    #[derive(Debug)]
    struct MockProvider {
        cluster: Arc<MockCluster>,
    }

    #[async_trait]
    impl crate::client::pool::BrokerProvider for MockProvider {
        async fn any(&self) -> Result<Arc<dyn BrokerApi>, ClientError> {
            Ok(Arc::clone(&self.cluster) as Arc<dyn BrokerApi>)
        }

        async fn node(&self, _node: &BrokerNode) -> Result<Arc<dyn BrokerApi>, ClientError> {
            Ok(Arc::clone(&self.cluster) as Arc<dyn BrokerApi>)
        }

        async fn invalidate(&self, _node_id: i32) {}
    }

    fn record(value: &[u8]) -> Record {
        Record {
            key: None,
            value: value.to_vec(),
            headers: BTreeMap::new(),
            timestamp: Utc.timestamp_millis_opt(1_600_000_000_000).unwrap(),
        }
    }

    fn pipeline(cluster: &Arc<MockCluster>, config: ProducerConfig) -> ProducerPipeline {
        ProducerPipeline::new(
            Arc::new(MockProvider {
                cluster: Arc::clone(cluster),
            }),
            config,
        )
    }

    fn fast_retry(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff: BackoffConfig {
                init_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(10),
                base: 2.,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_linger_batches_sends() {
        let cluster = Arc::new(MockCluster::new(&[("t", 1)]));
        let producer = pipeline(
            &cluster,
            ProducerConfig {
                linger: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let mut futures = FuturesOrdered::new();
        futures.push_back(producer.send(ProducerRecord::new("t", record(b"r1"))));
        futures.push_back(producer.send(ProducerRecord::new("t", record(b"r2"))));

        assert_eq!(futures.next().await.unwrap().unwrap(), 0);
        assert_eq!(futures.next().await.unwrap().unwrap(), 1);

        // both records travelled in one batch
        let state = cluster.state.lock();
        assert_eq!(state.batches.len(), 1);
        assert_eq!(state.batches[0].len(), 2);
    }

    #[tokio::test]
    async fn test_size_threshold_flushes_before_linger() {
        let cluster = Arc::new(MockCluster::new(&[("t", 1)]));
        let producer = pipeline(
            &cluster,
            ProducerConfig {
                // the linger alone would stall the test
                linger: Duration::from_secs(3600),
                max_batch_records: 2,
                ..Default::default()
            },
        );

        let mut futures = FuturesOrdered::new();
        futures.push_back(producer.send(ProducerRecord::new("t", record(b"r1"))));
        futures.push_back(producer.send(ProducerRecord::new("t", record(b"r2"))));

        let offsets: Vec<i64> = futures.map(|r| r.unwrap()).collect().await;
        assert_eq!(offsets, vec![0, 1]);
        assert_eq!(cluster.state.lock().batches.len(), 1);
    }

    #[tokio::test]
    async fn test_retriable_error_is_retried_in_order() {
        let cluster = Arc::new(MockCluster::new(&[("t", 1)]));
        cluster
            .state
            .lock()
            .produce_errors
            .push_back(ProtocolError::NotLeaderOrFollower);

        let producer = pipeline(
            &cluster,
            ProducerConfig {
                linger: Duration::from_millis(1),
                retry: fast_retry(5),
                ..Default::default()
            },
        );

        // first batch hits the injected error and is retried
        let offset = producer
            .send(ProducerRecord::new("t", record(b"r1")))
            .await
            .unwrap();
        assert_eq!(offset, 0);

        // later batches still work and stay ordered after the earlier one
        let offset = producer
            .send(ProducerRecord::new("t", record(b"r2")))
            .await
            .unwrap();
        assert_eq!(offset, 1);

        let state = cluster.state.lock();
        let values: Vec<&[u8]> = state
            .batches
            .iter()
            .flatten()
            .map(|r| r.value.as_slice())
            .collect();
        assert_eq!(values, vec![b"r1".as_slice(), b"r2".as_slice()]);
        // initial resolve + post-error refresh
        assert!(state.metadata_calls >= 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_attempts_and_last_error() {
        let cluster = Arc::new(MockCluster::new(&[("t", 1)]));
        {
            let mut state = cluster.state.lock();
            for _ in 0..10 {
                state.produce_errors.push_back(ProtocolError::LeaderNotAvailable);
            }
        }

        let producer = pipeline(
            &cluster,
            ProducerConfig {
                linger: Duration::from_millis(1),
                retry: fast_retry(3),
                ..Default::default()
            },
        );

        let err = producer
            .send(ProducerRecord::new("t", record(b"r1")))
            .await
            .unwrap_err();
        match err {
            ProduceError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(
                    *last_error,
                    ClientError::ServerError(ProtocolError::LeaderNotAvailable, _)
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(cluster.state.lock().batches.is_empty());
    }

    #[tokio::test]
    async fn test_permanent_error_fails_without_retry() {
        let cluster = Arc::new(MockCluster::new(&[("t", 1)]));
        cluster
            .state
            .lock()
            .produce_errors
            .push_back(ProtocolError::MessageTooLarge);

        let producer = pipeline(
            &cluster,
            ProducerConfig {
                linger: Duration::from_millis(1),
                retry: fast_retry(5),
                ..Default::default()
            },
        );

        let err = producer
            .send(ProducerRecord::new("t", record(b"r1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProduceError::Client(_)));

        // the injected error was consumed exactly once: no retries happened
        let state = cluster.state.lock();
        assert!(state.produce_errors.is_empty());
        assert!(state.batches.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_topic_fails_send() {
        let cluster = Arc::new(MockCluster::new(&[("t", 1)]));
        let producer = pipeline(&cluster, ProducerConfig::default());

        let err = producer
            .send(ProducerRecord::new("nope", record(b"r1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProduceError::Client(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_explicit_partition_is_validated() {
        let cluster = Arc::new(MockCluster::new(&[("t", 2)]));
        let producer = pipeline(&cluster, ProducerConfig::default());

        let err = producer
            .send(ProducerRecord::new("t", record(b"r1")).to_partition(7))
            .await
            .unwrap_err();
        assert!(matches!(err, ProduceError::Client(_)));
    }

    #[tokio::test]
    async fn test_closed_rejects_sends() {
        let cluster = Arc::new(MockCluster::new(&[("t", 1)]));
        let producer = pipeline(&cluster, ProducerConfig::default());

        producer.close().await;

        let err = producer
            .send(ProducerRecord::new("t", record(b"r1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProduceError::Closed));
    }

    #[tokio::test]
    async fn test_manual_flush_releases_lingering_batch() {
        let cluster = Arc::new(MockCluster::new(&[("t", 1)]));
        let producer = Arc::new(pipeline(
            &cluster,
            ProducerConfig {
                linger: Duration::from_secs(3600),
                ..Default::default()
            },
        ));

        let send = tokio::spawn({
            let producer = Arc::clone(&producer);
            async move {
                producer
                    .send(ProducerRecord::new("t", record(b"r1")))
                    .await
            }
        });

        // wait until the record is queued, then force it out
        tokio::time::sleep(Duration::from_millis(50)).await;
        producer.flush().await;

        assert_eq!(send.await.unwrap().unwrap(), 0);
    }
}
