//! A client for one broker: `connect` / `disconnect` / `metadata` /
//! `create_topics` / `delete_topics` / `produce` / `api_versions` over a
//! single [`Messenger`] connection.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use tokio::io::BufStream;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::connection::Transport;
use crate::messenger::Messenger;
use crate::metadata::{ClusterMetadata, TopicError};
use crate::protocol::{
    api_key::ApiKey,
    api_version::ApiVersionRange,
    error::ErrorClass,
    messages::{
        CreateTopicConfig, CreateTopicRequest, CreateTopicsRequest, DeleteTopicsRequest,
        MetadataRequest, MetadataRequestTopic, ProduceRequest, ProduceRequestPartitionData,
        ProduceRequestTopicData, ReadVersionedType, RequestBody, WriteVersionedType,
    },
    primitives::{Array, Int16, Int32, NullableString, Records, String_},
    record::{
        Record as WireRecord, RecordBatch, RecordBatchTimestampType, RecordHeader,
    },
};
use crate::record::Record;

use super::{
    BrokerClientConfig,
    error::{Error, Result},
};

pub type MessengerTransport = Messenger<BufStream<TcpStream>>;

/// The durability level a producer requests before a write is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acks {
    /// Fire and forget; the broker sends no response at all.
    None,

    /// The partition leader has written the records to its local log.
    Leader,

    /// The full set of in-sync replicas has the records.
    #[default]
    All,
}

impl From<Acks> for Int16 {
    fn from(acks: Acks) -> Self {
        match acks {
            Acks::None => Self(0),
            Acks::Leader => Self(1),
            Acks::All => Self(-1),
        }
    }
}

/// A topic to create.
#[derive(Debug, Clone)]
pub struct TopicSpec {
    pub name: String,

    /// Partition count, or -1 for the broker default.
    pub num_partitions: i32,

    /// Replication factor, or -1 for the broker default.
    pub replication_factor: i16,

    /// Per-topic config entries (e.g. `retention.ms`).
    pub configs: Vec<TopicConfig>,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, num_partitions: i32, replication_factor: i16) -> Self {
        Self {
            name: name.into(),
            num_partitions,
            replication_factor,
            configs: vec![],
        }
    }
}

/// One topic configuration entry.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    pub name: String,
    pub value: Option<String>,
}

/// Result of [`BrokerClient::delete_topics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTopicsOutcome {
    /// Quota throttle applied by the broker, in milliseconds.
    pub throttle_time_ms: i32,

    /// Per-topic outcomes, one entry per requested topic.
    pub topic_errors: Vec<TopicError>,
}

/// Result of an acknowledged [`BrokerClient::produce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProduceOutcome {
    /// Offset assigned to the first record of the batch.
    pub base_offset: i64,

    /// Broker-side append time, or -1 for topics using create-time
    /// timestamps.
    pub log_append_time_ms: i64,

    /// Quota throttle applied by the broker, in milliseconds.
    pub throttle_time_ms: i32,
}

/// A client for a single broker.
///
/// The client owns at most one connection. It does not reconnect by itself:
/// when the connection is lost, requests fail until [`connect`] is called
/// again, typically by the connection pool that owns this client.
///
/// [`connect`]: BrokerClient::connect
pub struct BrokerClient {
    config: BrokerClientConfig,

    /// Current connection, if any.
    connection: Mutex<Option<Arc<MessengerTransport>>>,
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("address", &self.config.address)
            .finish_non_exhaustive()
    }
}

impl BrokerClient {
    pub fn new(config: BrokerClientConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    /// Open the connection and negotiate API versions.
    ///
    /// A no-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if connection.is_some() {
            debug!(address = %self.config.address, "already connected");
            return Ok(());
        }

        let stream = Transport::connect(&self.config.address, self.config.connect_timeout).await?;
        let messenger = Messenger::new(
            BufStream::new(stream),
            self.config.max_message_size,
            Arc::clone(&self.config.client_id),
        );

        match tokio::time::timeout(self.config.request_timeout, messenger.sync_versions()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    operation: "version sync",
                    timeout: self.config.request_timeout,
                });
            }
        }

        info!(address = %self.config.address, "connected");
        *connection = Some(Arc::new(messenger));
        Ok(())
    }

    /// Drop the connection, failing any requests still in flight on it.
    ///
    /// Safe to call when never connected.
    pub async fn disconnect(&self) {
        if self.connection.lock().await.take().is_some() {
            info!(address = %self.config.address, "disconnected");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// The version ranges negotiated with this broker at connect time.
    pub async fn api_versions(&self) -> Result<HashMap<ApiKey, ApiVersionRange>> {
        Ok(self.messenger().await?.version_ranges())
    }

    /// Request cluster metadata.
    ///
    /// `None` requests metadata for all topics; an explicit empty set
    /// requests metadata for none.
    pub async fn metadata(&self, topics: Option<Vec<String>>) -> Result<ClusterMetadata> {
        let request = MetadataRequest {
            topics: topics.map(|topics| {
                topics
                    .into_iter()
                    .map(|name| MetadataRequestTopic {
                        name: String_(name),
                    })
                    .collect()
            }),
            allow_auto_topic_creation: None,
        };

        let response = self.request("metadata", request).await?;
        Ok(response.into())
    }

    /// Create topics, one round trip for the whole set.
    ///
    /// Failures are per topic: an entry that cannot be created (e.g. it
    /// already exists) carries its own error and does not affect its
    /// siblings.
    pub async fn create_topics(
        &self,
        topics: Vec<TopicSpec>,
        timeout_ms: i32,
    ) -> Result<Vec<TopicError>> {
        let requested = topics.len();
        let request = CreateTopicsRequest {
            topics: topics
                .into_iter()
                .map(|spec| CreateTopicRequest {
                    name: String_(spec.name),
                    num_partitions: Int32(spec.num_partitions),
                    replication_factor: Int16(spec.replication_factor),
                    assignments: vec![],
                    configs: spec
                        .configs
                        .into_iter()
                        .map(|config| CreateTopicConfig {
                            name: String_(config.name),
                            value: NullableString(config.value),
                        })
                        .collect(),
                })
                .collect(),
            timeout_ms: Int32(timeout_ms),
            validate_only: None,
        };

        let response = self.request("create topics", request).await?;
        if response.topics.len() != requested {
            return Err(Error::InvalidResponse(format!(
                "Requested creation of {} topics but response covers {}",
                requested,
                response.topics.len(),
            )));
        }

        Ok(response
            .topics
            .into_iter()
            .map(|topic| TopicError {
                topic: topic.name.0,
                error: topic.error,
            })
            .collect())
    }

    /// Delete topics, one round trip for the whole set.
    ///
    /// Same partial-failure contract as [`create_topics`]: a topic unknown to
    /// the cluster yields an error for that entry only.
    ///
    /// [`create_topics`]: BrokerClient::create_topics
    pub async fn delete_topics(
        &self,
        topics: Vec<String>,
        timeout_ms: i32,
    ) -> Result<DeleteTopicsOutcome> {
        let request = DeleteTopicsRequest {
            topic_names: Array(Some(topics.into_iter().map(String_).collect())),
            timeout_ms: Int32(timeout_ms),
        };

        let response = self.request("delete topics", request).await?;

        Ok(DeleteTopicsOutcome {
            throttle_time_ms: response.throttle_time_ms.map(|t| t.0).unwrap_or_default(),
            topic_errors: response
                .responses
                .into_iter()
                .map(|topic| TopicError {
                    topic: topic.name.0,
                    error: topic.error,
                })
                .collect(),
        })
    }

    /// Produce one batch of records to a partition.
    ///
    /// With [`Acks::None`] the call returns `Ok(None)` as soon as the frame
    /// is written, without awaiting any response. Other levels await the
    /// broker and surface the per-partition error code as a classified
    /// server error.
    ///
    /// # Panics
    /// Panics when `records` is empty.
    pub async fn produce(
        &self,
        topic: &str,
        partition: i32,
        records: Vec<Record>,
        acks: Acks,
        timeout_ms: i32,
    ) -> Result<Option<ProduceOutcome>> {
        assert!(!records.is_empty(), "records must be non-empty");

        let request = ProduceRequest {
            transactional_id: NullableString(None),
            acks: acks.into(),
            timeout_ms: Int32(timeout_ms),
            topic_data: vec![ProduceRequestTopicData {
                name: String_(topic.to_owned()),
                partition_data: vec![ProduceRequestPartitionData {
                    index: Int32(partition),
                    records: Records(vec![build_record_batch(&records)]),
                }],
            }],
        };

        if matches!(acks, Acks::None) {
            self.messenger()
                .await?
                .send_unacknowledged(request)
                .await
                .map_err(Error::Request)?;
            return Ok(None);
        }

        let response = self.request("produce", request).await?;
        let throttle_time_ms = response.throttle_time_ms.0;

        if response.responses.len() != 1 {
            return Err(Error::InvalidResponse(format!(
                "Expected 1 topic in produce response but got {}",
                response.responses.len()
            )));
        }
        let topic_response = response
            .responses
            .into_iter()
            .next()
            .expect("length checked above");

        if topic_response.name.0 != topic {
            return Err(Error::InvalidResponse(format!(
                "Expected produce response for topic \"{topic}\" but got \"{}\"",
                topic_response.name.0
            )));
        }

        if topic_response.partition_responses.len() != 1 {
            return Err(Error::InvalidResponse(format!(
                "Expected 1 partition in produce response but got {}",
                topic_response.partition_responses.len()
            )));
        }
        let partition_response = topic_response
            .partition_responses
            .into_iter()
            .next()
            .expect("length checked above");

        if partition_response.index.0 != partition {
            return Err(Error::InvalidResponse(format!(
                "Expected produce response for partition {partition} but got {}",
                partition_response.index.0
            )));
        }

        if let Some(protocol_error) = partition_response.error {
            if matches!(protocol_error.default_class(), ErrorClass::Fatal) {
                // version/auth mismatch: nothing on this connection can be
                // trusted anymore
                self.disconnect().await;
            }
            return Err(Error::ServerError(
                protocol_error,
                format!("partition {partition} of topic \"{topic}\""),
            ));
        }

        Ok(Some(ProduceOutcome {
            base_offset: partition_response.base_offset.0,
            log_append_time_ms: partition_response
                .log_append_time_ms
                .map(|t| t.0)
                .unwrap_or(-1),
            throttle_time_ms,
        }))
    }

    async fn messenger(&self) -> Result<Arc<MessengerTransport>> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(Error::NotConnected)
    }

    async fn request<R>(&self, operation: &'static str, msg: R) -> Result<R::ResponseBody>
    where
        R: RequestBody + Send + WriteVersionedType<Vec<u8>>,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        let messenger = self.messenger().await?;

        match tokio::time::timeout(self.config.request_timeout, messenger.request(msg)).await {
            Ok(result) => result.map_err(Error::Request),
            // The waiter is cancelled; if a response still arrives for this
            // correlation id, the reader drops it.
            Err(_) => Err(Error::Timeout {
                operation,
                timeout: self.config.request_timeout,
            }),
        }
    }
}

/// Assemble the wire batch for a produce request.
///
/// Records are copied from the caller-facing representation; the input is
/// left untouched so a retry can assemble a fresh batch from the same
/// sequence.
fn build_record_batch(records: &[Record]) -> RecordBatch {
    let first_timestamp = records[0].timestamp.timestamp_millis();
    let mut max_timestamp = first_timestamp;

    let wire_records: Vec<WireRecord> = records
        .iter()
        .enumerate()
        .map(|(offset, record)| {
            let timestamp = record.timestamp.timestamp_millis();
            max_timestamp = max_timestamp.max(timestamp);

            WireRecord {
                timestamp_delta: timestamp - first_timestamp,
                offset_delta: offset as i32,
                key: record.key.clone(),
                value: record.value.clone(),
                headers: record
                    .headers
                    .iter()
                    .map(|(key, value)| RecordHeader {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            }
        })
        .collect();

    RecordBatch {
        base_offset: 0,
        partition_leader_epoch: -1,
        last_offset_delta: (wire_records.len() - 1) as i32,
        first_timestamp,
        max_timestamp,
        producer_id: -1,
        producer_epoch: -1,
        base_sequence: -1,
        records: wire_records,
        timestamp_type: RecordBatchTimestampType::CreateTime,
    }
}
