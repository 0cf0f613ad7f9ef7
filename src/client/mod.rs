//! The public client surface: a per-broker [`BrokerClient`], the
//! [`BrokerProvider`](pool::BrokerProvider) seam to a connection pool, and the
//! [`ProducerPipeline`](producer::ProducerPipeline) built on top.

use std::sync::Arc;
use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::build_info::DEFAULT_CLIENT_ID;

pub mod broker;
pub mod error;
pub mod metadata_cache;
pub mod partitioner;
pub mod pool;
pub mod producer;

pub use broker::{Acks, BrokerClient, DeleteTopicsOutcome, ProduceOutcome, TopicConfig, TopicSpec};
pub use error::{Error, ErrorClassifier, Result};

/// Configuration for a [`BrokerClient`].
///
/// Explicit construction, no ambient defaults: everything a connection needs
/// travels with this struct.
#[derive(Debug, Clone)]
pub struct BrokerClientConfig {
    /// `host:port` of the broker.
    pub address: String,

    /// Client ID attached to every request.
    pub client_id: Arc<str>,

    /// Bound on transport establishment.
    pub connect_timeout: Duration,

    /// Bound on any single awaited request/response round trip.
    pub request_timeout: Duration,

    /// Upper size limit for incoming frames.
    pub max_message_size: usize,
}

impl BrokerClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            client_id: Arc::from(DEFAULT_CLIENT_ID),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_message_size: 100 * 1024 * 1024,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<Arc<str>>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

/// Retry policy for operations that handle transient cluster errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts (first try included) before giving up.
    pub max_attempts: usize,

    /// Exponential backoff between attempts.
    pub backoff: BackoffConfig,

    /// Maps broker error codes to retry classes.
    pub classifier: ErrorClassifier,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffConfig::default(),
            classifier: ErrorClassifier::default(),
        }
    }
}

/// Configuration for the [`producer::ProducerPipeline`].
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// How long the first record of a batch may wait for company before the
    /// batch is flushed.
    ///
    /// This is the latency/throughput trade-off knob: zero flushes every
    /// record on its own, larger values fill batches.
    pub linger: Duration,

    /// Flush a batch once its accumulated record payload reaches this size.
    pub max_batch_bytes: usize,

    /// Flush a batch once it holds this many records.
    pub max_batch_records: usize,

    /// Durability level requested from the cluster.
    pub acks: Acks,

    /// Broker-side produce timeout, forwarded on the wire.
    pub produce_timeout_ms: i32,

    /// How old a cached metadata snapshot may be before a send re-resolves
    /// the topology.
    pub metadata_max_age: Duration,

    /// Retry policy for retriable produce failures.
    pub retry: RetryConfig,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            linger: Duration::from_millis(5),
            max_batch_bytes: 512 * 1024,
            max_batch_records: 1_000,
            acks: Acks::default(),
            produce_timeout_ms: 30_000,
            metadata_max_age: Duration::from_secs(60),
            retry: RetryConfig::default(),
        }
    }
}
