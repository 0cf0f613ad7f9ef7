//! Seams between the producer pipeline and the connection pool.
//!
//! Pooling strategy (load balancing, reconnect policy, connection reuse
//! across pipelines) is an external concern; the pipeline only ever asks for
//! "some connected broker" or "a connected client for this node".
//! [`DirectBrokerProvider`] is the minimal bundled implementation: one cached
//! client per node, dialed on demand.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::metadata::{BrokerNode, ClusterMetadata};
use crate::record::Record;

use super::{
    BrokerClientConfig,
    broker::{Acks, BrokerClient, ProduceOutcome},
    error::Result,
};

/// The subset of broker operations the producer pipeline consumes.
#[async_trait]
pub trait BrokerApi: Send + Sync + std::fmt::Debug {
    /// Request cluster metadata; `None` means all topics.
    async fn metadata(&self, topics: Option<Vec<String>>) -> Result<ClusterMetadata>;

    /// Produce one batch of records to a partition.
    async fn produce(
        &self,
        topic: &str,
        partition: i32,
        records: Vec<Record>,
        acks: Acks,
        timeout_ms: i32,
    ) -> Result<Option<ProduceOutcome>>;
}

#[async_trait]
impl BrokerApi for BrokerClient {
    async fn metadata(&self, topics: Option<Vec<String>>) -> Result<ClusterMetadata> {
        Self::metadata(self, topics).await
    }

    async fn produce(
        &self,
        topic: &str,
        partition: i32,
        records: Vec<Record>,
        acks: Acks,
        timeout_ms: i32,
    ) -> Result<Option<ProduceOutcome>> {
        Self::produce(self, topic, partition, records, acks, timeout_ms).await
    }
}

/// Supplies already-connected brokers to the producer pipeline.
#[async_trait]
pub trait BrokerProvider: Send + Sync + std::fmt::Debug {
    /// Some connected broker, suitable for metadata queries.
    async fn any(&self) -> Result<Arc<dyn BrokerApi>>;

    /// A connected client for the given cluster node.
    async fn node(&self, node: &BrokerNode) -> Result<Arc<dyn BrokerApi>>;

    /// Drop whatever is cached for `node_id`; the next [`node`] call
    /// establishes a fresh connection.
    ///
    /// [`node`]: BrokerProvider::node
    async fn invalidate(&self, node_id: i32);
}

/// A [`BrokerProvider`] that dials brokers directly and caches one client per
/// node.
#[derive(Debug)]
pub struct DirectBrokerProvider {
    /// Template config; `address` is the bootstrap address used by
    /// [`BrokerProvider::any`].
    config: BrokerClientConfig,

    bootstrap: Mutex<Option<Arc<BrokerClient>>>,

    by_node: Mutex<HashMap<i32, Arc<BrokerClient>>>,
}

impl DirectBrokerProvider {
    /// `config.address` is the bootstrap broker.
    pub fn new(config: BrokerClientConfig) -> Self {
        Self {
            config,
            bootstrap: Mutex::new(None),
            by_node: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BrokerProvider for DirectBrokerProvider {
    async fn any(&self) -> Result<Arc<dyn BrokerApi>> {
        let mut bootstrap = self.bootstrap.lock().await;
        if let Some(client) = bootstrap.as_ref() {
            return Ok(Arc::clone(client) as Arc<dyn BrokerApi>);
        }

        let client = Arc::new(BrokerClient::new(self.config.clone()));
        client.connect().await?;
        *bootstrap = Some(Arc::clone(&client));
        Ok(client)
    }

    async fn node(&self, node: &BrokerNode) -> Result<Arc<dyn BrokerApi>> {
        let mut by_node = self.by_node.lock().await;
        if let Some(client) = by_node.get(&node.node_id) {
            return Ok(Arc::clone(client) as Arc<dyn BrokerApi>);
        }

        let config = BrokerClientConfig {
            address: node.address(),
            ..self.config.clone()
        };
        let client = Arc::new(BrokerClient::new(config));
        client.connect().await?;
        by_node.insert(node.node_id, Arc::clone(&client));
        Ok(client)
    }

    async fn invalidate(&self, node_id: i32) {
        debug!(node_id, "invalidating cached broker client");
        if let Some(client) = self.by_node.lock().await.remove(&node_id) {
            client.disconnect().await;
        }
    }
}
