//! Cluster-wide topology as reported by a metadata response.
//!
//! A [`ClusterMetadata`] is an immutable snapshot: it is built wholesale from
//! one response and replaced wholesale on refresh, never patched in place.
//! Staleness is expected — a leader id may point at a broker that has since
//! left, and consumers of this type must treat lookups as hints to be
//! re-validated through the error path, not as truth.

use crate::protocol::{
    error::Error as ApiError,
    messages::MetadataResponse,
};

/// Sentinel leader id for a partition that currently has no leader.
pub const NO_LEADER: i32 = -1;

/// One cluster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerNode {
    /// The broker ID.
    pub node_id: i32,

    /// The broker hostname.
    pub host: String,

    /// The broker port.
    pub port: i32,
}

impl BrokerNode {
    /// `host:port` form suitable for a transport connect.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for BrokerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Metadata container for the entire cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterMetadata {
    /// Brokers.
    pub brokers: Vec<BrokerNode>,

    /// The ID of the controller broker, if the response version carried one.
    pub controller_id: Option<i32>,

    /// Topics.
    pub topics: Vec<TopicMetadata>,
}

impl ClusterMetadata {
    /// Look up a broker by node id.
    pub fn broker(&self, node_id: i32) -> Option<&BrokerNode> {
        self.brokers.iter().find(|b| b.node_id == node_id)
    }

    /// Look up a topic by name.
    pub fn topic(&self, name: &str) -> Option<&TopicMetadata> {
        self.topics.iter().find(|t| t.name == name)
    }

    /// The controller broker, if it is known and present in the broker list.
    pub fn controller(&self) -> Option<&BrokerNode> {
        self.broker(self.controller_id?)
    }
}

/// Metadata for a certain topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    /// The topic name.
    pub name: String,

    /// Topic-level error (e.g. the topic is mid-creation).
    pub error: Option<ApiError>,

    /// Each partition in the topic.
    ///
    /// Partition ids are carried explicitly by each entry; position in this
    /// vector is meaningless.
    pub partitions: Vec<PartitionMetadata>,
}

impl TopicMetadata {
    /// Look up a partition by id.
    pub fn partition(&self, partition_id: i32) -> Option<&PartitionMetadata> {
        self.partitions.iter().find(|p| p.partition_id == partition_id)
    }
}

/// Metadata for a certain partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMetadata {
    /// The partition id.
    pub partition_id: i32,

    /// The ID of the leader broker, or [`NO_LEADER`].
    pub leader_id: i32,

    /// The set of all nodes that host this partition.
    pub replica_nodes: Vec<i32>,

    /// Partition-level error (e.g. leaderless during an election).
    pub error: Option<ApiError>,
}

impl PartitionMetadata {
    /// Whether the partition currently has a leader.
    pub fn has_leader(&self) -> bool {
        self.leader_id != NO_LEADER
    }
}

impl From<MetadataResponse> for ClusterMetadata {
    fn from(response: MetadataResponse) -> Self {
        Self {
            brokers: response
                .brokers
                .into_iter()
                .map(|b| BrokerNode {
                    node_id: b.node_id.0,
                    host: b.host.0,
                    port: b.port.0,
                })
                .collect(),
            controller_id: response.controller_id.map(|id| id.0),
            topics: response
                .topics
                .into_iter()
                .map(|t| TopicMetadata {
                    name: t.name.0,
                    error: t.error,
                    partitions: t
                        .partitions
                        .into_iter()
                        .map(|p| PartitionMetadata {
                            partition_id: p.partition_index.0,
                            leader_id: p.leader_id.0,
                            replica_nodes: p
                                .replica_nodes
                                .0
                                .unwrap_or_default()
                                .into_iter()
                                .map(|r| r.0)
                                .collect(),
                            error: p.error,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Per-topic outcome of an administrative call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicError {
    /// The topic name.
    pub topic: String,

    /// The error, or `None` on success.
    pub error: Option<ApiError>,
}

impl TopicError {
    /// The raw broker error code (0 on success).
    pub fn error_code(&self) -> i16 {
        self.error.map(|e| e.code()).unwrap_or_default()
    }
}
