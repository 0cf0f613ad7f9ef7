//! Error codes returned by brokers.
//!
//! Every logical unit of a response (topic, partition, or the whole message)
//! may carry one of these codes. The client groups them into three classes
//! that drive the retry machinery: see [`ErrorClass`].
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_error_codes>

use thiserror::Error;

/// How an error code should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Transient cluster state (leader moving, topic mid-creation, temporary
    /// unavailability). Worth refreshing metadata and retrying.
    Retriable,

    /// The request as issued will never succeed; surface to the caller.
    Permanent,

    /// The connection itself can no longer be trusted (version or
    /// authentication mismatch).
    Fatal,
}

/// A broker-defined error code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    #[error("The server experienced an unexpected error when processing the request.")]
    UnknownServerError,

    #[error("The requested offset is not within the range of offsets maintained by the server.")]
    OffsetOutOfRange,

    #[error("This message has failed its CRC checksum, exceeds the valid size, or is otherwise corrupt.")]
    CorruptMessage,

    #[error("This server does not host this topic-partition.")]
    UnknownTopicOrPartition,

    #[error("The requested fetch size is invalid.")]
    InvalidFetchSize,

    #[error("There is no leader for this topic-partition as we are in the middle of a leadership election.")]
    LeaderNotAvailable,

    #[error("For requests intended only for the leader, this error indicates that the broker is not the current leader.")]
    NotLeaderOrFollower,

    #[error("The request timed out.")]
    RequestTimedOut,

    #[error("The broker is not available.")]
    BrokerNotAvailable,

    #[error("The replica is not available for the requested topic-partition.")]
    ReplicaNotAvailable,

    #[error("The request included a message larger than the max message size the server will accept.")]
    MessageTooLarge,

    #[error("The server disconnected before a response was received.")]
    NetworkException,

    #[error("The request attempted to perform an operation on an invalid topic.")]
    InvalidTopic,

    #[error("The request included message batch larger than the configured segment size on the server.")]
    RecordListTooLarge,

    #[error("Messages are rejected since there are fewer in-sync replicas than required.")]
    NotEnoughReplicas,

    #[error("Messages are written to the log, but to fewer in-sync replicas than required.")]
    NotEnoughReplicasAfterAppend,

    #[error("Produce request specified an invalid value for required acks.")]
    InvalidRequiredAcks,

    #[error("Topic authorization failed.")]
    TopicAuthorizationFailed,

    #[error("Cluster authorization failed.")]
    ClusterAuthorizationFailed,

    #[error("The version of API is not supported.")]
    UnsupportedVersion,

    #[error("Topic with this name already exists.")]
    TopicAlreadyExists,

    #[error("Number of partitions is below 1.")]
    InvalidPartitions,

    #[error("Replication factor is below 1 or larger than the number of available brokers.")]
    InvalidReplicationFactor,

    #[error("This is not the correct controller for this cluster.")]
    NotController,

    #[error("This most likely occurs because of a request being malformed by the client library or the message was sent to an incompatible broker.")]
    InvalidRequest,

    #[error("The request parameters do not satisfy the configured policy.")]
    PolicyViolation,

    #[error("The broker received an out of order sequence number.")]
    OutOfOrderSequenceNumber,

    #[error("The broker received a duplicate sequence number.")]
    DuplicateSequenceNumber,

    #[error("SASL Authentication failed.")]
    SaslAuthenticationFailed,

    #[error("Disk error when trying to access log file on the disk.")]
    KafkaStorageError,

    #[error("The requesting client does not support the compression type of given partition.")]
    UnsupportedCompressionType,

    #[error("Topic deletion is disabled.")]
    TopicDeletionDisabled,

    #[error("The throttling quota has been exceeded.")]
    ThrottlingQuotaExceeded,

    #[error("Unknown error code: {0}")]
    Unknown(i16),
}

impl Error {
    /// Converts a wire error code to `Some(error)` or `None` for code 0
    /// (no error).
    pub fn new(code: i16) -> Option<Self> {
        match code {
            0 => None,
            -1 => Some(Self::UnknownServerError),
            1 => Some(Self::OffsetOutOfRange),
            2 => Some(Self::CorruptMessage),
            3 => Some(Self::UnknownTopicOrPartition),
            4 => Some(Self::InvalidFetchSize),
            5 => Some(Self::LeaderNotAvailable),
            6 => Some(Self::NotLeaderOrFollower),
            7 => Some(Self::RequestTimedOut),
            8 => Some(Self::BrokerNotAvailable),
            9 => Some(Self::ReplicaNotAvailable),
            10 => Some(Self::MessageTooLarge),
            13 => Some(Self::NetworkException),
            17 => Some(Self::InvalidTopic),
            18 => Some(Self::RecordListTooLarge),
            19 => Some(Self::NotEnoughReplicas),
            20 => Some(Self::NotEnoughReplicasAfterAppend),
            21 => Some(Self::InvalidRequiredAcks),
            29 => Some(Self::TopicAuthorizationFailed),
            31 => Some(Self::ClusterAuthorizationFailed),
            35 => Some(Self::UnsupportedVersion),
            36 => Some(Self::TopicAlreadyExists),
            37 => Some(Self::InvalidPartitions),
            38 => Some(Self::InvalidReplicationFactor),
            41 => Some(Self::NotController),
            42 => Some(Self::InvalidRequest),
            44 => Some(Self::PolicyViolation),
            45 => Some(Self::OutOfOrderSequenceNumber),
            46 => Some(Self::DuplicateSequenceNumber),
            56 => Some(Self::KafkaStorageError),
            58 => Some(Self::SaslAuthenticationFailed),
            74 => Some(Self::UnsupportedCompressionType),
            73 => Some(Self::TopicDeletionDisabled),
            89 => Some(Self::ThrottlingQuotaExceeded),
            _ => Some(Self::Unknown(code)),
        }
    }

    /// The wire code for this error.
    pub fn code(&self) -> i16 {
        match self {
            Self::UnknownServerError => -1,
            Self::OffsetOutOfRange => 1,
            Self::CorruptMessage => 2,
            Self::UnknownTopicOrPartition => 3,
            Self::InvalidFetchSize => 4,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderOrFollower => 6,
            Self::RequestTimedOut => 7,
            Self::BrokerNotAvailable => 8,
            Self::ReplicaNotAvailable => 9,
            Self::MessageTooLarge => 10,
            Self::NetworkException => 13,
            Self::InvalidTopic => 17,
            Self::RecordListTooLarge => 18,
            Self::NotEnoughReplicas => 19,
            Self::NotEnoughReplicasAfterAppend => 20,
            Self::InvalidRequiredAcks => 21,
            Self::TopicAuthorizationFailed => 29,
            Self::ClusterAuthorizationFailed => 31,
            Self::UnsupportedVersion => 35,
            Self::TopicAlreadyExists => 36,
            Self::InvalidPartitions => 37,
            Self::InvalidReplicationFactor => 38,
            Self::NotController => 41,
            Self::InvalidRequest => 42,
            Self::PolicyViolation => 44,
            Self::OutOfOrderSequenceNumber => 45,
            Self::DuplicateSequenceNumber => 46,
            Self::KafkaStorageError => 56,
            Self::SaslAuthenticationFailed => 58,
            Self::TopicDeletionDisabled => 73,
            Self::UnsupportedCompressionType => 74,
            Self::ThrottlingQuotaExceeded => 89,
            Self::Unknown(code) => *code,
        }
    }

    /// The default classification for this code.
    ///
    /// Which class a code falls into can be cluster-version-dependent (a
    /// produce racing a topic deletion may see `UnknownTopicOrPartition` or
    /// `LeaderNotAvailable` depending on the broker); deployments can remap
    /// individual codes via
    /// [`ErrorClassifier`](crate::client::error::ErrorClassifier).
    pub fn default_class(&self) -> ErrorClass {
        match self {
            Self::CorruptMessage
            | Self::UnknownTopicOrPartition
            | Self::LeaderNotAvailable
            | Self::NotLeaderOrFollower
            | Self::RequestTimedOut
            | Self::BrokerNotAvailable
            | Self::ReplicaNotAvailable
            | Self::NetworkException
            | Self::NotEnoughReplicas
            | Self::NotEnoughReplicasAfterAppend
            | Self::NotController
            | Self::KafkaStorageError
            | Self::ThrottlingQuotaExceeded => ErrorClass::Retriable,

            Self::UnsupportedVersion
            | Self::TopicAuthorizationFailed
            | Self::ClusterAuthorizationFailed
            | Self::SaslAuthenticationFailed => ErrorClass::Fatal,

            _ => ErrorClass::Permanent,
        }
    }
}
