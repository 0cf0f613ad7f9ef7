use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectError;
use crate::messenger::{RequestError, SyncVersionsError};
use crate::protocol::error::{Error as ProtocolError, ErrorClass};

use super::partitioner::SelectError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Version sync error: {0}")]
    SyncVersions(#[from] SyncVersionsError),

    #[error("Not connected")]
    NotConnected,

    #[error("Operation \"{operation}\" timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Server error {0:?} for {1}")]
    ServerError(ProtocolError, String),

    #[error("Partition selection failed: {0}")]
    Partition(#[from] SelectError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Classify this error for the retry machinery.
    ///
    /// - transport-level failures (connect errors, lost connections, client
    ///   side timeouts) are worth retrying on a fresh connection
    /// - broker-reported codes classify via `classifier`
    /// - version mismatches and malformed responses condemn the connection
    /// - everything else will not get better by itself
    pub fn class(&self, classifier: &ErrorClassifier) -> ErrorClass {
        match self {
            Self::Connect(_) | Self::NotConnected | Self::Timeout { .. } => ErrorClass::Retriable,
            Self::Request(e) if e.is_connection_lost() => ErrorClass::Retriable,
            Self::Request(_) | Self::SyncVersions(_) => ErrorClass::Fatal,
            Self::ServerError(protocol_error, _) => classifier.classify(*protocol_error),
            Self::InvalidResponse(_) | Self::Partition(_) => ErrorClass::Permanent,
        }
    }
}

/// Maps broker error codes to [`ErrorClass`]es.
///
/// Defaults follow [`ProtocolError::default_class`]. The exact code a broker
/// returns for some races (e.g. producing to a topic that is being deleted)
/// depends on the cluster version, so individual codes can be remapped per
/// deployment instead of being hard-coded.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    overrides: HashMap<ProtocolError, ErrorClass>,
}

impl ErrorClassifier {
    /// Remap `error` to `class`, overriding the default classification.
    pub fn with_override(mut self, error: ProtocolError, class: ErrorClass) -> Self {
        self.overrides.insert(error, class);
        self
    }

    pub fn classify(&self, error: ProtocolError) -> ErrorClass {
        self.overrides
            .get(&error)
            .copied()
            .unwrap_or_else(|| error.default_class())
    }
}
