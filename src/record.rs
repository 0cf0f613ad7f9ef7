use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// High-level record.
///
/// Records are created by the caller and copied into batches on send; a
/// batch never aliases caller-held data, so retries are independent of
/// whatever the caller does with its copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Optional grouping key.
    ///
    /// Records with the same key are routed to the same partition, which is
    /// what gives them a total order relative to each other.
    pub key: Option<Vec<u8>>,

    /// The payload.
    pub value: Vec<u8>,

    /// Application headers, transported verbatim.
    pub headers: BTreeMap<String, Vec<u8>>,

    /// Producer-assigned timestamp (millisecond precision on the wire).
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Returns the approximate uncompressed size of this [`Record`] in bytes.
    pub fn approximate_size(&self) -> usize {
        self.key.as_deref().map(<[u8]>::len).unwrap_or_default()
            + self.value.len()
            + self
                .headers
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

/// Record that has offset information attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAndOffset {
    pub record: Record,
    pub offset: i64,
}
