//! Destination partition selection.
//!
//! Resolution order: an explicit partition wins, then key hashing, then
//! round robin. Key hashing uses the same murmur2 construction as the Java
//! client, so keyed records interleave correctly with producers written
//! against other client libraries.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

use crate::metadata::TopicMetadata;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("Partition {partition} does not exist for topic \"{topic}\"")]
    InvalidPartition { topic: String, partition: i32 },

    #[error("No partitions available for topic \"{topic}\"")]
    NoPartitionsAvailable { topic: String },
}

/// Picks the destination partition for a record.
///
/// Stateless for explicit and keyed selection; carries a per-topic counter
/// for round robin.
#[derive(Debug, Default)]
pub struct PartitionSelector {
    round_robin: Mutex<HashMap<String, usize>>,
}

impl PartitionSelector {
    /// Select the partition for a record destined for `topic`.
    ///
    /// Keyed selection is deterministic: the same key with the same partition
    /// set always lands on the same partition. Round robin advances one
    /// partition per call, visiting each once before wrapping.
    pub fn select(
        &self,
        topic: &TopicMetadata,
        explicit_partition: Option<i32>,
        key: Option<&[u8]>,
    ) -> Result<i32, SelectError> {
        if let Some(partition) = explicit_partition {
            if topic.partition(partition).is_none() {
                return Err(SelectError::InvalidPartition {
                    topic: topic.name.clone(),
                    partition,
                });
            }
            return Ok(partition);
        }

        // Partition ids are explicit in metadata and the response order is
        // not specified, so build a stable ordering before indexing.
        let mut partition_ids: Vec<i32> =
            topic.partitions.iter().map(|p| p.partition_id).collect();
        partition_ids.sort_unstable();

        if partition_ids.is_empty() {
            return Err(SelectError::NoPartitionsAvailable {
                topic: topic.name.clone(),
            });
        }

        if let Some(key) = key {
            let index = (murmur2(key) & 0x7fff_ffff) as usize % partition_ids.len();
            return Ok(partition_ids[index]);
        }

        let mut counters = self.round_robin.lock();
        let counter = counters.entry(topic.name.clone()).or_insert(0);
        let index = *counter % partition_ids.len();
        *counter = counter.wrapping_add(1);
        Ok(partition_ids[index])
    }
}

/// murmur2, as used by the Java client's default partitioner (seed
/// 0x9747b28c).
fn murmur2(data: &[u8]) -> u32 {
    const SEED: u32 = 0x9747b28c;
    const M: u32 = 0x5bd1e995;
    const R: u32 = 24;

    let mut h = SEED ^ data.len() as u32;

    let mut chunks = data.chunks_exact(4);
    for chunk in chunks.by_ref() {
        let mut k = u32::from_le_bytes(chunk.try_into().expect("chunk is 4 bytes"));
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h
}

#[cfg(test)]
mod tests {
    use crate::metadata::PartitionMetadata;

    use super::*;

    fn topic(name: &str, partition_ids: &[i32]) -> TopicMetadata {
        TopicMetadata {
            name: name.to_owned(),
            error: None,
            partitions: partition_ids
                .iter()
                .map(|&partition_id| PartitionMetadata {
                    partition_id,
                    leader_id: 1,
                    replica_nodes: vec![1],
                    error: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_explicit_partition() {
        let selector = PartitionSelector::default();
        let t = topic("t", &[0, 1, 2]);

        assert_eq!(selector.select(&t, Some(2), None).unwrap(), 2);
        // explicit wins over key
        assert_eq!(selector.select(&t, Some(1), Some(b"key")).unwrap(), 1);
    }

    #[test]
    fn test_explicit_partition_invalid() {
        let selector = PartitionSelector::default();
        let t = topic("t", &[0, 1, 2]);

        assert_eq!(
            selector.select(&t, Some(3), None).unwrap_err(),
            SelectError::InvalidPartition {
                topic: "t".to_owned(),
                partition: 3,
            }
        );
    }

    #[test]
    fn test_keyed_is_deterministic() {
        let selector = PartitionSelector::default();
        let t = topic("t", &[0, 1, 2, 3, 4]);

        let first = selector.select(&t, None, Some(b"user-42")).unwrap();
        for _ in 0..100 {
            assert_eq!(selector.select(&t, None, Some(b"user-42")).unwrap(), first);
        }
    }

    #[test]
    fn test_keyed_ignores_metadata_order() {
        let selector = PartitionSelector::default();
        let forward = topic("t", &[0, 1, 2, 3]);
        let shuffled = topic("t", &[2, 0, 3, 1]);

        for key in [b"a".as_slice(), b"bb", b"ccc", b"user-42", b""] {
            assert_eq!(
                selector.select(&forward, None, Some(key)).unwrap(),
                selector.select(&shuffled, None, Some(key)).unwrap(),
            );
        }
    }

    #[test]
    fn test_keyed_spreads_over_partitions() {
        let selector = PartitionSelector::default();
        let t = topic("t", &[0, 1, 2, 3, 4, 5, 6, 7]);

        let mut seen = std::collections::BTreeSet::new();
        for i in 0..256 {
            let key = format!("key-{i}");
            seen.insert(selector.select(&t, None, Some(key.as_bytes())).unwrap());
        }
        // not a distribution test, just a sanity check that the hash is not
        // collapsing everything onto one partition
        assert!(seen.len() > 4, "only {} partitions used", seen.len());
    }

    #[test]
    fn test_round_robin_cycles() {
        let selector = PartitionSelector::default();
        let t = topic("t", &[5, 1, 3]);

        // one full cycle visits every partition exactly once, in id order
        let cycle: Vec<i32> = (0..3)
            .map(|_| selector.select(&t, None, None).unwrap())
            .collect();
        assert_eq!(cycle, vec![1, 3, 5]);

        // and then wraps
        assert_eq!(selector.select(&t, None, None).unwrap(), 1);
    }

    #[test]
    fn test_round_robin_state_is_per_topic() {
        let selector = PartitionSelector::default();
        let t1 = topic("t1", &[0, 1]);
        let t2 = topic("t2", &[0, 1]);

        assert_eq!(selector.select(&t1, None, None).unwrap(), 0);
        assert_eq!(selector.select(&t1, None, None).unwrap(), 1);
        // t2 starts its own cycle
        assert_eq!(selector.select(&t2, None, None).unwrap(), 0);
    }

    #[test]
    fn test_no_partitions() {
        let selector = PartitionSelector::default();
        let t = topic("mid-deletion", &[]);

        assert_eq!(
            selector.select(&t, None, Some(b"key")).unwrap_err(),
            SelectError::NoPartitionsAvailable {
                topic: "mid-deletion".to_owned(),
            }
        );
        assert_eq!(
            selector.select(&t, None, None).unwrap_err(),
            SelectError::NoPartitionsAvailable {
                topic: "mid-deletion".to_owned(),
            }
        );
    }

    #[test]
    fn test_murmur2_reference_values() {
        // cross-checked against an independent transcription of
        // org.apache.kafka.common.utils.Utils#murmur2
        assert_eq!(murmur2(b""), 0x106e_08d9);
        assert_eq!(murmur2(b"a"), 0xa2d0_b27c);
        assert_eq!(murmur2(b"21"), 0xc5f2_f8ec);
        assert_eq!(murmur2(b"foobar"), 0xd0e4_7bbe);
        assert_eq!(murmur2(b"user-42"), 0x5700_682c);
    }
}
