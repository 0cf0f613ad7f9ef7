use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::metadata::ClusterMetadata;

struct CacheEntry {
    metadata: Arc<ClusterMetadata>,
    fetched_at: Instant,
}

/// Look-aside cache for the last known cluster topology.
///
/// Snapshots are immutable and replaced wholesale on every refresh, so a
/// reader holding an `Arc` from [`get`](MetadataCache::get) never observes a
/// half-updated topology, no matter what refreshes happen concurrently.
#[derive(Default)]
pub struct MetadataCache {
    cache: Mutex<Option<CacheEntry>>,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache").finish_non_exhaustive()
    }
}

impl MetadataCache {
    /// The cached snapshot, if one exists and is younger than `max_age`.
    pub fn get(&self, max_age: Duration) -> Option<Arc<ClusterMetadata>> {
        let guard = self.cache.lock();
        let entry = guard.as_ref()?;

        if entry.fetched_at.elapsed() > max_age {
            debug!("cached metadata entry is stale");
            return None;
        }

        Some(Arc::clone(&entry.metadata))
    }

    /// Install a fresh snapshot, returning the shared handle to it.
    pub fn update(&self, metadata: ClusterMetadata) -> Arc<ClusterMetadata> {
        let metadata = Arc::new(metadata);
        *self.cache.lock() = Some(CacheEntry {
            metadata: Arc::clone(&metadata),
            fetched_at: Instant::now(),
        });
        debug!("updated metadata cache");
        metadata
    }

    pub fn invalidate(&self) {
        *self.cache.lock() = None;
        debug!("invalidated metadata cache");
    }
}
