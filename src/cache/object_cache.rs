use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

// =============================================================================
// CacheEntry
// =============================================================================

/// Values that can be stored in an [`ObjectCache`].
///
/// The key must be a pure function of the value's identity: two values
/// describing the same logical object must produce the same key from every
/// call site, and two different objects must never share one.
pub trait CacheEntry: Send + Sync {
    /// Identity token for this value.
    fn cache_key(&self) -> String;

    /// Bytes charged against the cache budget for this value stored under `key`.
    fn size_contribution(&self, key: &str) -> usize;

    /// Modification time of the backing source when this value was produced.
    fn timestamp(&self) -> SystemTime;
}

/// Result of an [`ObjectCache::insert`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The key was not present and the value was stored
    Inserted,
    /// An older entry with the same key was evicted and the value stored
    Replaced,
    /// An entry with the same key and an equal or newer timestamp was kept;
    /// the incoming value was discarded
    Kept,
    /// The cache has a zero budget and stores nothing
    Disabled,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of stored entries
    pub entries: usize,
    /// Sum of the size contributions of all stored entries
    pub size: usize,
    /// Budget the size is held under
    pub capacity: usize,
}

// =============================================================================
// ObjectCache
// =============================================================================

struct Slot<V> {
    value: Arc<V>,
    size: usize,
}

struct CacheState<V> {
    entries: LruCache<String, Slot<V>>,
    current_size: usize,
}

impl<V> CacheState<V> {
    fn remove(&mut self, key: &str) -> Option<Arc<V>> {
        let slot = self.entries.pop(key)?;
        self.current_size -= slot.size;
        Some(slot.value)
    }
}

/// Least-recently-used cache bounded by a size budget.
///
/// A budget of zero disables the cache: lookups always miss and inserts are
/// dropped. Each operation takes the single internal lock once, so `get`,
/// `insert` and `evict` are individually atomic; nothing is computed while
/// the lock is held apart from index and list updates.
pub struct ObjectCache<V> {
    state: Mutex<CacheState<V>>,

    /// Maximum total size contribution
    max_size: usize,
}

impl<V: CacheEntry> ObjectCache<V> {
    /// Create a cache bounded by `max_size` units of size contribution.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Create a byte-budgeted cache from a size in megabytes.
    pub fn with_capacity_mb(megabytes: f64) -> Self {
        let bytes = (megabytes.max(0.0) * 1024.0 * 1024.0).ceil() as usize;
        Self::with_capacity(bytes)
    }

    /// Look up an entry, marking it most recently used on a hit.
    pub async fn get(&self, key: &str) -> Option<Arc<V>> {
        if self.max_size == 0 {
            return None;
        }
        let mut state = self.state.lock().await;
        state.entries.get(key).map(|slot| Arc::clone(&slot.value))
    }

    /// Check for an entry without touching its recency.
    pub async fn contains(&self, key: &str) -> bool {
        let state = self.state.lock().await;
        state.entries.contains(key)
    }

    /// Insert an entry at the most-recently-used position.
    ///
    /// When the key is already present the stored entry is touched, then
    /// replaced only if its timestamp is strictly older than the incoming one.
    /// Least-recently-used entries are evicted afterwards until the total size
    /// fits the budget.
    pub async fn insert(&self, value: Arc<V>) -> InsertOutcome {
        if self.max_size == 0 {
            return InsertOutcome::Disabled;
        }

        let key = value.cache_key();
        let size = value.size_contribution(&key);

        let mut state = self.state.lock().await;

        let mut outcome = InsertOutcome::Inserted;
        if let Some(existing) = state.entries.get(&key) {
            if existing.value.timestamp() < value.timestamp() {
                state.remove(&key);
                outcome = InsertOutcome::Replaced;
            } else {
                return InsertOutcome::Kept;
            }
        }

        state.current_size += size;
        state.entries.push(key.clone(), Slot { value, size });

        while state.current_size > self.max_size {
            match state.entries.pop_lru() {
                Some((evicted, slot)) => {
                    state.current_size -= slot.size;
                    debug!(key = %evicted, size = slot.size, "cache eviction");
                }
                None => break,
            }
        }

        if outcome == InsertOutcome::Replaced {
            debug!(key = %key, "replaced stale cache entry");
        }
        outcome
    }

    /// Remove the entry sharing `value`'s identity.
    ///
    /// Used when a caller holds a record known to be newer than the cached
    /// copy. Returns the removed entry, if any.
    pub async fn evict(&self, value: &V) -> Option<Arc<V>> {
        let key = value.cache_key();
        self.remove(&key).await
    }

    /// Remove an entry by key.
    pub async fn remove(&self, key: &str) -> Option<Arc<V>> {
        let mut state = self.state.lock().await;
        state.remove(key)
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.current_size = 0;
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.entries.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current total size contribution.
    pub async fn size(&self) -> usize {
        let state = self.state.lock().await;
        state.current_size
    }

    /// Current total size in megabytes.
    pub async fn memory_size_mb(&self) -> f64 {
        self.size().await as f64 / (1024.0 * 1024.0)
    }

    /// The configured budget.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Entry count, size and budget in one snapshot.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.entries.len(),
            size: state.current_size,
            capacity: self.max_size,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
