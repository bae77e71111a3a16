//! Residency
//!
//! The selector never owns textures; it only asks whether a tile's image is
//! resident. [`TextureCache`] is the in-process answer to that question: a
//! bounded LRU set of resident keys with optional pinning for tiles that must
//! never be evicted.

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;

use crate::tile::TileKey;

/// Answers whether a tile's decoded image is ready to draw
pub trait ResidencyOracle: Send + Sync {
    /// Check residency. Must not have side effects on the answer.
    fn is_resident(&self, key: &TileKey) -> bool;

    /// Hint that a resident texture was drawn this frame
    fn mark_used(&self, _key: &TileKey) {}
}

impl<F> ResidencyOracle for F
where
    F: Fn(&TileKey) -> bool + Send + Sync,
{
    fn is_resident(&self, key: &TileKey) -> bool {
        self(key)
    }
}

/// Synchronous, blocking materialization of a tile
pub trait ForceLoad {
    /// Load the tile on the calling thread. On return the tile is either
    /// resident or known to be unavailable.
    fn force_load(&self, key: &TileKey);
}

/// A force-load hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoForceLoad;

impl ForceLoad for NoForceLoad {
    fn force_load(&self, _key: &TileKey) {}
}

struct CacheState {
    /// Unpinned entries and their last-use tick
    entries: AHashMap<TileKey, u64>,
    /// Entries that are never evicted
    pinned: AHashSet<TileKey>,
    clock: u64,
}

/// Bounded, thread-safe set of resident tiles
pub struct TextureCache {
    state: RwLock<CacheState>,
    capacity: usize,
}

impl TextureCache {
    /// Create a cache holding at most `capacity` unpinned tiles
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: AHashMap::with_capacity(capacity.min(4096)),
                pinned: AHashSet::new(),
                clock: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Maximum number of unpinned tiles
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert an evictable tile, evicting the least recently used one if full
    pub fn insert(&self, key: TileKey) {
        let mut state = self.state.write();
        if state.pinned.contains(&key) {
            return;
        }

        state.clock += 1;
        let tick = state.clock;
        state.entries.insert(key, tick);

        while state.entries.len() > self.capacity {
            let Some(oldest) = state
                .entries
                .iter()
                .min_by_key(|(_, used)| **used)
                .map(|(key, _)| *key)
            else {
                break;
            };
            state.entries.remove(&oldest);
            log::trace!("Evicted texture {oldest}");
        }
    }

    /// Insert a tile that is never evicted
    pub fn insert_pinned(&self, key: TileKey) {
        let mut state = self.state.write();
        state.entries.remove(&key);
        state.pinned.insert(key);
    }

    /// Remove a tile, pinned or not. Returns whether it was resident.
    pub fn remove(&self, key: &TileKey) -> bool {
        let mut state = self.state.write();
        state.entries.remove(key).is_some() | state.pinned.remove(key)
    }

    /// Refresh a tile's position in the eviction order
    pub fn touch(&self, key: &TileKey) {
        let mut state = self.state.write();
        state.clock += 1;
        let tick = state.clock;
        if let Some(used) = state.entries.get_mut(key) {
            *used = tick;
        }
    }

    /// Check whether a tile is resident
    pub fn contains(&self, key: &TileKey) -> bool {
        let state = self.state.read();
        state.pinned.contains(key) || state.entries.contains_key(key)
    }

    /// Number of resident tiles, pinned included
    pub fn len(&self) -> usize {
        let state = self.state.read();
        state.entries.len() + state.pinned.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pinned tiles
    pub fn pinned_len(&self) -> usize {
        self.state.read().pinned.len()
    }

    /// Drop every tile, pinned included
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.pinned.clear();
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new(crate::config::CacheConfig::default().capacity)
    }
}

impl ResidencyOracle for TextureCache {
    fn is_resident(&self, key: &TileKey) -> bool {
        self.contains(key)
    }

    fn mark_used(&self, key: &TileKey) {
        self.touch(key);
    }
}

impl std::fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("TextureCache")
            .field("capacity", &self.capacity)
            .field("entries", &state.entries.len())
            .field("pinned", &state.pinned.len())
            .finish()
    }
}
