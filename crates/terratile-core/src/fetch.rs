//! Fetch Request Queue
//!
//! Tiles that need imagery are queued here during selection and handed to a
//! [`TaskService`] once per frame. The queue is bounded: when it is full a
//! coarser request displaces the deepest queued one, so whatever gets
//! dropped is always the finest detail. Coarse tiles act as fallbacks for
//! everything beneath them, which makes them the most valuable to load.

use std::collections::BTreeMap;

use ahash::AHashSet;

use crate::config::DEFAULT_FETCH_QUEUE_CAPACITY;
use crate::tile::TileKey;

/// A request to load one tile's imagery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub key: TileKey,
    /// Lower values are served first
    pub priority: u32,
}

impl FetchRequest {
    /// Request a tile at the priority of its level
    pub fn for_tile(key: TileKey) -> Self {
        Self {
            key,
            priority: key.level,
        }
    }
}

/// Executes fetch requests outside the render thread
pub trait TaskService {
    /// Check whether the service accepts more work right now
    fn has_capacity(&self) -> bool;

    /// Hand a request to the service. Fire and forget.
    ///
    /// Returns `false` if the service refused the request, for example
    /// because the tile is already being fetched.
    fn submit(&self, request: FetchRequest) -> bool;
}

/// Outcome of handing a frame's queue to a [`TaskService`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Requests accepted by the service
    pub submitted: usize,
    /// Requests offered to the service and refused by it
    pub rejected: usize,
    /// Requests discarded because the service was full
    pub skipped: usize,
}

/// Bounded, priority-ordered, deduplicating request queue
#[derive(Debug)]
pub struct FetchQueue {
    /// Ordered by (priority, insertion sequence)
    entries: BTreeMap<(u32, u64), FetchRequest>,
    keys: AHashSet<TileKey>,
    capacity: usize,
    sequence: u64,
}

impl FetchQueue {
    /// Create a queue holding at most `capacity` requests
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            keys: AHashSet::with_capacity(capacity),
            capacity: capacity.max(1),
            sequence: 0,
        }
    }

    /// Maximum number of queued requests
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a request.
    ///
    /// Returns `false` if the tile is already queued, or if the queue is full
    /// and the request is no coarser than everything in it.
    pub fn try_push(&mut self, request: FetchRequest) -> bool {
        if self.keys.contains(&request.key) {
            return false;
        }

        if self.entries.len() >= self.capacity {
            let Some((&(lowest, _), _)) = self.entries.last_key_value() else {
                return false;
            };
            if request.priority >= lowest {
                log::trace!("Fetch queue full, dropping {}", request.key);
                return false;
            }
            if let Some((_, evicted)) = self.entries.pop_last() {
                self.keys.remove(&evicted.key);
                log::trace!("Fetch queue full, {} displaces {}", request.key, evicted.key);
            }
        }

        self.sequence += 1;
        self.entries.insert((request.priority, self.sequence), request);
        self.keys.insert(request.key);
        true
    }

    /// Check whether a tile is queued
    pub fn contains(&self, key: &TileKey) -> bool {
        self.keys.contains(key)
    }

    /// Number of queued requests
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every request
    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }

    /// Remove and return every request, coarsest first, ties in insertion order
    pub fn drain(&mut self) -> Vec<FetchRequest> {
        self.keys.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }

    /// Drain the queue into `service`, submitting each request only while
    /// the service has capacity. Requests it cannot take are discarded; they
    /// will be requested again on a later frame if still needed.
    pub fn dispatch(&mut self, service: &dyn TaskService) -> DispatchStats {
        let mut stats = DispatchStats::default();
        for request in self.drain() {
            if !service.has_capacity() {
                stats.skipped += 1;
            } else if service.submit(request) {
                stats.submitted += 1;
            } else {
                stats.rejected += 1;
            }
        }
        stats
    }
}

impl Default for FetchQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FETCH_QUEUE_CAPACITY)
    }
}
