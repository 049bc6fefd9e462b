//! Thread-safe handle registry for open connections
//!
//! Each accepted connection is registered under a numeric handle so the
//! server can shut every one of them down on `stop`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe registry mapping numeric handles to values.
///
/// Handles are auto-incrementing u64 IDs.
pub struct HandleRegistry<T> {
    map: DashMap<u64, T>,
    next_id: AtomicU64,
}

impl<T> HandleRegistry<T> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a value and return its handle.
    pub fn insert(&self, value: T) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.map.insert(id, value);
        id
    }

    /// Remove a value by handle, returning it.
    pub fn remove(&self, id: u64) -> Option<T> {
        self.map.remove(&id).map(|(_, value)| value)
    }

    /// Remove and return every value.
    pub fn drain(&self) -> Vec<T> {
        let ids: Vec<u64> = self.map.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check for an empty registry.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
