//! In-memory tile store with exact size accounting.
//!
//! Backed by `dashmap` so workers can write concurrently without a global
//! lock. Size accounting is exact: the running total moves only when an
//! entry is inserted, replaced with different bytes, or removed — which
//! makes this the store of choice for tests and for deployments that want
//! strict budget enforcement rather than automatic eviction.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::traits::{BoxFuture, CacheEntry, StoreError, TileStore};
use crate::coord::TileId;

/// Strict-budget in-memory tile store.
///
/// A `put` that would exceed the configured budget is rejected with
/// [`StoreError::StorageExhausted`], leaving existing entries intact.
/// Without a budget the store grows unbounded.
pub struct MemoryTileStore {
    map: DashMap<TileId, CacheEntry>,
    size: AtomicU64,
    budget: Option<u64>,
}

impl MemoryTileStore {
    /// Creates an unbounded store.
    pub fn unbounded() -> Self {
        Self {
            map: DashMap::new(),
            size: AtomicU64::new(0),
            budget: None,
        }
    }

    /// Creates a store that rejects writes past `budget_bytes`.
    pub fn with_budget(budget_bytes: u64) -> Self {
        Self {
            map: DashMap::new(),
            size: AtomicU64::new(0),
            budget: Some(budget_bytes),
        }
    }

    /// Atomically moves the size total from holding `replaced` bytes for
    /// a key to holding `incoming`, enforcing the budget. The CAS loop
    /// closes the window where two concurrent writers could both pass a
    /// read-then-check and overshoot the budget together.
    fn commit_size(&self, replaced: u64, incoming: u64) -> Result<(), StoreError> {
        let Some(budget) = self.budget else {
            if incoming >= replaced {
                self.size.fetch_add(incoming - replaced, Ordering::AcqRel);
            } else {
                self.size.fetch_sub(replaced - incoming, Ordering::AcqRel);
            }
            return Ok(());
        };

        let mut current = self.size.load(Ordering::Acquire);
        loop {
            let projected = current.saturating_sub(replaced) + incoming;
            if projected > budget {
                return Err(StoreError::StorageExhausted {
                    needed: incoming,
                    budget,
                });
            }
            match self
                .size
                .compare_exchange(current, projected, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for MemoryTileStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl TileStore for MemoryTileStore {
    fn get(&self, id: TileId) -> BoxFuture<'_, Result<Option<CacheEntry>, StoreError>> {
        let entry = self.map.get(&id).map(|e| e.value().clone());
        Box::pin(async move { Ok(entry) })
    }

    fn put(&self, id: TileId, bytes: Bytes) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let incoming = bytes.len() as u64;
            match self.map.entry(id) {
                Entry::Occupied(mut occupied) => {
                    if occupied.get().bytes == bytes {
                        // Identical re-fetch: observable storage unchanged.
                        return Ok(());
                    }
                    let replaced = occupied.get().size_bytes;
                    self.commit_size(replaced, incoming)?;
                    occupied.insert(CacheEntry::new(id, bytes));
                }
                Entry::Vacant(vacant) => {
                    self.commit_size(0, incoming)?;
                    vacant.insert(CacheEntry::new(id, bytes));
                }
            }
            Ok(())
        })
    }

    fn delete(&self, id: TileId) -> BoxFuture<'_, Result<bool, StoreError>> {
        let removed = self.map.remove(&id);
        if let Some((_, entry)) = &removed {
            self.size.fetch_sub(entry.size_bytes, Ordering::AcqRel);
        }
        Box::pin(async move { Ok(removed.is_some()) })
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<TileId>, StoreError>> {
        let keys: Vec<TileId> = self.map.iter().map(|e| *e.key()).collect();
        Box::pin(async move { Ok(keys) })
    }

    fn size_of(&self, id: TileId) -> BoxFuture<'_, Result<Option<u64>, StoreError>> {
        let size = self.map.get(&id).map(|e| e.value().size_bytes);
        Box::pin(async move { Ok(size) })
    }

    fn size_bytes(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    fn entry_count(&self) -> u64 {
        self.map.len() as u64
    }

    fn budget_bytes(&self) -> Option<u64> {
        self.budget
    }
}
