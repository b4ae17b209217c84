//! In-memory tile store with automatic LRU eviction, using moka.
//!
//! This is the automatic-eviction extension point: instead of rejecting
//! writes past the budget the way the strict stores do, this provider
//! lets moka evict least-recently-used tiles to stay under it.
//!
//! # Why moka?
//!
//! - Lock-free reads (common case)
//! - Concurrent writes without blocking
//! - Automatic LRU eviction without explicit locking
//! - Memory-bounded with configurable limits

use bytes::Bytes;
use moka::future::Cache as MokaCache;

use crate::cache::traits::{BoxFuture, CacheEntry, StoreError, TileStore};
use crate::coord::TileId;

/// Memory-bounded tile store that evicts instead of rejecting.
///
/// `size_bytes` and `entry_count` are eventually consistent: moka applies
/// eviction in background maintenance passes. Call [`run_pending`] to
/// force a pass (mainly useful in tests).
///
/// [`run_pending`]: LruTileStore::run_pending
pub struct LruTileStore {
    cache: MokaCache<TileId, CacheEntry>,
    budget: u64,
}

impl LruTileStore {
    /// Creates a store bounded to `budget_bytes`, weighting each entry by
    /// its payload size.
    pub fn with_budget(budget_bytes: u64) -> Self {
        let cache = MokaCache::builder()
            .weigher(|_id: &TileId, entry: &CacheEntry| -> u32 {
                entry.size_bytes.min(u64::from(u32::MAX)) as u32
            })
            .max_capacity(budget_bytes)
            .build();
        Self {
            cache,
            budget: budget_bytes,
        }
    }

    /// Runs moka's pending maintenance tasks (eviction, count sync).
    pub async fn run_pending(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl TileStore for LruTileStore {
    fn get(&self, id: TileId) -> BoxFuture<'_, Result<Option<CacheEntry>, StoreError>> {
        Box::pin(async move { Ok(self.cache.get(&id).await) })
    }

    fn put(&self, id: TileId, bytes: Bytes) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.cache.insert(id, CacheEntry::new(id, bytes)).await;
            Ok(())
        })
    }

    fn delete(&self, id: TileId) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let existed = self.cache.contains_key(&id);
            self.cache.remove(&id).await;
            Ok(existed)
        })
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<TileId>, StoreError>> {
        let keys: Vec<TileId> = self.cache.iter().map(|(id, _)| *id).collect();
        Box::pin(async move { Ok(keys) })
    }

    fn size_of(&self, id: TileId) -> BoxFuture<'_, Result<Option<u64>, StoreError>> {
        Box::pin(async move { Ok(self.cache.get(&id).await.map(|e| e.size_bytes)) })
    }

    fn size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    fn budget_bytes(&self) -> Option<u64> {
        Some(self.budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tile(x: u32, y: u32) -> TileId {
        TileId::new(11, x, y)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = LruTileStore::with_budget(1_000_000);
        store.put(tile(1, 1), Bytes::from_static(b"osm")).await.unwrap();

        let entry = store.get(tile(1, 1)).await.unwrap().unwrap();
        assert_eq!(entry.bytes, Bytes::from_static(b"osm"));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = LruTileStore::with_budget(1_000_000);
        store.put(tile(1, 1), Bytes::from_static(b"x")).await.unwrap();

        assert!(store.delete(tile(1, 1)).await.unwrap());
        assert!(!store.delete(tile(1, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_over_budget_put_evicts_instead_of_rejecting() {
        // Budget fits about two 1000-byte tiles.
        let store = LruTileStore::with_budget(2500);

        store.put(tile(1, 1), Bytes::from(vec![0u8; 1000])).await.unwrap();
        store.put(tile(2, 2), Bytes::from(vec![0u8; 1000])).await.unwrap();
        // Third put succeeds; something older is evicted.
        store.put(tile(3, 3), Bytes::from(vec![0u8; 1000])).await.unwrap();

        store.run_pending().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.run_pending().await;

        assert!(
            store.size_bytes() <= 2500,
            "expected size <= 2500, got {}",
            store.size_bytes()
        );
    }

    #[tokio::test]
    async fn test_keys_lists_resident_tiles() {
        let store = LruTileStore::with_budget(1_000_000);
        store.put(tile(1, 1), Bytes::from_static(b"a")).await.unwrap();
        store.put(tile(2, 2), Bytes::from_static(b"b")).await.unwrap();
        store.run_pending().await;

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec![tile(1, 1), tile(2, 2)]);
    }

    #[tokio::test]
    async fn test_bulk_delete() {
        let store = LruTileStore::with_budget(1_000_000);
        store.put(tile(1, 1), Bytes::from_static(b"a")).await.unwrap();
        store.put(tile(2, 2), Bytes::from_static(b"b")).await.unwrap();

        let deleted = store
            .bulk_delete(&[tile(1, 1), tile(2, 2), tile(3, 3)])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
    }
}
