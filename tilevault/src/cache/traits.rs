//! Core trait for the tile cache store.
//!
//! The `TileStore` trait provides a key-value interface keyed by tile
//! address. All store providers implement this trait, allowing the
//! scheduler to use any backend through a consistent interface.
//!
//! # Design Principles
//!
//! - **Tile keys**: `TileId` is the key everywhere; its `"{z}/{x}/{y}"`
//!   rendering is the on-disk path and the log representation
//! - **`Bytes` values**: raw image payloads, no decoding opinions imposed
//! - **Local only**: no store operation ever touches the network
//! - **Dyn-compatible**: uses `Pin<Box<dyn Future>>` so the scheduler can
//!   hold an `Arc<dyn TileStore>`
//!
//! # Concurrency
//!
//! Implementations must be safe under concurrent `put` calls from
//! different workers for different keys, and under concurrent `put`/`get`
//! on the same key: last writer wins and readers never observe partially
//! written bytes.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::coord::TileId;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O failure. The store is considered unusable; a running job
    /// treats this as catastrophic.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A `put` would push the store past its configured budget. The
    /// existing entries are left intact.
    #[error("cache budget exhausted: entry of {needed} bytes exceeds budget of {budget} bytes")]
    StorageExhausted {
        /// Size of the rejected entry.
        needed: u64,
        /// Configured budget.
        budget: u64,
    },

    /// An entry exists but could not be interpreted.
    #[error("corrupt cache entry for tile {tile}: {reason}")]
    Corrupt {
        /// Cache key of the offending entry.
        tile: String,
        /// What went wrong.
        reason: String,
    },
}

impl StoreError {
    /// Returns true if the error means the store can make no further
    /// progress (as opposed to a recoverable per-entry condition).
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }
}

/// A cached tile: payload plus bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The tile this entry caches.
    pub id: TileId,
    /// Raw image payload.
    pub bytes: Bytes,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(id: TileId, bytes: Bytes) -> Self {
        let size_bytes = bytes.len() as u64;
        Self {
            id,
            bytes,
            size_bytes,
            stored_at: Utc::now(),
        }
    }
}

/// Summary of a store's contents, for the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cached tiles.
    pub entries: u64,
    /// Total payload bytes.
    pub size_bytes: u64,
    /// Configured budget, if any.
    pub budget_bytes: Option<u64>,
}

/// Key-value store for tile payloads.
///
/// # Budget Policy
///
/// A store may enforce a byte budget. Strict providers reject a `put`
/// that would exceed it with [`StoreError::StorageExhausted`]; the LRU
/// provider evicts old entries instead. Which behaviour a deployment gets
/// is a construction-time choice.
pub trait TileStore: Send + Sync {
    /// Retrieves a cached tile.
    ///
    /// Returns `Ok(None)` on a miss. Never blocks on the network.
    fn get(&self, id: TileId) -> BoxFuture<'_, Result<Option<CacheEntry>, StoreError>>;

    /// Stores a tile payload.
    ///
    /// Idempotent: writing identical bytes twice leaves the observable
    /// storage unchanged. Writing different bytes overwrites
    /// (last-writer-wins).
    fn put(&self, id: TileId, bytes: Bytes) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Deletes a tile.
    ///
    /// Returns whether the tile existed; a missing tile is not an error.
    fn delete(&self, id: TileId) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Deletes a batch of tiles, returning how many existed.
    ///
    /// Absent keys are skipped silently.
    fn bulk_delete<'a>(&'a self, ids: &'a [TileId]) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let mut deleted = 0u64;
            for &id in ids {
                if self.delete(id).await? {
                    deleted += 1;
                }
            }
            Ok(deleted)
        })
    }

    /// Lists every cached tile key.
    fn keys(&self) -> BoxFuture<'_, Result<Vec<TileId>, StoreError>>;

    /// Payload size of a single entry, without reading it.
    ///
    /// Returns `Ok(None)` on a miss.
    fn size_of(&self, id: TileId) -> BoxFuture<'_, Result<Option<u64>, StoreError>>;

    /// Running total of payload bytes.
    fn size_bytes(&self) -> u64;

    /// Number of cached tiles.
    fn entry_count(&self) -> u64;

    /// Configured byte budget, if any.
    fn budget_bytes(&self) -> Option<u64>;

    /// Snapshot of the store's stats.
    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entry_count(),
            size_bytes: self.size_bytes(),
            budget_bytes: self.budget_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_fatality() {
        let io = StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        assert!(io.is_fatal());

        let full = StoreError::StorageExhausted {
            needed: 10,
            budget: 5,
        };
        assert!(!full.is_fatal());

        let corrupt = StoreError::Corrupt {
            tile: "3/1/2".to_string(),
            reason: "truncated".to_string(),
        };
        assert!(!corrupt.is_fatal());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::StorageExhausted {
            needed: 2048,
            budget: 1024,
        };
        let text = err.to_string();
        assert!(text.contains("2048"));
        assert!(text.contains("1024"));
    }

    #[test]
    fn test_cache_entry_size() {
        let entry = CacheEntry::new(TileId::new(3, 1, 2), Bytes::from_static(b"abcd"));
        assert_eq!(entry.size_bytes, 4);
        assert_eq!(entry.id.to_string(), "3/1/2");
    }
}
