//! Tile cache store.
//!
//! A durable key→bytes mapping keyed by tile address, behind the
//! dyn-compatible [`TileStore`] trait. Three providers:
//!
//! - [`DiskTileStore`] — durable, one file per tile, the production
//!   backend for offline use
//! - [`MemoryTileStore`] — exact accounting, strict budget; the test
//!   double and ephemeral backend
//! - [`LruTileStore`] — moka-backed, evicts automatically instead of
//!   rejecting writes

mod disk;
mod lru;
mod memory;
mod traits;

pub use disk::DiskTileStore;
pub use lru::LruTileStore;
pub use memory::MemoryTileStore;
pub use traits::{BoxFuture, CacheEntry, CacheStats, StoreError, TileStore};
