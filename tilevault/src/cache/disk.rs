//! Durable on-disk tile store.
//!
//! One file per tile under `{root}/{z}/{x}/{y}.tile`. Writes land in a
//! temp file first and are renamed into place, so a concurrent reader of
//! the same tile sees either the old bytes or the new bytes, never a
//! partial write.
//!
//! Size accounting is seeded by scanning the tree at open time and kept
//! as a running total afterwards; the store never rescans during
//! operation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use crate::cache::traits::{BoxFuture, CacheEntry, StoreError, TileStore};
use crate::coord::TileId;

/// File extension for cached tiles. Payloads are opaque bytes; the
/// extension only marks the files as ours.
const TILE_EXT: &str = "tile";

/// Directory for in-flight writes, inside the cache root so renames stay
/// on one filesystem.
const TEMP_DIR: &str = ".tmp";

/// Durable tile store rooted at a directory.
///
/// Budget enforcement is strict: a `put` past the budget is rejected with
/// [`StoreError::StorageExhausted`] and existing files are untouched.
pub struct DiskTileStore {
    root: PathBuf,
    size: AtomicU64,
    entries: AtomicU64,
    budget: Option<u64>,
    temp_seq: AtomicU64,
}

impl DiskTileStore {
    /// Opens (and creates, if necessary) a store at `root`, scanning any
    /// existing tiles to seed the size accounting.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_budget(root, None).await
    }

    /// Opens a store that rejects writes past `budget_bytes`.
    pub async fn open_with_budget(
        root: impl Into<PathBuf>,
        budget_bytes: Option<u64>,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(TEMP_DIR)).await?;

        let (entries, size) = scan_tree(&root).await?;
        debug!(
            root = %root.display(),
            entries,
            size_bytes = size,
            "Opened disk tile store"
        );

        Ok(Self {
            root,
            size: AtomicU64::new(size),
            entries: AtomicU64::new(entries),
            budget: budget_bytes,
            temp_seq: AtomicU64::new(0),
        })
    }

    /// Directory this store is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tile_path(&self, id: TileId) -> PathBuf {
        self.root
            .join(id.zoom.to_string())
            .join(id.x.to_string())
            .join(format!("{}.{}", id.y, TILE_EXT))
    }

    fn next_temp_path(&self) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(TEMP_DIR)
            .join(format!("{}-{}.part", std::process::id(), seq))
    }

    async fn existing_len(&self, path: &Path) -> Result<Option<u64>, StoreError> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Atomically moves the size total from holding `replaced` bytes for
    /// a key to holding `incoming`, enforcing the budget via a CAS loop
    /// so concurrent writers cannot jointly overshoot it.
    fn commit_size(&self, replaced: u64, incoming: u64) -> Result<(), StoreError> {
        let Some(budget) = self.budget else {
            self.apply_delta(replaced, incoming);
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

    /// Reverses a committed size delta after a failed write.
    fn rollback_size(&self, replaced: u64, incoming: u64) {
        self.apply_delta(incoming, replaced);
    }

    fn apply_delta(&self, replaced: u64, incoming: u64) {
        if incoming >= replaced {
            self.size.fetch_add(incoming - replaced, Ordering::AcqRel);
        } else {
            self.size.fetch_sub(replaced - incoming, Ordering::AcqRel);
        }
    }
}

impl TileStore for DiskTileStore {
    fn get(&self, id: TileId) -> BoxFuture<'_, Result<Option<CacheEntry>, StoreError>> {
        Box::pin(async move {
            let path = self.tile_path(id);
            let meta = match fs::metadata(&path).await {
                Ok(meta) => meta,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            let bytes = match fs::read(&path).await {
                Ok(bytes) => Bytes::from(bytes),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            let stored_at = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            Ok(Some(CacheEntry {
                id,
                size_bytes: bytes.len() as u64,
                bytes,
                stored_at,
            }))
        })
    }

    fn put(&self, id: TileId, bytes: Bytes) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let path = self.tile_path(id);
            let incoming = bytes.len() as u64;

            let replaced = self.existing_len(&path).await?;
            if replaced == Some(incoming) {
                // Same length: only skip the write if the bytes match.
                if let Ok(existing) = fs::read(&path).await {
                    if existing == bytes {
                        return Ok(());
                    }
                }
            }

            // Reserve the size delta first so concurrent writers cannot
            // jointly overshoot the budget, then roll back if the write
            // fails.
            self.commit_size(replaced.unwrap_or(0), incoming)?;

            let written: Result<(), StoreError> = async {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                let temp = self.next_temp_path();
                fs::write(&temp, &bytes).await?;
                fs::rename(&temp, &path).await?;
                Ok(())
            }
            .await;

            if let Err(err) = written {
                self.rollback_size(replaced.unwrap_or(0), incoming);
                return Err(err);
            }

            if replaced.is_none() {
                self.entries.fetch_add(1, Ordering::AcqRel);
            }
            Ok(())
        })
    }

    fn delete(&self, id: TileId) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let path = self.tile_path(id);
            let Some(len) = self.existing_len(&path).await? else {
                return Ok(false);
            };
            match fs::remove_file(&path).await {
                Ok(()) => {
                    self.size.fetch_sub(len, Ordering::AcqRel);
                    self.entries.fetch_sub(1, Ordering::AcqRel);
                    Ok(true)
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<TileId>, StoreError>> {
        Box::pin(async move {
            let mut keys = Vec::new();
            let mut zoom_dirs = fs::read_dir(&self.root).await?;
            while let Some(zoom_dir) = zoom_dirs.next_entry().await? {
                let Some(zoom) = parse_component::<u8>(&zoom_dir.file_name()) else {
                    continue;
                };
                let mut x_dirs = fs::read_dir(zoom_dir.path()).await?;
                while let Some(x_dir) = x_dirs.next_entry().await? {
                    let Some(x) = parse_component::<u32>(&x_dir.file_name()) else {
                        continue;
                    };
                    let mut y_files = fs::read_dir(x_dir.path()).await?;
                    while let Some(y_file) = y_files.next_entry().await? {
                        if let Some(y) = parse_tile_stem(&y_file.file_name()) {
                            keys.push(TileId::new(zoom, x, y));
                        }
                    }
                }
            }
            Ok(keys)
        })
    }

    fn size_of(&self, id: TileId) -> BoxFuture<'_, Result<Option<u64>, StoreError>> {
        Box::pin(async move { self.existing_len(&self.tile_path(id)).await })
    }

    fn size_bytes(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    fn entry_count(&self) -> u64 {
        self.entries.load(Ordering::Acquire)
    }

    fn budget_bytes(&self) -> Option<u64> {
        self.budget
    }
}

/// Walks the tile tree counting entries and bytes.
async fn scan_tree(root: &Path) -> Result<(u64, u64), StoreError> {
    let mut entries = 0u64;
    let mut size = 0u64;

    let mut zoom_dirs = fs::read_dir(root).await?;
    while let Some(zoom_dir) = zoom_dirs.next_entry().await? {
        if parse_component::<u8>(&zoom_dir.file_name()).is_none() {
            continue;
        }
        let mut x_dirs = fs::read_dir(zoom_dir.path()).await?;
        while let Some(x_dir) = x_dirs.next_entry().await? {
            if parse_component::<u32>(&x_dir.file_name()).is_none() {
                continue;
            }
            let mut y_files = fs::read_dir(x_dir.path()).await?;
            while let Some(y_file) = y_files.next_entry().await? {
                if parse_tile_stem(&y_file.file_name()).is_some() {
                    entries += 1;
                    size += y_file.metadata().await?.len();
                }
            }
        }
    }
    Ok((entries, size))
}

fn parse_component<T: std::str::FromStr>(name: &std::ffi::OsStr) -> Option<T> {
    name.to_str()?.parse().ok()
}

/// Parses `"{y}.tile"` back to the row number.
fn parse_tile_stem(name: &std::ffi::OsStr) -> Option<u32> {
    let name = name.to_str()?;
    let stem = name.strip_suffix(&format!(".{}", TILE_EXT))?;
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tile(x: u32, y: u32) -> TileId {
        TileId::new(12, x, y)
    }

    #[tokio::test]
    async fn test_open_empty_directory() {
        let dir = tempdir().unwrap();
        let store = DiskTileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = DiskTileStore::open(dir.path()).await.unwrap();

        store.put(tile(10, 20), Bytes::from_static(b"imagery")).await.unwrap();

        let entry = store.get(tile(10, 20)).await.unwrap().unwrap();
        assert_eq!(entry.bytes, Bytes::from_static(b"imagery"));
        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.size_bytes(), 7);
    }

    #[tokio::test]
    async fn test_reopen_preserves_entries() {
        let dir = tempdir().unwrap();
        {
            let store = DiskTileStore::open(dir.path()).await.unwrap();
            store.put(tile(1, 1), Bytes::from_static(b"abc")).await.unwrap();
            store.put(tile(2, 2), Bytes::from_static(b"defg")).await.unwrap();
        }

        let reopened = DiskTileStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.entry_count(), 2);
        assert_eq!(reopened.size_bytes(), 7);
        assert!(reopened.get(tile(1, 1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_identical_put_leaves_size_unchanged() {
        let dir = tempdir().unwrap();
        let store = DiskTileStore::open(dir.path()).await.unwrap();

        store.put(tile(3, 3), Bytes::from_static(b"same")).await.unwrap();
        store.put(tile(3, 3), Bytes::from_static(b"same")).await.unwrap();

        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.size_bytes(), 4);
    }

    #[tokio::test]
    async fn test_overwrite_adjusts_size() {
        let dir = tempdir().unwrap();
        let store = DiskTileStore::open(dir.path()).await.unwrap();

        store.put(tile(3, 3), Bytes::from_static(b"old")).await.unwrap();
        store.put(tile(3, 3), Bytes::from_static(b"longer")).await.unwrap();

        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.size_bytes(), 6);
        let entry = store.get(tile(3, 3)).await.unwrap().unwrap();
        assert_eq!(entry.bytes, Bytes::from_static(b"longer"));
    }

    #[tokio::test]
    async fn test_delete_and_missing_delete() {
        let dir = tempdir().unwrap();
        let store = DiskTileStore::open(dir.path()).await.unwrap();

        store.put(tile(4, 4), Bytes::from_static(b"x")).await.unwrap();
        assert!(store.delete(tile(4, 4)).await.unwrap());
        assert!(!store.delete(tile(4, 4)).await.unwrap());
        assert_eq!(store.entry_count(), 0);
        assert_eq!(store.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_keys_lists_all_tiles() {
        let dir = tempdir().unwrap();
        let store = DiskTileStore::open(dir.path()).await.unwrap();

        store.put(TileId::new(5, 1, 2), Bytes::from_static(b"a")).await.unwrap();
        store.put(TileId::new(6, 3, 4), Bytes::from_static(b"b")).await.unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec![TileId::new(5, 1, 2), TileId::new(6, 3, 4)]);
    }

    #[tokio::test]
    async fn test_budget_rejects_oversized_put() {
        let dir = tempdir().unwrap();
        let store = DiskTileStore::open_with_budget(dir.path(), Some(5))
            .await
            .unwrap();

        store.put(tile(1, 1), Bytes::from_static(b"abc")).await.unwrap();
        let result = store.put(tile(2, 2), Bytes::from_static(b"defg")).await;

        assert!(matches!(
            result,
            Err(StoreError::StorageExhausted { needed: 4, budget: 5 })
        ));
        assert_eq!(store.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_size_of_uses_metadata() {
        let dir = tempdir().unwrap();
        let store = DiskTileStore::open(dir.path()).await.unwrap();

        store.put(tile(7, 7), Bytes::from_static(b"12345")).await.unwrap();
        assert_eq!(store.size_of(tile(7, 7)).await.unwrap(), Some(5));
        assert_eq!(store.size_of(tile(8, 8)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_distinct_tiles() {
        use std::sync::Arc;

        let dir = tempdir().unwrap();
        let store = Arc::new(DiskTileStore::open(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..20u32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .put(tile(i, i), Bytes::from(vec![i as u8; 50]))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.entry_count(), 20);
        assert_eq!(store.size_bytes(), 20 * 50);
    }
}
