//! Tilevault - offline map tile cache manager
//!
//! Tilevault is the offline subsystem of a field map viewer: given a
//! geographic region and a zoom range it computes the slippy-map tiles
//! covering them, downloads the tiles through a bounded worker pool,
//! persists them in a local store, and reports live progress — with
//! explicit operator confirmation in front of every bulk download or
//! bulk removal, because both can consume significant bandwidth and
//! storage.
//!
//! # Architecture
//!
//! - [`coord`] — pure tile address math (region → tile set)
//! - [`cache`] — durable key→bytes tile store behind a trait
//! - [`provider`] — remote tile source with failure classification
//! - [`progress`] — per-job atomic progress tracking and snapshots
//! - [`confirm`] — synchronous approval gate for bulk mutations
//! - [`scheduler`] — the job state machine and worker pool tying the
//!   pieces together
//!
//! # Example
//!
//! ```ignore
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//! use tilevault::cache::DiskTileStore;
//! use tilevault::confirm::AutoApprove;
//! use tilevault::config::VaultConfig;
//! use tilevault::coord::BoundingBox;
//! use tilevault::provider::{ReqwestClient, TileSource};
//! use tilevault::scheduler::{DownloadScheduler, SchedulerConfig};
//!
//! let config = VaultConfig::default();
//! let store = Arc::new(DiskTileStore::open(&config.cache.directory).await?);
//! let client = ReqwestClient::with_timeout(config.source.timeout())?;
//! let source = Arc::new(TileSource::new(
//!     &config.source.url_template,
//!     config.source.subdomains.clone(),
//!     client,
//! )?);
//! let scheduler = DownloadScheduler::new(
//!     store,
//!     source,
//!     Arc::new(AutoApprove),
//!     config.download.scheduler_config(),
//! );
//!
//! let bbox = BoundingBox::new(51.28, -0.51, 51.69, 0.33)?;
//! let zooms: BTreeSet<u8> = (10..=14).collect();
//! let job = scheduler.start_download(&bbox, &zooms)?;
//! let outcome = job.wait().await;
//! println!("{} of {} tiles cached", outcome.completed, outcome.total);
//! ```

pub mod cache;
pub mod confirm;
pub mod config;
pub mod coord;
pub mod progress;
pub mod provider;
pub mod scheduler;

pub use cache::{CacheStats, DiskTileStore, LruTileStore, MemoryTileStore, StoreError, TileStore};
pub use confirm::{ApprovalRequest, ConfirmationGate, Decision};
pub use coord::{BoundingBox, RegionError, TileId, ZoomRange};
pub use progress::{ProgressSnapshot, ProgressStream};
pub use provider::{FetchError, TileFetcher, TileSource};
pub use scheduler::{
    DownloadScheduler, JobHandle, JobId, JobState, RemovalScope, RetryPolicy, ScheduleError,
    SchedulerConfig,
};
