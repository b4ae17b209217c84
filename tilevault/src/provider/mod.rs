//! Remote tile source access.
//!
//! This module provides the traits and implementations for downloading
//! raster tiles from slippy-map HTTP sources, and the transient/permanent
//! failure classification the scheduler's retry logic relies on.

mod http;
mod source;
mod types;

pub use http::{HttpClient, ReqwestClient, DEFAULT_TIMEOUT_SECS};
pub use source::TileSource;
pub use types::{FetchError, SourceError, TileFetcher};

#[cfg(test)]
pub use http::tests::MockHttpClient;
