//! Tile source addressed by URL template.
//!
//! Resolves tile ids to URLs via a template with `{z}`, `{x}`, `{y}`
//! placeholders and an optional `{s}` subdomain rotation, the scheme used
//! by OpenStreetMap-style raster sources
//! (`https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png`).

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use tracing::debug;

use super::http::HttpClient;
use super::types::{FetchError, SourceError, TileFetcher};
use crate::cache::BoxFuture;
use crate::coord::TileId;

/// A remote tile endpoint.
///
/// Generic over the HTTP client so tests can substitute a mock; the
/// scheduler consumes it as an `Arc<dyn TileFetcher>`.
pub struct TileSource<C: HttpClient> {
    template: String,
    subdomains: Vec<String>,
    next_subdomain: AtomicUsize,
    client: C,
}

impl<C: HttpClient> TileSource<C> {
    /// Creates a tile source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingPlaceholder`] when the template
    /// lacks `{z}`, `{x}` or `{y}`, and [`SourceError::NoSubdomains`]
    /// when it uses `{s}` without any subdomains configured.
    pub fn new(
        template: impl Into<String>,
        subdomains: Vec<String>,
        client: C,
    ) -> Result<Self, SourceError> {
        let template = template.into();
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !template.contains(placeholder) {
                return Err(SourceError::MissingPlaceholder { placeholder });
            }
        }
        if template.contains("{s}") && subdomains.is_empty() {
            return Err(SourceError::NoSubdomains);
        }
        Ok(Self {
            template,
            subdomains,
            next_subdomain: AtomicUsize::new(0),
            client,
        })
    }

    /// Builds the URL for a tile, rotating through the subdomain list to
    /// spread load the way browser map clients do.
    fn url_for(&self, id: TileId) -> String {
        let mut url = self
            .template
            .replace("{z}", &id.zoom.to_string())
            .replace("{x}", &id.x.to_string())
            .replace("{y}", &id.y.to_string());
        if url.contains("{s}") {
            let index = self.next_subdomain.fetch_add(1, Ordering::Relaxed);
            url = url.replace("{s}", &self.subdomains[index % self.subdomains.len()]);
        }
        url
    }
}

impl<C: HttpClient> TileFetcher for TileSource<C> {
    fn fetch(&self, id: TileId) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        Box::pin(async move {
            let url = self.url_for(id);
            debug!(tile = %id, url = %url, "Fetching tile");
            self.client.get(&url).await
        })
    }
}
