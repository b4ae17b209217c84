//! Fetcher traits and error taxonomy.

use bytes::Bytes;
use thiserror::Error;

use crate::cache::BoxFuture;
use crate::coord::TileId;

/// A per-tile fetch failure, classified by whether a retry could help.
///
/// The scheduler retries `Transient` failures with bounded backoff and
/// records `Permanent` failures immediately. Neither ever escalates to a
/// job failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeout, connection trouble, or a server-side condition that may
    /// clear on its own (5xx, 429).
    #[error("transient fetch failure: {reason}")]
    Transient {
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Human-readable cause.
        reason: String,
    },

    /// The request will never succeed as issued: 4xx responses, malformed
    /// or empty bodies.
    #[error("permanent fetch failure: {reason}")]
    Permanent {
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Human-readable cause.
        reason: String,
    },
}

impl FetchError {
    /// Builds a transient failure.
    pub fn transient(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Transient {
            status,
            reason: reason.into(),
        }
    }

    /// Builds a permanent failure.
    pub fn permanent(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Permanent {
            status,
            reason: reason.into(),
        }
    }

    /// Returns true if a retry is eligible.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The HTTP status behind the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
        }
    }
}

/// Errors constructing a tile source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The URL template lacks a required placeholder.
    #[error("url template missing the {placeholder} placeholder")]
    MissingPlaceholder {
        /// The absent placeholder, e.g. `{z}`.
        placeholder: &'static str,
    },

    /// The template rotates subdomains but none were configured.
    #[error("url template uses {{s}} but no subdomains are configured")]
    NoSubdomains,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Fetches one tile's bytes from a remote tile source.
///
/// Dyn-compatible so the scheduler can hold an `Arc<dyn TileFetcher>`.
pub trait TileFetcher: Send + Sync {
    /// Downloads the payload for `id`.
    fn fetch(&self, id: TileId) -> BoxFuture<'_, Result<Bytes, FetchError>>;
}
