//! HTTP client abstraction for testability.

use std::time::Duration;

use bytes::Bytes;

use super::types::{FetchError, SourceError};
use crate::cache::BoxFuture;

/// Default per-request timeout in seconds. Exceeding it is a transient
/// failure.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Trait for HTTP GET operations.
///
/// This abstraction allows dependency injection and easier testing by
/// enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request, returning the response body.
    ///
    /// Failures are classified into [`FetchError::Transient`] and
    /// [`FetchError::Permanent`] by the implementation.
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Bytes, FetchError>>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the default timeout.
    pub fn new() -> Result<Self, SourceError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a client with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::ClientBuild(e.to_string()))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        let url = url.to_string();
        Box::pin(async move {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| classify_send_error(&e))?;

            let status = response.status().as_u16();
            if !response.status().is_success() {
                return Err(classify_status(status, &url));
            }

            // A reset mid-body is as retryable as a reset mid-handshake.
            let body = response.bytes().await.map_err(|e| {
                FetchError::transient(Some(status), format!("failed to read body: {}", e))
            })?;

            if body.is_empty() {
                return Err(FetchError::permanent(
                    Some(status),
                    format!("empty tile response from {}", url),
                ));
            }
            Ok(body)
        })
    }
}

/// Classifies a request error that produced no response.
fn classify_send_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::transient(None, "request timed out")
    } else if err.is_builder() || err.is_request() {
        FetchError::permanent(None, format!("malformed request: {}", err))
    } else {
        // Connect errors, resets, DNS hiccups.
        FetchError::transient(None, format!("connection failure: {}", err))
    }
}

/// Classifies a non-2xx status.
///
/// 429 is the one 4xx treated as transient: the server is telling us to
/// back off, not that the tile is gone.
fn classify_status(status: u16, url: &str) -> FetchError {
    let reason = format!("HTTP {} from {}", status, url);
    match status {
        429 | 500..=599 => FetchError::transient(Some(status), reason),
        _ => FetchError::permanent(Some(status), reason),
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Mock HTTP client for testing.
    pub struct MockHttpClient {
        pub response: Result<Bytes, FetchError>,
    }

    impl HttpClient for MockHttpClient {
        fn get(&self, _url: &str) -> BoxFuture<'_, Result<Bytes, FetchError>> {
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    #[tokio::test]
    async fn test_mock_client_success() {
        let mock = MockHttpClient {
            response: Ok(Bytes::from_static(b"\x89PNG")),
        };
        let result = mock.get("http://example.com").await;
        assert_eq!(result.unwrap(), Bytes::from_static(b"\x89PNG"));
    }

    #[tokio::test]
    async fn test_mock_client_error() {
        let mock = MockHttpClient {
            response: Err(FetchError::permanent(Some(404), "HTTP 404")),
        };
        assert!(mock.get("http://example.com").await.is_err());
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(classify_status(500, "http://t/1").is_transient());
        assert!(classify_status(503, "http://t/1").is_transient());
        assert!(classify_status(599, "http://t/1").is_transient());
    }

    #[test]
    fn test_rate_limit_is_transient() {
        assert!(classify_status(429, "http://t/1").is_transient());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        assert!(!classify_status(404, "http://t/1").is_transient());
        assert!(!classify_status(403, "http://t/1").is_transient());
        assert!(!classify_status(400, "http://t/1").is_transient());
    }

    #[test]
    fn test_redirect_like_statuses_are_permanent() {
        // reqwest follows redirects itself; one leaking through means the
        // source is misconfigured.
        assert!(!classify_status(301, "http://t/1").is_transient());
    }
}
