//! Upstream HTTP fetch for the worker.
//!
//! ### Behaviour
//! - Any HTTP status resolves to `Ok`; the worker decides what to cache.
//! - Transport failures (DNS, connect, TLS, timeout) resolve to
//!   `Error::Network`, which the worker treats as "offline".
//! - Bodies are fully buffered and capped at `max_bytes`.
//! - Content is decoded (gzip/brotli/deflate) before it is returned, so the
//!   encoding and framing headers are dropped from the captured response.

pub mod url;

use bytes::Bytes;
use http::{HeaderMap, header};
use reqwest::Client;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use seamcache_core::{AppConfig, Error, Network, Request, Response};

pub use url::{UrlError, canonicalize};

/// Headers that describe a single hop and never travel with a captured
/// request or response.
fn hop_headers() -> [header::HeaderName; 9] {
    [
        header::CONNECTION,
        header::CONTENT_LENGTH,
        header::HOST,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ]
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "seamcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "seamcache/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// Remove hop-by-hop headers, plus any the caller names.
fn strip_headers(headers: &mut HeaderMap, extra: &[header::HeaderName]) {
    for name in hop_headers().iter().chain(extra) {
        headers.remove(name);
    }
}

/// reqwest-backed implementation of [`Network`].
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Bytes, Error> {
        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        Ok(bytes)
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let mut headers = request.headers.clone();
        // reqwest negotiates and decodes compression itself
        strip_headers(&mut headers, &[header::ACCEPT_ENCODING]);

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.as_str())
            .headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Network(format!("timeout: {}", e))
            } else {
                Error::Network(format!("network error: {}", e))
            }
        })?;

        let status = response.status();
        let mut headers = response.headers().clone();
        strip_headers(&mut headers, &[header::CONTENT_ENCODING]);

        let body = self.read_body(response).await?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched upstream"
        );

        Ok(Response { status, headers, body })
    }
}
