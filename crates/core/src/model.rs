//! Request/response model shared by the cache store, the fetch client and
//! the worker.
//!
//! Responses are captured snapshots: the body is fully buffered so it can be
//! stored, measured for eviction and replayed any number of times.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use url::Url;

use crate::Error;

/// Body of the synthetic response returned when neither the network nor the
/// cache can satisfy a request.
pub const UNAVAILABLE_BODY: &str = "Offline mode: resource unavailable";

/// What the caller intends to do with the response.
///
/// Mirrors the `Sec-Fetch-Dest` vocabulary. Only `Document` changes the
/// interceptor's behaviour; the rest are kept for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    #[default]
    Empty,
    Other,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` header value.
    pub fn from_fetch_dest(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "script" | "worker" | "sharedworker" | "serviceworker" => Destination::Script,
            "style" => Destination::Style,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            "" | "empty" => Destination::Empty,
            _ => Destination::Other,
        }
    }

    /// Infer the destination of an incoming request from its headers.
    ///
    /// `Sec-Fetch-Dest` wins when present. Otherwise a GET that accepts
    /// `text/html` is treated as a page load.
    pub fn infer(method: &Method, headers: &HeaderMap) -> Self {
        if let Some(dest) = headers.get("sec-fetch-dest").and_then(|v| v.to_str().ok()) {
            return Self::from_fetch_dest(dest);
        }

        let accepts_html = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"));

        if method == Method::GET && accepts_html { Destination::Document } else { Destination::Empty }
    }

    pub fn is_document(self) -> bool {
        self == Destination::Document
    }
}

/// An outgoing request as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub destination: Destination,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: Bytes::new(), destination: Destination::Empty }
    }

    /// A plain GET with no headers or body.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Whether the request only reads (the one method the cache may answer).
    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }
}

/// A captured response: status, headers and the full body.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }

    /// 200 response whose body is the serialized JSON value.
    pub fn json(value: &serde_json::Value) -> Result<Self, Error> {
        let body = serde_json::to_vec(value)?;
        let mut response = Self::new(StatusCode::OK, body);
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(response)
    }

    /// Synthetic 503 returned when a request cannot be satisfied at all.
    pub fn unavailable() -> Self {
        let mut response = Self::new(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY);
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Only plain 200 responses are worth storing.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn body_len(&self) -> u64 {
        self.body.len() as u64
    }
}

/// The network as seen by the worker.
///
/// Implementations resolve with any HTTP status; `Err` means the request never
/// produced a response (offline, DNS, timeout, oversized body).
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_from_fetch_dest() {
        assert_eq!(Destination::from_fetch_dest("document"), Destination::Document);
        assert_eq!(Destination::from_fetch_dest("Style"), Destination::Style);
        assert_eq!(Destination::from_fetch_dest("empty"), Destination::Empty);
        assert_eq!(Destination::from_fetch_dest("audio"), Destination::Other);
    }

    #[test]
    fn test_destination_infer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-dest", HeaderValue::from_static("image"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        assert_eq!(Destination::infer(&Method::GET, &headers), Destination::Image);
    }

    #[test]
    fn test_destination_infer_from_accept() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        assert!(Destination::infer(&Method::GET, &headers).is_document());
        assert!(!Destination::infer(&Method::POST, &headers).is_document());
        assert!(!Destination::infer(&Method::GET, &HeaderMap::new()).is_document());
    }

    #[test]
    fn test_unavailable_response() {
        let response = Response::unavailable();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body, Bytes::from_static(UNAVAILABLE_BODY.as_bytes()));
        assert!(!response.is_cacheable());
    }

    #[test]
    fn test_json_response() {
        let response = Response::json(&serde_json::json!({"foo": 1})).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
        let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value, serde_json::json!({"foo": 1}));
    }

    #[test]
    fn test_request_is_read() {
        let url = Url::parse("https://example.com/").unwrap();
        assert!(Request::get(url.clone()).is_read());
        assert!(!Request::new(Method::POST, url.clone()).is_read());
        assert!(!Request::new(Method::HEAD, url).is_read());
    }
}
