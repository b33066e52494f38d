//! Transport seam for HTTP execution.
//!
//! The resolver, monitor, and download workers all speak to the network
//! through the [`Transport`] trait. Production uses [`ReqwestTransport`];
//! tests swap in a scripted implementation to observe call counts and
//! concurrency without a live server.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::config::NetworkConfig;
use crate::error::{GitScoutError, Result};

/// A single outbound HTTP request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Per-request timeout override (connectivity probes use a short one).
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::HEAD,
            url: url.into(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// An HTTP response with a streaming body.
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: BoxStream<'static, Result<Bytes>>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &"<stream>")
            .finish()
    }
}

impl TransportResponse {
    /// Build a response from an in-memory body. Used by tests and anywhere a
    /// body is already fully buffered.
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers,
            body: stream::iter(vec![Ok(body)]).boxed(),
        }
    }

    /// Read a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Declared body length from `Content-Length`, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Consume the response, returning the body as a chunk stream.
    pub fn bytes_stream(self) -> BoxStream<'static, Result<Bytes>> {
        self.body
    }

    /// Collect the full body into memory.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut out = Vec::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(out))
    }

    /// Collect the body and decode as UTF-8 text (lossy, matching how a
    /// browser treats mixed encodings).
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Collect the body and parse as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| GitScoutError::Parse {
            message: format!("malformed JSON body: {e}"),
        })
    }
}

/// Executes HTTP requests. The one seam between GitScout and the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request, returning the response whatever its status code.
    /// Only connection-level failures (unreachable, timeout) are errors here;
    /// status classification happens in the client above.
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// Production transport backed by [`reqwest`].
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| GitScoutError::Network {
                message: format!("Failed to create HTTP client: {e}"),
                cause: None,
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = self.client.request(request.method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(GitScoutError::from)?;

        let status = response.status();
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers() {
            headers.insert(name.clone(), value.clone());
        }

        let body = response
            .bytes_stream()
            .map_err(GitScoutError::from)
            .boxed();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

/// Build a [`HeaderMap`] from string pairs, skipping invalid names or values.
pub fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(name, value);
        }
    }
    map
}
