//! HTTP client with rate-limit awareness and status classification.
//!
//! Wraps a [`Transport`] with:
//! - Rate limit tracking from `X-RateLimit-*` response headers
//! - Classification of error statuses into the typed error taxonomy
//! - Bearer-token attachment for API requests only — scrape and raw-content
//!   requests always go out unauthenticated

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use tracing::debug;

use crate::error::{GitScoutError, Result};
use crate::network::transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

/// Rate limit state extracted from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    /// Remaining requests allowed.
    pub remaining: Option<u64>,
    /// Total request limit.
    pub limit: Option<u64>,
    /// Unix timestamp when the rate limit resets.
    pub reset: Option<u64>,
}

/// HTTP client for GitHub's three hosts: the REST API, the web UI (scraping),
/// and the raw-content host.
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    /// API token; attached only by [`HttpClient::get_api`].
    token: Option<String>,
    rate_limit_remaining: AtomicI64,
    rate_limit_limit: AtomicU64,
    rate_limit_reset: AtomicU64,
}

impl HttpClient {
    /// Create a client backed by the production transport.
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(Arc::new(ReqwestTransport::new()?)))
    }

    /// Create a client over an explicit transport (tests use this).
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            token: None,
            rate_limit_remaining: AtomicI64::new(-1),
            rate_limit_limit: AtomicU64::new(0),
            rate_limit_reset: AtomicU64::new(0),
        }
    }

    /// Attach a bearer token for API requests.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Get the rate limit state observed on the last API response.
    pub fn rate_limit_state(&self) -> RateLimitState {
        let remaining = self.rate_limit_remaining.load(Ordering::SeqCst);
        RateLimitState {
            remaining: (remaining >= 0).then_some(remaining as u64),
            limit: {
                let limit = self.rate_limit_limit.load(Ordering::SeqCst);
                (limit > 0).then_some(limit)
            },
            reset: {
                let reset = self.rate_limit_reset.load(Ordering::SeqCst);
                (reset > 0).then_some(reset)
            },
        }
    }

    /// GET against the structured API, with JSON accept header and the token
    /// if one is configured.
    pub async fn get_api(&self, url: &str) -> Result<TransportResponse> {
        let mut request =
            TransportRequest::get(url).header("Accept", "application/vnd.github.v3+json");
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        self.execute(request).await
    }

    /// Plain GET for scrape pages and raw-content URLs. Never authenticated.
    pub async fn get(&self, url: &str) -> Result<TransportResponse> {
        self.execute(TransportRequest::get(url)).await
    }

    /// HEAD request with a short timeout, used by connectivity probes.
    pub async fn head(&self, url: &str, timeout: Duration) -> Result<TransportResponse> {
        self.execute(TransportRequest::head(url).timeout(timeout))
            .await
    }

    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = request.url.clone();
        let response = self.transport.execute(request).await?;
        self.update_rate_limits(&response);
        self.classify(response, &url)
    }

    fn update_rate_limits(&self, response: &TransportResponse) {
        if let Some(num) = response
            .header("X-RateLimit-Remaining")
            .and_then(|v| v.parse::<i64>().ok())
        {
            self.rate_limit_remaining.store(num, Ordering::SeqCst);
        }
        if let Some(num) = response
            .header("X-RateLimit-Limit")
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.rate_limit_limit.store(num, Ordering::SeqCst);
        }
        if let Some(num) = response
            .header("X-RateLimit-Reset")
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.rate_limit_reset.store(num, Ordering::SeqCst);
        }

        let remaining = self.rate_limit_remaining.load(Ordering::SeqCst);
        let limit = self.rate_limit_limit.load(Ordering::SeqCst);
        if remaining >= 0 && limit > 0 {
            debug!("Rate limit: {}/{}", remaining, limit);
        }
    }

    /// Map an error status to the typed taxonomy; success passes through with
    /// the body untouched.
    fn classify(&self, response: TransportResponse, url: &str) -> Result<TransportResponse> {
        let status = response.status;

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(GitScoutError::NotFound {
                what: url.to_string(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset_epoch = response
                .header("Retry-After")
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| unix_now() + secs)
                .or_else(|| {
                    response
                        .header("X-RateLimit-Reset")
                        .and_then(|v| v.parse().ok())
                });
            return Err(GitScoutError::RateLimited {
                service: extract_domain(url),
                reset_epoch,
            });
        }

        // A 403 with the remaining counter at zero is a rate limit in
        // disguise; any other 403 is a plain API failure.
        if status == StatusCode::FORBIDDEN {
            let remaining = response
                .header("X-RateLimit-Remaining")
                .and_then(|v| v.parse::<u64>().ok());
            if remaining == Some(0) {
                let reset_epoch = response
                    .header("X-RateLimit-Reset")
                    .and_then(|v| v.parse().ok());
                return Err(GitScoutError::RateLimited {
                    service: extract_domain(url),
                    reset_epoch,
                });
            }
        }

        Err(GitScoutError::Api {
            message: format!("{} returned {}", extract_domain(url), status),
            status_code: Some(status.as_u16()),
        })
    }
}

/// Current time as a Unix timestamp in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extract the host from a URL, `"unknown"` when unparseable.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::transport::header_map;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport that replays scripted responses and records request headers.
    struct ScriptedTransport {
        responses: Mutex<Vec<(StatusCode, Vec<(String, String)>, &'static str)>>,
        seen_headers: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<(StatusCode, Vec<(String, String)>, &'static str)>) -> Self {
            Self {
                responses: Mutex::new(responses),
                seen_headers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
            self.seen_headers.lock().unwrap().push(request.headers);
            let (status, headers, body) = self.responses.lock().unwrap().remove(0);
            let pairs: Vec<(&str, &str)> = headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            Ok(TransportResponse::from_bytes(
                status,
                header_map(&pairs),
                body,
            ))
        }
    }

    fn rl_headers(remaining: &str, limit: &str, reset: &str) -> Vec<(String, String)> {
        vec![
            ("X-RateLimit-Remaining".into(), remaining.into()),
            ("X-RateLimit-Limit".into(), limit.into()),
            ("X-RateLimit-Reset".into(), reset.into()),
        ]
    }

    #[tokio::test]
    async fn test_rate_limit_headers_tracked() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            StatusCode::OK,
            rl_headers("42", "60", "1700000000"),
            "{}",
        )]));
        let client = HttpClient::with_transport(transport);

        client.get_api("https://api.github.com/repos/o/r").await.unwrap();

        let state = client.rate_limit_state();
        assert_eq!(state.remaining, Some(42));
        assert_eq!(state.limit, Some(60));
        assert_eq!(state.reset, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_404_maps_to_not_found() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            StatusCode::NOT_FOUND,
            vec![],
            "",
        )]));
        let client = HttpClient::with_transport(transport);

        let err = client
            .get_api("https://api.github.com/repos/o/missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_403_with_zero_remaining_is_rate_limited() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            StatusCode::FORBIDDEN,
            rl_headers("0", "60", "1700000123"),
            "",
        )]));
        let client = HttpClient::with_transport(transport);

        let err = client
            .get_api("https://api.github.com/repos/o/r")
            .await
            .unwrap_err();
        match err {
            GitScoutError::RateLimited { reset_epoch, .. } => {
                assert_eq!(reset_epoch, Some(1_700_000_123));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plain_403_is_api_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![(
            StatusCode::FORBIDDEN,
            vec![],
            "",
        )]));
        let client = HttpClient::with_transport(transport);

        let err = client
            .get_api("https://api.github.com/repos/o/r")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GitScoutError::Api {
                status_code: Some(403),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_token_attached_to_api_requests_only() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            (StatusCode::OK, vec![], "{}"),
            (StatusCode::OK, vec![], ""),
        ]));
        let client = HttpClient::with_transport(transport.clone())
            .with_token(Some("sekrit".to_string()));

        client.get_api("https://api.github.com/user").await.unwrap();
        client
            .get("https://raw.githubusercontent.com/o/r/main/README.md")
            .await
            .unwrap();

        let seen = transport.seen_headers.lock().unwrap();
        assert!(seen[0]
            .iter()
            .any(|(k, v)| k == "Authorization" && v == "Bearer sekrit"));
        assert!(!seen[1].iter().any(|(k, _)| k == "Authorization"));
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://api.github.com/repos/foo/bar"),
            "api.github.com"
        );
        assert_eq!(extract_domain("not a url"), "unknown");
    }
}
