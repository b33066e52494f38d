//! Network utilities: the transport seam, the rate-limit-aware HTTP client,
//! retry with backoff, and connectivity monitoring.

mod client;
mod monitor;
mod retry;
mod transport;

pub use client::{extract_domain, unix_now, HttpClient, RateLimitState};
pub use monitor::{ConnectivityState, MonitorConfig, NetworkMonitor};
pub use retry::{retry_async, RetryConfig, RetryStats};
pub use transport::{
    header_map, ReqwestTransport, Transport, TransportRequest, TransportResponse,
};
