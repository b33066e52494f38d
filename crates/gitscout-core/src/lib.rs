//! GitScout Core - headless library for browsing and downloading GitHub
//! repositories.
//!
//! The core is a resilient retrieval layer: repository metadata, directory
//! trees, and file contents are resolved through the structured REST API
//! first and scraped from the rendered web pages when the API is unavailable,
//! with both sources normalized into one record shape. Results are cached on
//! disk under a TTL, calls are retried with backoff and rate-limit waits, and
//! downloads run through a bounded worker pool.
//!
//! Terminal rendering, argument parsing, and other user-facing concerns live
//! in the host application; this crate only exposes the service facade they
//! call.
//!
//! # Example
//!
//! ```rust,ignore
//! use gitscout_core::RepoService;
//!
//! #[tokio::main]
//! async fn main() -> gitscout_core::Result<()> {
//!     let service = RepoService::bootstrap("./gitscout-data")?;
//!
//!     let repos = service.user_repositories("octocat").await;
//!     println!("Found {} repositories", repos.len());
//!
//!     for record in service.repository_files("octocat", "hello-world", "main", "").await {
//!         println!("{} ({})", record.path, record.kind.as_str());
//!     }
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod download;
pub mod error;
pub mod git;
pub mod github;
pub mod models;
pub mod network;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use cache::ResponseCache;
pub use cancel::StopSignal;
pub use config::{DownloadConfig, NetworkConfig, PathsConfig, Settings, WorkDirs};
pub use download::{CompletionCallback, DownloadProgress, DownloadService, TaskStatus};
pub use error::{GitScoutError, Result};
pub use github::GitHubSource;
pub use models::{parse_coordinate, EntryKind, FileRecord, Repository};
pub use network::{
    header_map, ConnectivityState, HttpClient, NetworkMonitor, RetryConfig, Transport,
    TransportRequest, TransportResponse,
};
pub use service::{ListingState, RepoService};
