//! Repository service facade.
//!
//! The entry point callers talk to: every network-touching method is gated on
//! the connectivity monitor, results are converted into plain values (lists,
//! booleans) with detail going to the log, and the in-memory repository list
//! from the last fetch stays readable offline.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{DownloadConfig, NetworkConfig, Settings, WorkDirs};
use crate::download::DownloadService;
use crate::error::{GitScoutError, Result};
use crate::github::GitHubSource;
use crate::models::{FileRecord, Repository};
use crate::network::{HttpClient, MonitorConfig, NetworkMonitor};

/// Observable state of one repository's prefetched listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingState {
    /// A fetch is in flight; absence of data does not mean "empty".
    Pending,
    /// The listing arrived, possibly with zero entries.
    Fetched(usize),
}

enum ListingEntry {
    Pending,
    Ready(Vec<FileRecord>),
}

/// Facade over the source resolver, download pool, and connectivity monitor.
pub struct RepoService {
    source: Arc<GitHubSource>,
    monitor: Arc<NetworkMonitor>,
    downloads: Arc<DownloadService>,
    dirs: WorkDirs,
    /// Session-scoped repository list from the last successful fetch.
    repositories: RwLock<Vec<Repository>>,
    /// Per-repository listings accumulated by the prefetch pool.
    listings: Arc<RwLock<HashMap<String, ListingEntry>>>,
    prefetch_workers: usize,
}

impl RepoService {
    /// Wire a service from its parts.
    pub fn new(
        source: Arc<GitHubSource>,
        monitor: Arc<NetworkMonitor>,
        downloads: Arc<DownloadService>,
        dirs: WorkDirs,
    ) -> Self {
        Self {
            source,
            monitor,
            downloads,
            dirs,
            repositories: RwLock::new(Vec::new()),
            listings: Arc::new(RwLock::new(HashMap::new())),
            prefetch_workers: DownloadConfig::MAX_WORKERS,
        }
    }

    /// Build a fully wired service rooted at a working directory: settings
    /// overlay, token resolution, cache, download pool, and background
    /// connectivity monitoring.
    ///
    /// Spawns the monitor loop and download workers, so this must run inside
    /// a Tokio runtime.
    pub fn bootstrap(work_dir: impl Into<std::path::PathBuf>) -> Result<Arc<Self>> {
        let dirs = WorkDirs::new(work_dir);
        let settings = Settings::load(&dirs.settings_file());

        let http = Arc::new(HttpClient::new()?.with_token(settings.github_token()));
        let source = Arc::new(GitHubSource::new(
            Arc::clone(&http),
            dirs.cache_dir(),
            settings.cache_ttl(),
        ));
        let monitor = Arc::new(NetworkMonitor::with_config(
            Arc::clone(&http),
            MonitorConfig {
                offline_recheck_interval: std::time::Duration::from_secs(
                    settings.connection_check_interval_secs,
                ),
                ..MonitorConfig::default()
            },
        ));
        monitor.start_monitoring();

        let downloads = DownloadService::new(http, settings.max_concurrent_downloads);

        Ok(Arc::new(Self::new(source, monitor, downloads, dirs)))
    }

    /// The connectivity monitor backing the gate.
    pub fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    /// The underlying source resolver.
    pub fn source(&self) -> &Arc<GitHubSource> {
        &self.source
    }

    /// Fetch a user's repositories and remember them for the session.
    ///
    /// Offline or on failure this returns an empty list; the reason lands in
    /// the log, not the return value.
    pub async fn user_repositories(&self, username: &str) -> Vec<Repository> {
        if !self.monitor.is_connected() {
            warn!("No internet connection to fetch repositories");
            return Vec::new();
        }

        match self.source.user_repositories(username).await {
            Ok(repos) => {
                *self.repositories.write().await = repos.clone();
                repos
            }
            Err(e) => {
                error!("Error getting repositories for {}: {}", username, e);
                Vec::new()
            }
        }
    }

    /// The repository list from the last successful fetch. Available offline.
    pub async fn cached_repositories(&self) -> Vec<Repository> {
        self.repositories.read().await.clone()
    }

    /// List files in a repository directory.
    ///
    /// On the first listing of a session the provisional `main`/`master`
    /// branch is re-verified against the resolved default, so a wrong guess
    /// does not surface as a spurious empty listing.
    pub async fn repository_files(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Vec<FileRecord> {
        if !self.monitor.is_connected() {
            warn!("No internet connection to fetch repository files");
            return Vec::new();
        }

        let mut branch = branch.to_string();
        if path.is_empty() && (branch == "main" || branch == "master") {
            match self.source.resolve_branch(owner, repo).await {
                Ok(actual) if actual != branch => {
                    info!("Using actual default branch {} instead of {}", actual, branch);
                    branch = actual;
                }
                Ok(_) => {}
                Err(e) => warn!("Could not verify default branch: {}", e),
            }
        }

        match self.source.list_directory(owner, repo, &branch, path).await {
            Ok(records) => records,
            Err(e) => {
                error!("Error getting files for {}/{}: {}", owner, repo, e);
                Vec::new()
            }
        }
    }

    /// Read a file's content.
    pub async fn file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<String> {
        if !self.monitor.is_connected() {
            warn!("No internet connection to fetch file content");
            return Err(GitScoutError::Offline);
        }
        self.source.read_file(owner, repo, path, branch).await
    }

    /// Download a single URL to a destination path.
    pub async fn download_file(&self, url: &str, destination: &Path) -> bool {
        if !self.monitor.is_connected() {
            warn!("No internet connection to download file");
            return false;
        }

        match self.downloads.enqueue(url, destination, None) {
            Ok(task_id) => self.downloads.await_all(&[task_id], None).await,
            Err(e) => {
                error!("Error queueing download: {}", e);
                false
            }
        }
    }

    /// Download a repository directory tree under `destination`.
    ///
    /// Paths are rebased against the requested root: downloading `src/main`
    /// places `src/main/util.py` at `destination/util.py`.
    pub async fn download_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        destination: &Path,
        branch: &str,
    ) -> bool {
        if !self.monitor.is_connected() {
            warn!("No internet connection to download directory");
            return false;
        }

        let walked = match self.source.walk(owner, repo, branch, path).await {
            Ok(records) => records,
            Err(e) => {
                error!("Error walking {}/{} at {:?}: {}", owner, repo, path, e);
                return false;
            }
        };

        let root = path.trim_matches('/');
        let files: Vec<(String, String)> = walked
            .iter()
            .filter(|record| record.is_file() && !record.url.is_empty())
            .map(|record| (record.url.clone(), rebase_path(&record.path, root)))
            .collect();

        if files.is_empty() {
            debug!("No downloadable files under {}/{} at {:?}", owner, repo, path);
            return true;
        }

        match self.downloads.enqueue_all(&files, destination) {
            Ok(task_ids) => self.downloads.await_all(&task_ids, None).await,
            Err(e) => {
                error!("Error queueing directory download: {}", e);
                false
            }
        }
    }

    /// Clone a repository under the repositories directory, updating it when
    /// a working copy already exists. Boolean surface; detail goes to the
    /// log.
    pub async fn clone_repository(
        &self,
        owner: &str,
        repo: &str,
        clone_url: Option<&str>,
    ) -> bool {
        if !self.monitor.is_connected() {
            warn!("No internet connection to clone repository");
            return false;
        }

        let url = match clone_url {
            Some(url) => url.to_string(),
            None => format!("{}/{}/{}.git", NetworkConfig::GITHUB_WEB_BASE, owner, repo),
        };
        let dest = self.dirs.repositories_dir().join(repo);

        match crate::git::clone_or_update(&url, &dest).await {
            Ok(()) => true,
            Err(e) => {
                error!("Error cloning repository {}/{}: {}", owner, repo, e);
                false
            }
        }
    }

    /// Prefetch root listings for many repositories through a bounded worker
    /// pool.
    ///
    /// Every repository is marked [`ListingState::Pending`] up front; readers
    /// polling [`RepoService::listing_state`] concurrently can tell "being
    /// fetched" apart from "fetched and empty". Completes when every listing
    /// has landed.
    pub async fn prefetch_listings(&self, owner: &str, repos: &[Repository]) {
        if repos.is_empty() {
            return;
        }
        if !self.monitor.is_connected() {
            warn!("No internet connection to prefetch listings");
            return;
        }

        {
            let mut listings = self.listings.write().await;
            for repo in repos {
                listings.insert(repo.name.clone(), ListingEntry::Pending);
            }
        }

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        for repo in repos {
            let _ = queue_tx.send((repo.name.clone(), repo.default_branch.clone()));
        }
        drop(queue_tx);

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let worker_count = self.prefetch_workers.min(repos.len()).max(1);

        let handles: Vec<_> = (0..worker_count)
            .map(|_| {
                let queue_rx = Arc::clone(&queue_rx);
                let source = Arc::clone(&self.source);
                let listings = Arc::clone(&self.listings);
                let owner = owner.to_string();
                tokio::spawn(async move {
                    loop {
                        let job = { queue_rx.lock().await.recv().await };
                        let Some((name, branch)) = job else {
                            break;
                        };

                        let listing = match source.list_directory(&owner, &name, &branch, "").await
                        {
                            Ok(records) => records,
                            Err(e) => {
                                warn!("Prefetch listing failed for {}/{}: {}", owner, name, e);
                                Vec::new()
                            }
                        };
                        listings
                            .write()
                            .await
                            .insert(name, ListingEntry::Ready(listing));
                    }
                })
            })
            .collect();

        for handle in handles {
            let _ = handle.await;
        }
    }

    /// State of one repository's prefetched listing, `None` when it was never
    /// requested.
    pub async fn listing_state(&self, repo_name: &str) -> Option<ListingState> {
        let listings = self.listings.read().await;
        listings.get(repo_name).map(|entry| match entry {
            ListingEntry::Pending => ListingState::Pending,
            ListingEntry::Ready(records) => ListingState::Fetched(records.len()),
        })
    }

    /// A prefetched listing, once it is ready.
    pub async fn prefetched_listing(&self, repo_name: &str) -> Option<Vec<FileRecord>> {
        let listings = self.listings.read().await;
        match listings.get(repo_name) {
            Some(ListingEntry::Ready(records)) => Some(records.clone()),
            _ => None,
        }
    }

    /// Stop background work: the monitor loop and the download pool.
    pub async fn shutdown(&self) {
        self.monitor.stop_monitoring();
        self.downloads.shutdown().await;
    }
}

/// Strip the requested root from a walked path, yielding the
/// destination-relative remainder.
fn rebase_path(path: &str, root: &str) -> String {
    if root.is_empty() {
        return path.to_string();
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.trim_start_matches('/').to_string(),
        None => path.to_string(),
    }
}
