//! Dual-source repository resolution.
//!
//! [`GitHubSource`] answers every lookup from the structured REST API first
//! and falls back to scraping the rendered web pages when the API cannot.
//! Both producers return the same normalized records, so callers are
//! source-agnostic.
//!
//! Cross-cutting wrappers compose in a fixed order: the response cache sits
//! outside the retry wrapper, so a fresh cache hit never touches retry logic,
//! while a live call is retried before its result is cached.

mod api;
mod scrape;
mod walker;

pub use walker::walk;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::cache::ResponseCache;
use crate::config::NetworkConfig;
use crate::error::{GitScoutError, Result};
use crate::models::{FileRecord, Repository};
use crate::network::{retry_async, HttpClient, RetryConfig};

/// Upper bound on scraped repository-list pages, in case pagination markup
/// stops terminating the loop.
const MAX_SCRAPE_PAGES: u32 = 50;

/// API-first, scrape-fallback source of repository data.
pub struct GitHubSource {
    http: Arc<HttpClient>,
    cache: ResponseCache,
    retry: RetryConfig,
}

impl GitHubSource {
    /// Create a source with the given cache location and TTL.
    pub fn new(http: Arc<HttpClient>, cache_dir: impl Into<PathBuf>, cache_ttl: Duration) -> Self {
        Self {
            http,
            cache: ResponseCache::new(cache_dir, cache_ttl),
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry schedule (tests shrink the delays).
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The HTTP client this source resolves through.
    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    /// Deterministic raw-content URL for a file.
    pub fn raw_content_url(&self, owner: &str, repo: &str, path: &str, branch: &str) -> String {
        api::raw_content_url(owner, repo, path, branch)
    }

    /// Resolve a repository's default branch.
    ///
    /// API first, branch-picker scrape second, `"main"` as the final guess
    /// when the repository exists but neither source names a branch.
    pub async fn resolve_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let args = [("owner", owner), ("repo", repo)];
        self.cache
            .get_or_fetch("default-branch", &args, || self.fetch_branch(owner, repo))
            .await
    }

    /// List one directory level, in contract order (directories first, then
    /// case-insensitive alphabetical).
    pub async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<Vec<FileRecord>> {
        let args = [
            ("owner", owner),
            ("repo", repo),
            ("branch", branch),
            ("path", path),
        ];
        self.cache
            .get_or_fetch("list-directory", &args, || {
                self.fetch_listing(owner, repo, branch, path)
            })
            .await
    }

    /// Recursively expand a directory into a flat pre-order listing.
    pub async fn walk(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        root_path: &str,
    ) -> Result<Vec<FileRecord>> {
        walker::walk(self, owner, repo, branch, root_path).await
    }

    /// Read a file's content, trying every strategy before giving up:
    /// contents API → raw URL for the branch → raw `master` → raw `main` →
    /// scraped blob page.
    pub async fn read_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<String> {
        let args = [
            ("owner", owner),
            ("repo", repo),
            ("path", path),
            ("branch", branch),
        ];
        self.cache
            .get_or_fetch("file-content", &args, || {
                self.fetch_content(owner, repo, path, branch)
            })
            .await
    }

    /// Fetch all repositories of a user.
    pub async fn user_repositories(&self, username: &str) -> Result<Vec<Repository>> {
        let args = [("username", username)];
        self.cache
            .get_or_fetch("user-repositories", &args, || {
                self.fetch_user_repositories(username)
            })
            .await
    }

    // Internal: retry plumbing

    async fn retried<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (result, stats) =
            retry_async(&self.retry, operation, GitScoutError::is_retryable).await;
        if stats.attempts > 1 {
            debug!("Source call took {} attempts", stats.attempts);
        }
        result
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.retried(|| async { self.http.get(url).await?.text().await })
            .await
    }

    // Internal: fallback chains

    async fn fetch_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let api_err = match self
            .retried(|| api::default_branch(&self.http, owner, repo))
            .await
        {
            Ok(branch) => return Ok(branch),
            Err(e) => e,
        };
        warn!(
            "API branch lookup for {}/{} failed, falling back to scraping: {}",
            owner, repo, api_err
        );

        let url = format!("{}/{}/{}", NetworkConfig::GITHUB_WEB_BASE, owner, repo);
        match self.fetch_page(&url).await {
            Ok(html) => match scrape::parse_default_branch(&html) {
                Some(branch) => Ok(branch),
                None => {
                    warn!(
                        "Branch picker not found for {}/{}, assuming 'main'",
                        owner, repo
                    );
                    Ok("main".to_string())
                }
            },
            Err(scrape_err) => {
                if api_err.is_not_found() && scrape_err.is_not_found() {
                    Err(GitScoutError::NotFound {
                        what: format!("{owner}/{repo}"),
                    })
                } else {
                    warn!(
                        "Scraping branch for {}/{} failed ({}), assuming 'main'",
                        owner, repo, scrape_err
                    );
                    Ok("main".to_string())
                }
            }
        }
    }

    async fn fetch_listing(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<Vec<FileRecord>> {
        let api_err = match self
            .retried(|| api::list_directory(&self.http, owner, repo, branch, path))
            .await
        {
            Ok(records) => return Ok(records),
            Err(e) => e,
        };
        warn!(
            "API listing for {}/{}:{} at {:?} failed, falling back to scraping: {}",
            owner, repo, branch, path, api_err
        );

        match self.fetch_page(&tree_url(owner, repo, branch, path)).await {
            Ok(html) => Ok(scrape::parse_directory_listing(&html, owner, repo, branch)),
            Err(scrape_err) => {
                if api_err.is_not_found() && scrape_err.is_not_found() {
                    Err(GitScoutError::NotFound {
                        what: format!("{owner}/{repo}:{branch}/{path}"),
                    })
                } else {
                    error!(
                        "Both sources failed listing {}/{} at {:?}: {}",
                        owner, repo, path, scrape_err
                    );
                    Ok(Vec::new())
                }
            }
        }
    }

    async fn fetch_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<String> {
        let mut all_not_found = true;

        match self
            .retried(|| api::file_content(&self.http, owner, repo, path, branch))
            .await
        {
            Ok(content) => return Ok(content),
            Err(e) => {
                warn!(
                    "API content fetch for {}/{}/{} failed, trying raw URLs: {}",
                    owner, repo, path, e
                );
                all_not_found &= e.is_not_found();
            }
        }

        for candidate in branch_candidates(branch) {
            let url = api::raw_content_url(owner, repo, path, &candidate);
            match self.fetch_page(&url).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    debug!("Raw fetch {} failed: {}", url, e);
                    all_not_found &= e.is_not_found();
                }
            }
        }

        let blob = format!(
            "{}/{}/{}/blob/{}/{}",
            NetworkConfig::GITHUB_WEB_BASE,
            owner,
            repo,
            branch,
            path
        );
        match self.fetch_page(&blob).await {
            Ok(html) => {
                if let Some(content) = scrape::parse_file_content(&html) {
                    return Ok(content);
                }
                // The page rendered but had no recognizable code table: the
                // file may be binary or too large to render.
                all_not_found = false;
            }
            Err(e) => {
                debug!("Blob page fetch failed: {}", e);
                all_not_found &= e.is_not_found();
            }
        }

        error!(
            "All content strategies exhausted for {}/{}/{}",
            owner, repo, path
        );
        if all_not_found {
            Err(GitScoutError::NotFound {
                what: format!("{owner}/{repo}/{path}"),
            })
        } else {
            Err(GitScoutError::ContentUnavailable {
                path: path.to_string(),
                message: "all retrieval strategies exhausted".to_string(),
            })
        }
    }

    async fn fetch_user_repositories(&self, username: &str) -> Result<Vec<Repository>> {
        let api_err = match self
            .retried(|| api::user_repositories(&self.http, username))
            .await
        {
            Ok(repos) => return Ok(repos),
            Err(e) => e,
        };
        warn!(
            "API repository list for {} failed, falling back to scraping: {}",
            username, api_err
        );

        match self.scrape_user_repositories(username).await {
            Ok(repos) => Ok(repos),
            Err(scrape_err) => {
                if api_err.is_not_found() && scrape_err.is_not_found() {
                    Err(GitScoutError::NotFound {
                        what: username.to_string(),
                    })
                } else {
                    error!(
                        "Both sources failed listing repositories for {}: {}",
                        username, scrape_err
                    );
                    Ok(Vec::new())
                }
            }
        }
    }

    async fn scrape_user_repositories(&self, username: &str) -> Result<Vec<Repository>> {
        let mut repositories = Vec::new();

        for page in 1..=MAX_SCRAPE_PAGES {
            let url = format!(
                "{}/{}?tab=repositories&page={}",
                NetworkConfig::GITHUB_WEB_BASE,
                username,
                page
            );
            let html = match self.fetch_page(&url).await {
                Ok(html) => html,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!("Repository list page {} failed, stopping: {}", page, e);
                    break;
                }
            };

            let entries = scrape::parse_repository_list(&html);
            if entries.is_empty() {
                break;
            }

            for (name, href) in entries {
                let (stars, forks) = self.scrape_repo_stats(&href).await;
                let default_branch = self
                    .resolve_branch(username, &name)
                    .await
                    .unwrap_or_else(|_| "main".to_string());

                repositories.push(Repository {
                    name,
                    owner: username.to_string(),
                    url: format!("{}{}", NetworkConfig::GITHUB_WEB_BASE, href),
                    clone_url: format!("{}{}.git", NetworkConfig::GITHUB_WEB_BASE, href),
                    default_branch,
                    // Not rendered on the listing page.
                    description: String::new(),
                    stars,
                    forks,
                    language: String::new(),
                    updated_at: None,
                });
            }
        }

        Ok(repositories)
    }

    async fn scrape_repo_stats(&self, repo_path: &str) -> (u32, u32) {
        let url = format!("{}{}", NetworkConfig::GITHUB_WEB_BASE, repo_path);
        match self.http.get(&url).await {
            Ok(response) => match response.text().await {
                Ok(html) => scrape::parse_repo_stats(&html, repo_path),
                Err(_) => (0, 0),
            },
            Err(e) => {
                warn!("Error scraping repo stats from {}: {}", repo_path, e);
                (0, 0)
            }
        }
    }
}

/// Web URL of a tree page.
fn tree_url(owner: &str, repo: &str, branch: &str, path: &str) -> String {
    if path.is_empty() {
        format!(
            "{}/{}/{}/tree/{}",
            NetworkConfig::GITHUB_WEB_BASE,
            owner,
            repo,
            branch
        )
    } else {
        format!(
            "{}/{}/{}/tree/{}/{}",
            NetworkConfig::GITHUB_WEB_BASE,
            owner,
            repo,
            branch,
            path
        )
    }
}

/// Branch candidates for raw-content fallback: the requested branch, then
/// `master` and `main`, skipping whichever equals the one already tried.
fn branch_candidates(branch: &str) -> Vec<String> {
    let mut candidates = vec![branch.to_string()];
    for fallback in ["master", "main"] {
        if !candidates.iter().any(|c| c.eq_ignore_ascii_case(fallback)) {
            candidates.push(fallback.to_string());
        }
    }
    candidates
}
