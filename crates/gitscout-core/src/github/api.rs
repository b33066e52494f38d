//! Structured REST API producer.
//!
//! One of the two sources behind [`GitHubSource`](super::GitHubSource). Each
//! function fetches from the JSON API and normalizes into the shared record
//! types; the scrape producer emits the identical shapes, so callers never
//! know which source answered.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::{GitScoutError, Result};
use crate::models::{sort_listing, EntryKind, FileRecord, Repository};
use crate::network::HttpClient;

/// Percent-encode a repository path, preserving the segment separators.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the raw-content URL for a file.
pub(crate) fn raw_content_url(owner: &str, repo: &str, path: &str, branch: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        NetworkConfig::GITHUB_RAW_BASE,
        owner,
        repo,
        branch,
        encode_path(path)
    )
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

/// Fetch a repository's default branch.
pub(crate) async fn default_branch(http: &HttpClient, owner: &str, repo: &str) -> Result<String> {
    let url = format!(
        "{}/repos/{}/{}",
        NetworkConfig::GITHUB_API_BASE,
        owner,
        repo
    );
    let info: RepoInfo = http.get_api(&url).await?.json().await?;
    Ok(info.default_branch)
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    sha: String,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

impl ContentsEntry {
    fn into_record(self) -> FileRecord {
        let kind = EntryKind::parse(&self.kind);
        let url = match kind {
            EntryKind::Dir => String::new(),
            EntryKind::File => self.download_url.unwrap_or_default(),
        };
        FileRecord {
            name: self.name,
            path: self.path,
            kind,
            url,
            size: self.size,
            sha: self.sha,
        }
    }
}

fn contents_url(owner: &str, repo: &str, path: &str, branch: &str) -> String {
    format!(
        "{}/repos/{}/{}/contents/{}?ref={}",
        NetworkConfig::GITHUB_API_BASE,
        owner,
        repo,
        encode_path(path),
        branch
    )
}

/// List a directory through the contents endpoint.
///
/// The endpoint returns an array for directories and a bare object for a
/// file path; both shapes normalize to a listing.
pub(crate) async fn list_directory(
    http: &HttpClient,
    owner: &str,
    repo: &str,
    branch: &str,
    path: &str,
) -> Result<Vec<FileRecord>> {
    let url = contents_url(owner, repo, path, branch);
    let value: serde_json::Value = http.get_api(&url).await?.json().await?;

    let entries: Vec<ContentsEntry> = match value {
        serde_json::Value::Array(_) => {
            serde_json::from_value(value).map_err(|e| GitScoutError::Parse {
                message: format!("unexpected contents payload: {e}"),
            })?
        }
        other => vec![serde_json::from_value(other).map_err(|e| GitScoutError::Parse {
            message: format!("unexpected contents payload: {e}"),
        })?],
    };

    let mut records: Vec<FileRecord> = entries.into_iter().map(ContentsEntry::into_record).collect();
    sort_listing(&mut records);
    Ok(records)
}

/// Read a file's content through the contents endpoint.
///
/// The API inlines small files as base64; larger ones only carry a
/// `download_url` to follow.
pub(crate) async fn file_content(
    http: &HttpClient,
    owner: &str,
    repo: &str,
    path: &str,
    branch: &str,
) -> Result<String> {
    let url = contents_url(owner, repo, path, branch);
    let entry: ContentsEntry = http.get_api(&url).await?.json().await?;

    if entry.encoding.as_deref() == Some("base64") {
        if let Some(ref content) = entry.content {
            // The API wraps the payload with newlines.
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| GitScoutError::Parse {
                    message: format!("invalid base64 content for {path}: {e}"),
                })?;
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
    }

    if let Some(download_url) = entry.download_url.filter(|u| !u.is_empty()) {
        debug!("Following contents download_url for {}", path);
        return http.get(&download_url).await?.text().await;
    }

    Err(GitScoutError::ContentUnavailable {
        path: path.to_string(),
        message: "contents endpoint returned neither inline content nor a download URL".into(),
    })
}

#[derive(Debug, Deserialize)]
struct ApiRepo {
    name: String,
    html_url: String,
    clone_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u32,
    #[serde(default)]
    forks_count: u32,
    default_branch: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl ApiRepo {
    fn into_repository(self, owner: &str) -> Repository {
        Repository {
            name: self.name,
            owner: owner.to_string(),
            url: self.html_url,
            clone_url: self.clone_url,
            default_branch: self.default_branch,
            description: self.description.unwrap_or_default(),
            stars: self.stargazers_count,
            forks: self.forks_count,
            language: self.language.unwrap_or_default(),
            updated_at: self.updated_at,
        }
    }
}

/// Fetch all of a user's repositories, paging until exhausted.
pub(crate) async fn user_repositories(
    http: &HttpClient,
    username: &str,
) -> Result<Vec<Repository>> {
    let mut repositories = Vec::new();
    let per_page = NetworkConfig::REPOS_PER_PAGE;

    for page in 1.. {
        let url = format!(
            "{}/users/{}/repos?per_page={}&page={}&sort=updated",
            NetworkConfig::GITHUB_API_BASE,
            username,
            per_page,
            page
        );
        let batch: Vec<ApiRepo> = http.get_api(&url).await?.json().await?;
        let count = batch.len();

        repositories.extend(batch.into_iter().map(|r| r.into_repository(username)));

        if count < per_page as usize {
            break;
        }
    }

    debug!(
        "Fetched {} repositories for {} from the API",
        repositories.len(),
        username
    );
    Ok(repositories)
}
