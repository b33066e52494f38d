//! Repository metadata records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GitScoutError, Result};

/// Metadata for a single repository, normalized from either the REST API or
/// the scraped repository list.
///
/// Records are created when a user's repository list is fetched and held in
/// memory for the browse session; they are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: String,
    /// Canonical web URL.
    pub url: String,
    pub clone_url: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub forks: u32,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Repository {
    /// Full `owner/name` coordinate.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Split an `owner/repo` coordinate on the first slash.
///
/// Accepts the bare form and full `github.com` URLs; trailing `.git` on the
/// repository name is stripped.
pub fn parse_coordinate(input: &str) -> Result<(String, String)> {
    let trimmed = input.trim().trim_matches('/');

    // Strip scheme and host if a full URL was given.
    let path = match trimmed.find("github.com/") {
        Some(idx) => &trimmed[idx + "github.com/".len()..],
        None => trimmed,
    };

    let (owner, repo) = path.split_once('/').ok_or_else(|| GitScoutError::Config {
        message: format!("Invalid repository coordinate: {input}"),
    })?;
    let repo = repo.trim_matches('/');
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return Err(GitScoutError::Config {
            message: format!("Invalid repository coordinate: {input}"),
        });
    }

    Ok((owner.to_string(), repo.to_string()))
}
