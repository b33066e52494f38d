//! Recursive directory expansion.

use tracing::warn;

use crate::error::Result;
use crate::models::FileRecord;

use super::GitHubSource;

/// Flatten a directory tree in pre-order: each directory entry is followed by
/// its descendants before its siblings continue.
///
/// The root listing failing is an error; a failing *subtree* is not — that
/// subtree contributes no entries and the walk continues with its siblings.
/// Implemented with an explicit frame stack rather than recursion so listing
/// futures stay unboxed.
pub async fn walk(
    source: &GitHubSource,
    owner: &str,
    repo: &str,
    branch: &str,
    root_path: &str,
) -> Result<Vec<FileRecord>> {
    let root = source.list_directory(owner, repo, branch, root_path).await?;

    let mut collected = Vec::new();
    let mut frames: Vec<std::vec::IntoIter<FileRecord>> = vec![root.into_iter()];

    loop {
        let next_entry = match frames.last_mut() {
            Some(frame) => frame.next(),
            None => break,
        };

        match next_entry {
            Some(entry) => {
                let descend = entry.is_dir();
                let path = entry.path.clone();
                collected.push(entry);

                if descend {
                    match source.list_directory(owner, repo, branch, &path).await {
                        Ok(children) => frames.push(children.into_iter()),
                        Err(e) => {
                            warn!("Skipping subtree {}/{} at {}: {}", owner, repo, path, e);
                        }
                    }
                }
            }
            None => {
                frames.pop();
            }
        }
    }

    Ok(collected)
}
