//! Git subprocess wrapper for cloning and updating repositories.
//!
//! The binary is a black box: its exit status is the only success signal.
//! Output is captured and logged, never parsed.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{GitScoutError, Result};

/// Clone `clone_url` into `dest_dir`, or update the working copy already
/// there.
///
/// An existing destination directory is assumed to be a prior clone and gets
/// a `git pull` instead of a fresh clone.
pub async fn clone_or_update(clone_url: &str, dest_dir: &Path) -> Result<()> {
    if dest_dir.exists() {
        debug!(
            "Repository directory {} already exists, pulling instead",
            dest_dir.display()
        );
        run_git(&["pull"], Some(dest_dir)).await?;
        info!("Updated existing repository at {}", dest_dir.display());
        return Ok(());
    }

    if let Some(parent) = dest_dir.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| GitScoutError::io_with_path(e, parent))?;
        }
    }

    let dest = dest_dir.to_string_lossy();
    run_git(&["clone", clone_url, dest.as_ref()], None).await?;
    info!("Cloned {} to {}", clone_url, dest_dir.display());
    Ok(())
}

async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<()> {
    let mut command = Command::new("git");
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let output = command.output().await.map_err(|e| GitScoutError::Git {
        message: format!("failed to run git {}: {}", args.join(" "), e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitScoutError::Git {
            message: format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            ),
        });
    }

    Ok(())
}
