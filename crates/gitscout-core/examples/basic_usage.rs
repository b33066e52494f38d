//! Basic usage example - browse a user's repositories and print a file tree.

use anyhow::Result;
use gitscout_core::RepoService;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    // Get username from args or browse the classic demo account
    let username = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "octocat".to_string());

    let service = RepoService::bootstrap("./gitscout-data")?;

    println!("Fetching repositories for {}...", username);
    let repos = service.user_repositories(&username).await;

    if repos.is_empty() {
        println!("No repositories found (offline, or the user has none).");
        service.shutdown().await;
        return Ok(());
    }

    println!("Found {} repositories:", repos.len());
    for repo in &repos {
        println!(
            "  - {} [{}] {}★ {}⑂",
            repo.full_name(),
            repo.default_branch,
            repo.stars,
            repo.forks
        );
    }

    // Show the root listing of the first repository
    let first = &repos[0];
    println!("\nRoot of {}:", first.full_name());
    let files = service
        .repository_files(&first.owner, &first.name, &first.default_branch, "")
        .await;
    for record in files {
        let marker = if record.is_dir() { "/" } else { "" };
        println!("  {}{}", record.name, marker);
    }

    service.shutdown().await;
    Ok(())
}
