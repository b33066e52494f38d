//! HTML scraping producer.
//!
//! The fallback source behind [`GitHubSource`](super::GitHubSource): parses
//! rendered web pages into the same record shapes the API produces. GitHub's
//! markup drifts; every function here degrades to "no data" on a selector
//! miss instead of failing.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::models::{sort_listing, EntryKind, FileRecord};

use super::api::raw_content_url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Extract the default branch from a repository page's branch picker.
pub(crate) fn parse_default_branch(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let button = selector("summary.Button--secondary");

    let text = document.select(&button).map(element_text).next()?;
    // The button renders as "Branch: main" or just the branch name.
    let branch = text.rsplit(':').next()?.trim();
    (!branch.is_empty()).then(|| branch.to_string())
}

/// Parse a tree page into a directory listing.
///
/// Rows link to `/{owner}/{repo}/tree/{branch}/{path}` for directories and
/// `/{owner}/{repo}/blob/{branch}/{path}` for files; the repo-relative path
/// is the third segment after the repository prefix. Sizes and hashes are not
/// rendered, so they stay at their unknown defaults.
pub(crate) fn parse_directory_listing(
    html: &str,
    owner: &str,
    repo: &str,
    branch: &str,
) -> Vec<FileRecord> {
    let document = Html::parse_document(html);
    let row_sel = selector("tr.react-directory-row");
    let icon_sel = selector("svg");
    let link_sel = selector("a.Link--primary");
    let repo_prefix = format!("/{owner}/{repo}/");

    let mut records = Vec::new();

    for row in document.select(&row_sel) {
        let Some(link) = row.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(rest) = href.split_once(repo_prefix.as_str()).map(|(_, r)| r) else {
            continue;
        };

        // rest = "tree/{branch}/{path}" or "blob/{branch}/{path}"
        let mut segments = rest.splitn(3, '/');
        let _route = segments.next();
        let _branch = segments.next();
        let Some(path) = segments.next().filter(|p| !p.is_empty()) else {
            continue;
        };

        let is_dir = row
            .select(&icon_sel)
            .next()
            .map(|icon| {
                icon.value()
                    .classes()
                    .any(|class| class.contains("icon-directory"))
            })
            .unwrap_or(false);

        let name = element_text(link);
        if name.is_empty() {
            continue;
        }

        let (kind, url) = if is_dir {
            (EntryKind::Dir, String::new())
        } else {
            (
                EntryKind::File,
                raw_content_url(owner, repo, path, branch),
            )
        };

        records.push(FileRecord {
            name,
            path: path.to_string(),
            kind,
            url,
            size: 0,
            sha: String::new(),
        });
    }

    sort_listing(&mut records);
    records
}

/// Extract a file's content from its rendered blob page: the code cells of
/// the highlight table, joined by newlines.
pub(crate) fn parse_file_content(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let cell_sel = selector("table.highlight td.blob-code");

    let lines: Vec<String> = document
        .select(&cell_sel)
        .map(|cell| cell.text().collect::<String>())
        .collect();

    if lines.is_empty() {
        debug!("No highlight table found in blob page");
        return None;
    }
    Some(lines.join("\n"))
}

/// Parse the repository names and hrefs from a profile's repositories tab.
pub(crate) fn parse_repository_list(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let heading_sel = selector("h3.wb-break-all a");

    document
        .select(&heading_sel)
        .filter_map(|link| {
            let name = element_text(link);
            let href = link.value().attr("href")?.to_string();
            (!name.is_empty()).then_some((name, href))
        })
        .collect()
}

/// Scrape star and fork counts from a repository page.
pub(crate) fn parse_repo_stats(html: &str, repo_path: &str) -> (u32, u32) {
    let document = Html::parse_document(html);
    let link_sel = selector("a");
    let stargazers_href = format!("{repo_path}/stargazers");

    let mut stars = 0;
    let mut forks = 0;

    for link in document.select(&link_sel) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if href == stargazers_href {
            stars = parse_count(&element_text(link));
        } else if href.contains("/forks") {
            forks = parse_count(&element_text(link));
        }
    }

    (stars, forks)
}

/// First whitespace token as a count, tolerating thousands separators.
fn parse_count(text: &str) -> u32 {
    text.split_whitespace()
        .next()
        .map(|token| token.replace(',', ""))
        .and_then(|token| token.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_branch() {
        let html = r#"<summary class="Button--secondary">Branch: develop</summary>"#;
        assert_eq!(parse_default_branch(html).as_deref(), Some("develop"));
    }

    #[test]
    fn test_parse_default_branch_missing() {
        assert_eq!(parse_default_branch("<html><body></body></html>"), None);
    }

    #[test]
    fn test_parse_directory_listing() {
        let html = r#"
        <table>
          <tr class="react-directory-row">
            <td><svg class="octicon icon-directory"></svg></td>
            <td><a class="Link--primary" href="/o/r/tree/main/src">src</a></td>
          </tr>
          <tr class="react-directory-row">
            <td><svg class="octicon icon-file"></svg></td>
            <td><a class="Link--primary" href="/o/r/blob/main/README.md">README.md</a></td>
          </tr>
        </table>
        "#;

        let records = parse_directory_listing(html, "o", "r", "main");
        assert_eq!(records.len(), 2);

        // Contract order: the directory sorts first.
        assert_eq!(records[0].name, "src");
        assert!(records[0].is_dir());
        assert!(records[0].url.is_empty());

        assert_eq!(records[1].name, "README.md");
        assert!(records[1].is_file());
        assert_eq!(
            records[1].url,
            "https://raw.githubusercontent.com/o/r/main/README.md"
        );
        assert_eq!(records[1].sha, "");
        assert_eq!(records[1].size, 0);
    }

    #[test]
    fn test_parse_directory_listing_nested_path() {
        let html = r#"
        <table><tr class="react-directory-row">
          <td><svg class="octicon icon-file"></svg></td>
          <td><a class="Link--primary" href="/o/r/blob/main/src/util/mod.rs">mod.rs</a></td>
        </tr></table>
        "#;
        let records = parse_directory_listing(html, "o", "r", "main");
        assert_eq!(records[0].path, "src/util/mod.rs");
    }

    #[test]
    fn test_parse_directory_listing_tolerates_drift() {
        // Markup without the expected row class yields no data, not a panic.
        let html = "<div><a href='/o/r/blob/main/x'>x</a></div>";
        assert!(parse_directory_listing(html, "o", "r", "main").is_empty());
    }

    #[test]
    fn test_parse_file_content() {
        let html = r#"
        <table class="highlight">
          <tr><td class="blob-num">1</td><td class="blob-code">fn main() {</td></tr>
          <tr><td class="blob-num">2</td><td class="blob-code">}</td></tr>
        </table>
        "#;
        assert_eq!(parse_file_content(html).unwrap(), "fn main() {\n}");
    }

    #[test]
    fn test_parse_file_content_missing_table() {
        assert!(parse_file_content("<html></html>").is_none());
    }

    #[test]
    fn test_parse_repository_list() {
        let html = r#"
        <h3 class="wb-break-all"><a href="/octocat/alpha">alpha</a></h3>
        <h3 class="wb-break-all"><a href="/octocat/beta">beta</a></h3>
        "#;
        let repos = parse_repository_list(html);
        assert_eq!(
            repos,
            vec![
                ("alpha".to_string(), "/octocat/alpha".to_string()),
                ("beta".to_string(), "/octocat/beta".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_repo_stats() {
        let html = r#"
        <a href="/o/r/stargazers">1,234 stars</a>
        <a href="/o/r/forks">56 forks</a>
        "#;
        assert_eq!(parse_repo_stats(html, "/o/r"), (1234, 56));
    }

    #[test]
    fn test_parse_repo_stats_missing() {
        assert_eq!(parse_repo_stats("<html></html>", "/o/r"), (0, 0));
    }
}
