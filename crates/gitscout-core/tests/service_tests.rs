//! Integration tests for the public service facade.
//!
//! These drive the whole stack — facade, resolver, cache, retry, download
//! pool — over a scripted transport injected at the public seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gitscout_core::{
    header_map, DownloadService, GitHubSource, HttpClient, ListingState, NetworkMonitor,
    RepoService, Repository, RetryConfig, Transport, TransportRequest, TransportResponse,
    WorkDirs,
};
use reqwest::StatusCode;
use tempfile::TempDir;

/// Scripted transport: routes by URL substring, counts every request.
struct FakeGitHub {
    routes: Mutex<Vec<(String, StatusCode, String)>>,
    calls: AtomicU32,
    calls_by_url: Mutex<HashMap<String, u32>>,
}

impl FakeGitHub {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            calls_by_url: Mutex::new(HashMap::new()),
        })
    }

    fn route(&self, fragment: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .push((fragment.to_string(), status, body.to_string()));
    }

    fn calls_to(&self, fragment: &str) -> u32 {
        self.calls_by_url
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.contains(fragment))
            .map(|(_, count)| count)
            .sum()
    }
}

#[async_trait]
impl Transport for FakeGitHub {
    async fn execute(&self, request: TransportRequest) -> gitscout_core::Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_url
            .lock()
            .unwrap()
            .entry(request.url.clone())
            .or_insert(0) += 1;

        let routes = self.routes.lock().unwrap();
        for (fragment, status, body) in routes.iter() {
            if request.url.contains(fragment.as_str()) {
                return Ok(TransportResponse::from_bytes(
                    *status,
                    header_map(&[]),
                    body.clone(),
                ));
            }
        }
        Ok(TransportResponse::from_bytes(
            StatusCode::NOT_FOUND,
            header_map(&[]),
            "",
        ))
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        delay_offset: Duration::from_millis(1),
        max_rate_limit_wait: Duration::from_secs(300),
    }
}

fn build_service(transport: Arc<FakeGitHub>) -> (Arc<RepoService>, TempDir) {
    let temp = TempDir::new().unwrap();
    let http = Arc::new(HttpClient::with_transport(transport));
    let source = Arc::new(
        GitHubSource::new(
            Arc::clone(&http),
            temp.path().join("cache"),
            Duration::from_secs(3600),
        )
        .with_retry_config(fast_retry()),
    );
    let monitor = Arc::new(NetworkMonitor::new(Arc::clone(&http)));
    let downloads = DownloadService::new(http, 3);
    let service = Arc::new(RepoService::new(
        source,
        monitor,
        downloads,
        WorkDirs::new(temp.path()),
    ));
    (service, temp)
}

fn contents_json(entries: &[(&str, &str, &str)]) -> String {
    let items: Vec<serde_json::Value> = entries
        .iter()
        .map(|(name, path, kind)| {
            serde_json::json!({
                "name": name,
                "path": path,
                "type": kind,
                "size": 10,
                "sha": "abc",
                "download_url": if *kind == "file" {
                    format!("https://raw.githubusercontent.com/octocat/demo/main/{path}")
                } else {
                    String::new()
                },
            })
        })
        .collect();
    serde_json::to_string(&items).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn browse_flow_end_to_end() {
    let github = FakeGitHub::new();
    github.route(
        "/users/octocat/repos",
        StatusCode::OK,
        r#"[{
            "name": "demo",
            "html_url": "https://github.com/octocat/demo",
            "clone_url": "https://github.com/octocat/demo.git",
            "description": "demo repository",
            "stargazers_count": 5,
            "forks_count": 2,
            "default_branch": "main",
            "language": "Rust"
        }]"#,
    );
    github.route(
        "/repos/octocat/demo/contents/?ref=main",
        StatusCode::OK,
        &contents_json(&[
            ("src", "src", "dir"),
            ("README.md", "README.md", "file"),
        ]),
    );
    github.route(
        "/repos/octocat/demo/contents/README.md?ref=main",
        StatusCode::OK,
        // "# demo\n" base64-encoded, as the contents API inlines it.
        r#"{
            "name": "README.md",
            "path": "README.md",
            "type": "file",
            "encoding": "base64",
            "content": "IyBkZW1vCg=="
        }"#,
    );
    github.route(
        "/repos/octocat/demo",
        StatusCode::OK,
        r#"{"default_branch": "main"}"#,
    );

    let (service, _temp) = build_service(github);

    let repos = service.user_repositories("octocat").await;
    assert_eq!(repos.len(), 1);
    assert_eq!(repos[0].full_name(), "octocat/demo");
    assert_eq!(repos[0].description, "demo repository");

    let files = service
        .repository_files("octocat", "demo", "main", "")
        .await;
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    // Directories sort before files.
    assert_eq!(names, vec!["src", "README.md"]);

    let content = service
        .file_content("octocat", "demo", "README.md", "main")
        .await
        .unwrap();
    assert_eq!(content, "# demo\n");

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_listing_served_from_cache_without_network() {
    let github = FakeGitHub::new();
    github.route(
        "/repos/octocat/demo/contents/src?ref=main",
        StatusCode::OK,
        &contents_json(&[("lib.rs", "src/lib.rs", "file")]),
    );
    let (service, _temp) = build_service(github.clone());

    let first = service
        .repository_files("octocat", "demo", "main", "src")
        .await;
    let network_calls = github.calls.load(Ordering::SeqCst);

    let second = service
        .repository_files("octocat", "demo", "main", "src")
        .await;

    // Identical result, byte for byte, and not one additional request.
    assert_eq!(first, second);
    assert_eq!(github.calls.load(Ordering::SeqCst), network_calls);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn api_outage_degrades_to_scraping_transparently() {
    let github = FakeGitHub::new();
    github.route("api.github.com", StatusCode::SERVICE_UNAVAILABLE, "");
    github.route(
        "/tree/main/src",
        StatusCode::OK,
        r#"
        <table>
          <tr class="react-directory-row">
            <td><svg class="icon-directory"></svg></td>
            <td><a class="Link--primary" href="/octocat/demo/tree/main/src/nested">nested</a></td>
          </tr>
          <tr class="react-directory-row">
            <td><svg class="icon-file"></svg></td>
            <td><a class="Link--primary" href="/octocat/demo/blob/main/src/lib.rs">lib.rs</a></td>
          </tr>
        </table>
        "#,
    );
    let (service, _temp) = build_service(github);

    let files = service
        .repository_files("octocat", "demo", "main", "src")
        .await;

    assert_eq!(files.len(), 2);
    assert!(files[0].is_dir());
    assert_eq!(files[0].path, "src/nested");
    assert_eq!(files[1].name, "lib.rs");
    // Scraped records carry the synthesized raw URL and no hash.
    assert!(files[1].url.contains("raw.githubusercontent.com"));
    assert!(files[1].sha.is_empty());

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn directory_download_rebases_and_writes_files() {
    let github = FakeGitHub::new();
    github.route(
        "/repos/octocat/demo/contents/src/main?ref=main",
        StatusCode::OK,
        &contents_json(&[
            ("util.py", "src/main/util.py", "file"),
            ("deep", "src/main/deep", "dir"),
        ]),
    );
    github.route(
        "/repos/octocat/demo/contents/src/main/deep?ref=main",
        StatusCode::OK,
        &contents_json(&[("inner.py", "src/main/deep/inner.py", "file")]),
    );
    github.route(
        "raw.githubusercontent.com/octocat/demo/main/src/main/util.py",
        StatusCode::OK,
        "util-bytes",
    );
    github.route(
        "raw.githubusercontent.com/octocat/demo/main/src/main/deep/inner.py",
        StatusCode::OK,
        "inner-bytes",
    );
    let (service, temp) = build_service(github);

    let dest = temp.path().join("downloads").join("demo-src-main");
    let ok = service
        .download_directory("octocat", "demo", "src/main", &dest, "main")
        .await;

    assert!(ok);
    // The requested root is stripped before joining to the destination.
    assert_eq!(
        std::fs::read_to_string(dest.join("util.py")).unwrap(),
        "util-bytes"
    );
    assert_eq!(
        std::fs::read_to_string(dest.join("deep").join("inner.py")).unwrap(),
        "inner-bytes"
    );
    assert!(!dest.join("src").exists());

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn prefetch_pool_fills_listing_map_for_all_repos() {
    let github = FakeGitHub::new();
    for name in ["alpha", "beta", "gamma"] {
        github.route(
            &format!("/repos/octocat/{name}/contents/?ref=main"),
            StatusCode::OK,
            &contents_json(&[("file.rs", "file.rs", "file")]),
        );
    }
    let (service, _temp) = build_service(github.clone());

    let repo = |name: &str| Repository {
        name: name.to_string(),
        owner: "octocat".into(),
        url: format!("https://github.com/octocat/{name}"),
        clone_url: format!("https://github.com/octocat/{name}.git"),
        default_branch: "main".into(),
        description: String::new(),
        stars: 0,
        forks: 0,
        language: String::new(),
        updated_at: None,
    };

    let repos: Vec<Repository> = ["alpha", "beta", "gamma"].iter().map(|n| repo(n)).collect();
    service.prefetch_listings("octocat", &repos).await;

    for name in ["alpha", "beta", "gamma"] {
        assert_eq!(
            service.listing_state(name).await,
            Some(ListingState::Fetched(1)),
            "listing for {name} should be ready"
        );
        assert_eq!(github.calls_to(&format!("/repos/octocat/{name}/contents/")), 1);
    }

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn not_found_user_yields_empty_listing() {
    let github = FakeGitHub::new();
    let (service, _temp) = build_service(github);

    // Both sources answer 404; the facade converts the typed not-found into
    // an empty list for the caller.
    let repos = service.user_repositories("nobody-here").await;
    assert!(repos.is_empty());

    service.shutdown().await;
}
