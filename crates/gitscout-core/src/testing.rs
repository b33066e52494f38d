//! Shared test fixtures. Compiled only for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::Result;
use crate::network::{header_map, Transport, TransportRequest, TransportResponse};

/// Transport that routes by URL substring and counts calls. Unrouted URLs
/// answer 404.
pub(crate) struct RouteTransport {
    routes: Mutex<Vec<(String, StatusCode, String)>>,
    pub(crate) calls: AtomicU32,
}

impl RouteTransport {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Route any URL containing `fragment` to the given response. Routes are
    /// matched in registration order.
    pub(crate) fn route(&self, fragment: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .push((fragment.to_string(), status, body.to_string()));
    }
}

#[async_trait]
impl Transport for RouteTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

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

/// Contents-API payload for a directory listing.
pub(crate) fn contents_json(entries: &[(&str, &str, &str)]) -> String {
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
                    format!("https://raw.githubusercontent.com/o/r/main/{path}")
                } else {
                    String::new()
                },
            })
        })
        .collect();
    serde_json::to_string(&items).unwrap()
}
