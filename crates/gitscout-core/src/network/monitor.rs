//! Background connectivity monitoring.
//!
//! A single owned state cell, written only by the prober, read by everyone
//! through [`NetworkMonitor::is_connected`]. The background loop re-checks
//! quickly while offline and lazily while online.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::GitScoutError;
use crate::network::client::HttpClient;

/// Network connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Network is available.
    Online = 0,
    /// Network is not available.
    Offline = 1,
    /// A probe is in flight.
    Checking = 2,
    /// No probe has completed yet.
    Unknown = 3,
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
            ConnectivityState::Checking => write!(f, "checking"),
            ConnectivityState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Atomic wrapper for [`ConnectivityState`].
struct AtomicConnectivityState(AtomicU8);

impl AtomicConnectivityState {
    fn new(state: ConnectivityState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> ConnectivityState {
        match self.0.load(Ordering::SeqCst) {
            0 => ConnectivityState::Online,
            1 => ConnectivityState::Offline,
            2 => ConnectivityState::Checking,
            _ => ConnectivityState::Unknown,
        }
    }

    fn store(&self, state: ConnectivityState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Configuration for connectivity probing.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// URLs to probe, in order of preference.
    pub probe_urls: Vec<String>,
    /// Timeout per probe request.
    pub probe_timeout: Duration,
    /// How often to re-check while offline.
    pub offline_recheck_interval: Duration,
    /// How often to verify while online.
    pub online_verify_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_urls: vec![
                NetworkConfig::GITHUB_API_BASE.to_string(),
                NetworkConfig::GITHUB_WEB_BASE.to_string(),
            ],
            probe_timeout: NetworkConfig::PROBE_TIMEOUT,
            offline_recheck_interval: NetworkConfig::OFFLINE_RECHECK_INTERVAL,
            online_verify_interval: NetworkConfig::ONLINE_VERIFY_INTERVAL,
        }
    }
}

/// Connectivity monitor: probes endpoints and exposes the verdict.
pub struct NetworkMonitor {
    http: Arc<HttpClient>,
    state: AtomicConnectivityState,
    config: MonitorConfig,
    monitoring_active: AtomicBool,
}

impl NetworkMonitor {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self::with_config(http, MonitorConfig::default())
    }

    pub fn with_config(http: Arc<HttpClient>, config: MonitorConfig) -> Self {
        Self {
            http,
            state: AtomicConnectivityState::new(ConnectivityState::Unknown),
            config,
            monitoring_active: AtomicBool::new(false),
        }
    }

    /// Current connectivity state.
    pub fn connectivity(&self) -> ConnectivityState {
        self.state.load()
    }

    /// Whether network operations should be attempted.
    ///
    /// Optimistic before the first probe completes: only a confirmed offline
    /// verdict gates operations, matching the assume-connected startup
    /// behavior.
    pub fn is_connected(&self) -> bool {
        self.state.load() != ConnectivityState::Offline
    }

    /// Probe now and return the fresh verdict.
    pub async fn check_now(&self) -> bool {
        let was_offline = self.state.load() == ConnectivityState::Offline;
        self.state.store(ConnectivityState::Checking);

        for url in &self.config.probe_urls {
            if self.probe(url).await {
                self.state.store(ConnectivityState::Online);
                if was_offline {
                    info!("Network connectivity restored");
                }
                return true;
            }
            debug!("Probe failed for {}", url);
        }

        self.state.store(ConnectivityState::Offline);
        if !was_offline {
            warn!("Network connectivity lost - all probe URLs failed");
        }
        false
    }

    /// HEAD-probe one URL. Any HTTP response at all proves the network is up;
    /// only connection-level failures count against it.
    async fn probe(&self, url: &str) -> bool {
        match self.http.head(url, self.config.probe_timeout).await {
            Ok(_) => true,
            // The server answered, even if it refused us.
            Err(GitScoutError::RateLimited { .. })
            | Err(GitScoutError::Api { .. })
            | Err(GitScoutError::NotFound { .. }) => true,
            Err(e) => {
                debug!("Probe request failed: {}", e);
                false
            }
        }
    }

    /// Spawn the background probe loop.
    pub fn start_monitoring(self: &Arc<Self>) {
        if self.monitoring_active.swap(true, Ordering::SeqCst) {
            debug!("Background monitoring already active");
            return;
        }

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            info!("Starting background connectivity monitoring");

            while monitor.monitoring_active.load(Ordering::SeqCst) {
                let interval = if monitor.is_connected() {
                    monitor.config.online_verify_interval
                } else {
                    monitor.config.offline_recheck_interval
                };

                tokio::time::sleep(interval).await;

                if !monitor.monitoring_active.load(Ordering::SeqCst) {
                    break;
                }

                monitor.check_now().await;
            }

            info!("Background connectivity monitoring stopped");
        });
    }

    /// Stop the background loop (takes effect at its next wakeup).
    pub fn stop_monitoring(&self) {
        self.monitoring_active.store(false, Ordering::SeqCst);
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring_active.load(Ordering::SeqCst)
    }
}
