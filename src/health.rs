//! Dependency Health Probe: a background loop per configured dependency that
//! maintains a cached, bounded-latency view of reachability so `/health`
//! never blocks on a slow or hung dependency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::graph::GraphHandle;

/// One dependency's last-observed reachability.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DependencyStatus {
    /// Never probed yet.
    Unknown,
    /// Last probe succeeded.
    Connected {
        /// Measured round-trip latency, non-negative.
        latency_ms: u64,
    },
    /// Last probe failed.
    Unavailable {
        /// Short classification, e.g. "connection refused" or "timeout".
        error: String,
    },
}

/// Cached dependency statuses, written only by probe tasks and read only by
/// the `/health` handler. Updates are atomic whole-record swaps; no reader
/// ever observes a partially-updated record.
#[derive(Clone)]
pub struct HealthCache {
    statuses: Arc<RwLock<HashMap<String, DependencyStatus>>>,
}

impl HealthCache {
    fn new(names: impl IntoIterator<Item = String>) -> Self {
        let statuses = names.into_iter().map(|name| (name, DependencyStatus::Unknown)).collect();
        Self {
            statuses: Arc::new(RwLock::new(statuses)),
        }
    }

    /// Snapshot the current dependency status map.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, DependencyStatus> {
        self.statuses.read().clone()
    }

    fn set(&self, name: &str, status: DependencyStatus) {
        self.statuses.write().insert(name.to_string(), status);
    }
}

/// Owns the background probe tasks for every configured dependency.
pub struct HealthProbe {
    cache: HealthCache,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl HealthProbe {
    /// Start one background task per configured dependency. The probe loop
    /// begins immediately and does not gate port binding.
    #[must_use]
    pub fn start(settings: &Settings, graph: Arc<GraphHandle>) -> Self {
        let cache = HealthCache::new(settings.dependencies.keys().cloned());
        let (shutdown_tx, _) = broadcast::channel(1);
        let interval = Duration::from_secs(settings.monitoring.health_check_interval);

        let mut handles = Vec::new();
        for (name, dep) in &settings.dependencies {
            let name = name.clone();
            let timeout = Duration::from_millis(dep.timeout);
            let cache = cache.clone();
            let graph = Arc::clone(&graph);
            let mut shutdown_rx = shutdown_tx.subscribe();

            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            probe_once(&name, &graph, timeout, &cache).await;
                        }
                        _ = shutdown_rx.recv() => {
                            debug!(dependency = %name, "health probe stopping");
                            break;
                        }
                    }
                }
            });
            handles.push(handle);
        }

        Self {
            cache,
            shutdown_tx,
            handles,
        }
    }

    /// The shared, read-only cache view handlers consult.
    #[must_use]
    pub fn cache(&self) -> HealthCache {
        self.cache.clone()
    }

    /// Signal every probe task to stop and wait up to `deadline` for them to
    /// exit. Any exception inside a probe body is already caught inside
    /// `probe_once`, so this can only time out on a genuinely wedged task.
    pub async fn stop(self, deadline: Duration) {
        let _ = self.shutdown_tx.send(());
        let joined = join_all_handles(self.handles);
        if tokio::time::timeout(deadline, joined).await.is_err() {
            warn!("health probe tasks did not stop within the shutdown deadline");
        }
    }
}

async fn join_all_handles(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

async fn probe_once(name: &str, graph: &GraphHandle, timeout: Duration, cache: &HealthCache) {
    match graph.ping(timeout).await {
        Ok(latency) => {
            cache.set(
                name,
                DependencyStatus::Connected {
                    latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                },
            );
        }
        Err(crate::error::Error::Timeout(_)) => {
            cache.set(
                name,
                DependencyStatus::Unavailable {
                    error: "timeout".to_string(),
                },
            );
        }
        Err(err) => {
            cache.set(
                name,
                DependencyStatus::Unavailable {
                    error: classify(&err),
                },
            );
        }
    }
}

fn classify(err: &crate::error::Error) -> String {
    let text = err.to_string();
    if text.contains("refused") {
        "connection refused".to_string()
    } else {
        "unreachable".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_cache_starts_unknown() {
        let cache = HealthCache::new(vec!["memgraph".to_string()]);
        assert_eq!(cache.snapshot().get("memgraph"), Some(&DependencyStatus::Unknown));
    }

    #[test]
    fn set_replaces_whole_record() {
        let cache = HealthCache::new(vec!["memgraph".to_string()]);
        cache.set("memgraph", DependencyStatus::Connected { latency_ms: 12 });
        assert_eq!(
            cache.snapshot().get("memgraph"),
            Some(&DependencyStatus::Connected { latency_ms: 12 })
        );
    }
}
