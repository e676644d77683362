//! Lifecycle Controller: strict startup ordering, signal-driven graceful
//! shutdown bounded by a configured deadline, idempotent tear-down.

use std::net::SocketAddr;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::graph::GraphHandle;
use crate::health::HealthProbe;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::registry::{tools::register_default_tools, RegistryBuilder};

use super::router::{create_router, AppState, INFLIGHT_PERMITS};

/// Owns the whole running process: registry, dependency probe, listener,
/// and the lifecycle state machine that gates all three.
pub struct Server {
    settings: Arc<Settings>,
}

impl Server {
    /// Construct a server from already-validated settings. Does not yet
    /// touch the network.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// Run the full startup sequence, serve until a shutdown signal arrives,
    /// then drain and tear down. Returns `Ok(())` for a clean exit within
    /// the graceful deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool registry fails to build, the graph-store
    /// handle cannot be constructed, or the listener fails to bind.
    pub async fn run(self) -> Result<()> {
        let lifecycle = Lifecycle::default();

        // 2. Construct tool registry; register all known tools.
        let mut builder = RegistryBuilder::new();
        register_default_tools(&mut builder)?;
        let registry = Arc::new(builder.build());
        info!(tool_count = registry.len(), "tool registry initialized");

        // 3. Establish a graph-store connection handle and start the probe.
        let memgraph = self
            .settings
            .dependencies
            .get("memgraph")
            .cloned()
            .unwrap_or_default();
        let graph = Arc::new(GraphHandle::connect(&memgraph, "neo4j", "").await?);
        let probe = HealthProbe::start(&self.settings, Arc::clone(&graph));
        let health_cache = probe.cache();

        // 4. Bind the HTTP listener.
        let addr: SocketAddr = format!("{}:{}", self.settings.service.host, self.settings.service.port)
            .parse()
            .map_err(|e| Error::Internal(format!("invalid bind address: {e}")))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal(format!("failed to bind {addr}: {e}")))?;
        let bind_time = Instant::now();

        // 5. Transition to serving and log a startup banner.
        lifecycle.set(LifecycleState::Healthy);
        info!(
            service = %self.settings.service.name,
            version = %self.settings.service.version,
            address = %addr,
            tools = registry.len(),
            "startup complete"
        );

        let inflight = Arc::new(Semaphore::new(INFLIGHT_PERMITS));
        let state = Arc::new(AppState {
            settings: Arc::clone(&self.settings),
            registry,
            lifecycle: lifecycle.clone(),
            health_cache,
            graph: Arc::clone(&graph),
            inflight: Arc::clone(&inflight),
            bind_time,
            inflight_count: AtomicI64::new(0),
        });

        let lifecycle_sync = lifecycle.clone();
        let cache_for_sync = state.health_cache.clone();
        let sync_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                let snapshot = cache_for_sync.snapshot();
                let all_connected = !snapshot.is_empty()
                    && snapshot
                        .values()
                        .all(|s| matches!(s, crate::health::DependencyStatus::Connected { .. }));
                lifecycle_sync.sync_with_dependencies(all_connected);
            }
        });

        let router = create_router(Arc::clone(&state));
        let shutdown_deadline = Duration::from_secs(self.settings.server.graceful_shutdown_seconds);

        // The deadline timer starts only once a shutdown signal actually
        // fires, not when the server starts: `deadline_rx` stays pending
        // for the whole serving period, so `forced` never races `serving`
        // until `shutdown_signal` resolves.
        let (deadline_tx, deadline_rx) = tokio::sync::oneshot::channel::<()>();
        let lifecycle_for_signal = lifecycle.clone();
        let shutdown_fut = async move {
            shutdown_signal(lifecycle_for_signal).await;
            let _ = deadline_tx.send(());
        };

        let serving = axum::serve(listener, router).with_graceful_shutdown(shutdown_fut);
        let forced = async {
            let _ = deadline_rx.await;
            tokio::time::sleep(shutdown_deadline).await;
        };

        // `axum::serve(..).with_graceful_shutdown(..)` only resolves once every
        // open connection finishes on its own; each tool call is separately
        // bounded by `server.timeout` (up to 300s), which can far exceed
        // `graceful_shutdown_seconds`. Racing the whole serve future against
        // `forced` is what actually makes `graceful_shutdown_seconds` the
        // authoritative bound: once it fires, `run` stops waiting on
        // `serving` and moves on to tear-down, in-flight connections or not.
        let exceeded_deadline = tokio::select! {
            result = serving => {
                result.map_err(|e| Error::Internal(format!("server loop failed: {e}")))?;
                false
            }
            () = forced => {
                warn!(deadline = ?shutdown_deadline, "graceful shutdown deadline exceeded; forcing shutdown with requests still in flight");
                true
            }
        };

        sync_handle.abort();

        // 4-5. Stop the dependency probe and release the graph-store handle.
        probe.stop(memgraph_probe_timeout(&self.settings)).await;
        drop(graph);

        lifecycle.set(LifecycleState::Stopped);

        if exceeded_deadline {
            return Err(Error::Internal("graceful shutdown deadline exceeded".to_string()));
        }
        Ok(())
    }
}

fn memgraph_probe_timeout(settings: &Settings) -> Duration {
    settings
        .dependencies
        .values()
        .map(|d| Duration::from_millis(d.timeout))
        .max()
        .unwrap_or(Duration::from_secs(1))
}

/// Waits for `SIGINT`, `SIGTERM`, or `SIGHUP` (treated as an alias for
/// graceful shutdown, per the Open Question decision in `DESIGN.md`).
/// A second signal during shutdown does not lengthen the deadline; the
/// lifecycle is already `ShuttingDown` by the time this resolves a second
/// time, so it is a no-op rather than a reset.
async fn shutdown_signal(lifecycle: Lifecycle) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sighup.recv() => {}
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received, draining in-flight requests");
    lifecycle.set(LifecycleState::ShuttingDown);
}
