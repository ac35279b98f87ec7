//! Service Kernel (§4.C / §5): the shared lifecycle every one of the five
//! services boots through. Grounded in the teacher's `main.rs` startup
//! sequence (logger init, router build, `axum::serve`) and extended with the
//! registry/heartbeat/shutdown steps `original_source/shared/` spreads
//! across `service_discovery.py` and the per-service `main.py` files.
//!
//! Lifecycle, in order:
//! 1. structured logger
//! 2. metrics collector
//! 3. event bus + document store clients
//! 4. HTTP surface (`/health`, `/ready`, `/status`, `/metrics`)
//! 5. service registry registration + heartbeat ticker
//! 6. termination handlers (SIGINT/SIGTERM) flip `running` and unregister

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::docstore::{DocumentStore, SqliteDocumentStore};
use crate::error::Result;
use crate::eventbus::{EventBus, RedisEventBus};
use crate::http::{build_router, HttpSurfaceState};
use crate::observability::{logging, ServiceMetrics};
use crate::resilience::ServiceRegistry;

/// Everything a service binary needs after `ServiceKernel::bootstrap`
/// returns: clients, metrics, the registry, and the flag its own work loop
/// should watch to know when to stop.
pub struct ServiceKernel {
    pub name: String,
    pub config: Config,
    pub running: Arc<AtomicBool>,
    pub metrics: ServiceMetrics,
    pub registry: Arc<ServiceRegistry>,
    pub event_bus: Arc<dyn EventBus>,
    pub docstore: Arc<dyn DocumentStore>,
    http_state: Arc<HttpSurfaceState>,
}

impl ServiceKernel {
    /// Runs lifecycle steps 1-3 and constructs the registry; the caller gets
    /// back a handle it can use to start the HTTP surface (step 4) and
    /// heartbeat/shutdown handling (steps 5-6) once its own setup is done.
    pub async fn bootstrap(name: &str, port: u16, config: Config) -> Result<Self> {
        config.validate()?;
        logging::init(name, &config.log_level, config.log_format == "json", config.tracing_enabled);
        let metrics = ServiceMetrics::install(name);

        let event_bus: Arc<dyn EventBus> =
            Arc::new(RedisEventBus::connect(&config.redis.url())?.with_metrics(metrics.clone()));
        let db_path = format!("{name}.sqlite3");
        let docstore: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::open(&db_path)?);

        let registry = ServiceRegistry::new();
        let running = Arc::new(AtomicBool::new(true));
        let health_url = format!("http://0.0.0.0:{port}/health");
        registry.register(name, "0.0.0.0", port, &health_url);

        let http_state = Arc::new(HttpSurfaceState::new(
            name,
            registry.clone(),
            metrics.clone(),
            config.api_key.clone(),
            running.clone(),
        ));

        Ok(Self {
            name: name.to_string(),
            config,
            running,
            metrics,
            registry,
            event_bus,
            docstore,
            http_state,
        })
    }

    pub fn set_dependency(&self, name: &str, healthy: bool) {
        self.http_state.set_dependency(name, healthy);
    }

    /// Step 4: binds and serves the HTTP surface in the background.
    pub fn spawn_http_surface(&self, port: u16) -> JoinHandle<()> {
        let router = build_router(self.http_state.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let name = self.name.clone();
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(err) = axum::serve(listener, router).await {
                        tracing::error!(service = %name, error = %err, "http surface exited");
                    }
                }
                Err(err) => tracing::error!(service = %name, %addr, error = %err, "failed to bind http surface"),
            }
        })
    }

    /// Step 5: periodic heartbeat so this registration doesn't expire
    /// (§3: TTL 60s, heartbeat period 30s).
    pub fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let name = self.name.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                registry.heartbeat(&name);
                tokio::time::sleep(std::time::Duration::from_secs(
                    crate::domain::HEARTBEAT_PERIOD_SECS,
                ))
                .await;
            }
        })
    }

    /// Step 6: installs SIGINT/SIGTERM handlers that flip `running` to
    /// false and unregister from the registry, so the service's own
    /// subscribe/work loop (which watches `running`) can drain and exit.
    pub fn spawn_shutdown_handler(&self) -> JoinHandle<()> {
        let running = self.running.clone();
        let registry = self.registry.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = term.recv() => {},
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            tracing::info!(service = %name, "shutdown signal received, draining");
            running.store(false, Ordering::SeqCst);
            registry.unregister(&name);
        })
    }
}
